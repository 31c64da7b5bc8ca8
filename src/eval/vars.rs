//! Variable scopes: `g:`, `s:`, `l:`, `a:`, `v:` and bare names.
//!
//! Inside a function a bare name is a local variable.  Closures and
//! lambdas also see the locals of the frames they were created in.

use crate::error::{ScriptError, ScriptResult};
use crate::executor::Engine;
use crate::userfunc::FuncScope;
use crate::value::{Dict, Special, Value};
use std::rc::Rc;

/// Split "x:name" into the scope letter and the name.
pub(crate) fn split_scope(name: &str) -> (Option<char>, &str) {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(scope), Some(':')) if scope.is_ascii_lowercase() => (Some(scope), &name[2..]),
        _ => (None, name),
    }
}

fn valid_name(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '#')
}

/// The whole scope dictionary for "g:", an entry otherwise.
fn scope_item(dict: &Dict, key: &str) -> Option<Value> {
    if key.is_empty() {
        Some(Value::Dict(dict.clone()))
    } else {
        dict.borrow().get(key).cloned()
    }
}

/// Walk a scope and the scopes it was created in.
fn find_in_chain(scope: &Rc<FuncScope>, pick: impl Fn(&FuncScope) -> &Dict, key: &str) -> Option<Dict> {
    let mut current = Some(Rc::clone(scope));
    while let Some(scope) = current {
        let dict = pick(&scope);
        if dict.borrow().contains_key(key) {
            return Some(dict.clone());
        }
        current = scope.parent.clone();
    }
    None
}

impl Engine {
    /// `v:` variables.
    fn vim_var(&self, key: &str) -> Option<Value> {
        let caught = self.ctx.caught_stack.last();
        Some(match key {
            "true" => Value::Special(Special::True),
            "false" => Value::Special(Special::False),
            "null" => Value::Special(Special::Null),
            "exception" => Value::String(caught.map(|e| e.value.clone()).unwrap_or_default()),
            "throwpoint" => Value::String(caught.map(|e| e.throwpoint()).unwrap_or_default()),
            "errmsg" => Value::String(self.ctx.errmsg.clone()),
            "version" => Value::Number(900),
            _ => return None,
        })
    }

    pub(crate) fn lookup_var(&self, name: &str) -> Option<Value> {
        let (scope, key) = split_scope(name);
        match scope {
            Some('g') => scope_item(&self.globals, key),
            Some('s') => self.script_vars.get(&self.current_sid).and_then(|d| scope_item(d, key)),
            Some('l') => scope_item(&self.lookup_scope()?.locals, key),
            Some('a') => {
                let scope = self.lookup_scope()?;
                if key.is_empty() {
                    return Some(Value::Dict(scope.args.clone()));
                }
                let dict = find_in_chain(&scope, |s| &s.args, key)?;
                let value = dict.borrow().get(key).cloned();
                value
            }
            Some('v') => self.vim_var(key),
            Some(_) => None,
            None => match self.lookup_scope() {
                Some(scope) => {
                    let dict = find_in_chain(&scope, |s| &s.locals, key)?;
                    let value = dict.borrow().get(key).cloned();
                    value
                }
                None => self.globals.borrow().get(key).cloned(),
            },
        }
    }

    pub(crate) fn get_var(&self, name: &str) -> ScriptResult<Value> {
        self.lookup_var(name)
            .ok_or_else(|| ScriptError::UndefinedVariable(name.to_string()))
    }

    /// The dictionary a new value for `name` goes into, and the key.
    fn var_dict<'a>(&mut self, name: &'a str) -> ScriptResult<(Dict, &'a str)> {
        let (scope, key) = split_scope(name);
        if !valid_name(key) {
            return Err(ScriptError::IllegalVariableName(name.to_string()));
        }
        let dict = match scope {
            Some('g') => self.globals.clone(),
            Some('s') => self.script_dict(),
            Some('l') => match self.lookup_scope() {
                Some(scope) => scope.locals.clone(),
                None => return Err(ScriptError::IllegalVariableName(name.to_string())),
            },
            Some('a') | Some('v') => return Err(ScriptError::ReadOnlyVariable(name.to_string())),
            Some(_) => return Err(ScriptError::IllegalVariableName(name.to_string())),
            None => match self.lookup_scope() {
                // A closure assigns to the variable of the enclosing
                // function when it exists there.
                Some(scope) => find_in_chain(&scope, |s| &s.locals, key).unwrap_or_else(|| scope.locals.clone()),
                None => self.globals.clone(),
            },
        };
        Ok((dict, key))
    }

    pub(crate) fn set_var(&mut self, name: &str, value: Value) -> ScriptResult<()> {
        if name == "v:errmsg" {
            self.ctx.errmsg = value.to_str()?;
            return Ok(());
        }
        let (dict, key) = self.var_dict(name)?;
        dict.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    pub(crate) fn unlet_var(&mut self, name: &str) -> ScriptResult<()> {
        let (dict, key) = self.var_dict(name)?;
        let removed = dict.borrow_mut().remove(key);
        match removed {
            Some(_) => Ok(()),
            None => Err(ScriptError::NoSuchVariable(name.to_string())),
        }
    }

    /// Variables visible in the current scope, for `:let` without
    /// arguments.
    pub(crate) fn visible_vars(&mut self) -> Vec<(String, Value)> {
        let mut vars = Vec::new();
        match self.lookup_scope() {
            Some(scope) => {
                for (key, value) in scope.locals.borrow().iter() {
                    vars.push((key.clone(), value.clone()));
                }
                for (key, value) in scope.args.borrow().iter() {
                    vars.push((format!("a:{}", key), value.clone()));
                }
            }
            None => {
                for (key, value) in self.globals.borrow().iter() {
                    vars.push((key.clone(), value.clone()));
                }
            }
        }
        let script = self.script_dict();
        for (key, value) in script.borrow().iter() {
            vars.push((format!("s:{}", key), value.clone()));
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn run(script: &str) -> Vec<String> {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("vars.vim", script);
        engine.take_messages()
    }

    #[test]
    fn test_split_scope() {
        assert_eq!(split_scope("g:x"), (Some('g'), "x"));
        assert_eq!(split_scope("x"), (None, "x"));
        assert_eq!(split_scope("s:"), (Some('s'), ""));
        assert_eq!(split_scope("<SNR>1_F"), (None, "<SNR>1_F"));
    }

    #[test]
    fn test_function_locals_hide_globals() {
        let out = run(
            "let x = 'global'\nfunction F()\n  let x = 'local'\n  echo x g:x l:x\nendfunction\ncall F()\necho x",
        );
        assert_eq!(out, vec!["local global local", "global"]);
    }

    #[test]
    fn test_script_variables_are_per_script() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("one.vim", "let s:n = 1\necho s:n");
        engine.source_str("two.vim", "echo exists('s:n')\nlet s:n = 2");
        engine.source_str("one.vim", "echo s:n");
        assert_eq!(engine.take_messages(), vec!["1", "0", "1"]);
    }

    #[test]
    fn test_read_only_scopes() {
        let out = run("function F(a)\n  let a:a = 2\nendfunction\ncall F(1)\nlet v:true = 0");
        assert!(out.contains(&"E46: Cannot change read-only variable \"a:a\"".to_string()), "{:?}", out);
        assert_eq!(out.last().map(String::as_str), Some("E46: Cannot change read-only variable \"v:true\""));
    }

    #[test]
    fn test_closure_sees_and_updates_outer_locals() {
        let out = run(
            "function Counter()\n  let n = 0\n  function! Inc() closure\n    let n += 1\n    return n\n  endfunction\n  return funcref('Inc')\nendfunction\nlet C = Counter()\necho C() C() C()",
        );
        assert_eq!(out, vec!["1 2 3"]);
    }

    #[test]
    fn test_unlet() {
        let out = run("let g:x = 1\nunlet x\necho exists('x')\nunlet x\nunlet! x");
        assert_eq!(out.first().map(String::as_str), Some("0"));
        assert_eq!(out.last().map(String::as_str), Some("E108: No such variable: \"x\""));
    }
}
