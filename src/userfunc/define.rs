//! `:function`, `:endfunction`, `:delfunction` and lambda expressions.

use super::{FuncBody, FuncFlags, FuncName, UserFunction};
use crate::error::{ScriptError, ScriptResult};
use crate::executor::{Engine, LineSource};
use crate::parser::{parse_command, parse_expr, parse_lvalue, split_bar, Accessor, ExArg, Expr, Lambda, LetTarget};
use crate::value::{Dict, FuncRef, Value};
use std::rc::Rc;
use tracing::debug;

/// Where a new definition goes.
enum DefTarget {
    Named(FuncName),
    /// `function dict.key()`
    DictEntry { dict: Dict, key: String },
}

/// Parameter list of a definition.
#[derive(Default)]
struct Params {
    names: Vec<String>,
    defaults: Vec<Option<Expr>>,
    varargs: bool,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '#' | '<' | '>' | '.')
}

/// Parse `a, b = 1, ...)`; returns the parameters and the text after `)`.
fn parse_params(text: &str) -> ScriptResult<(Params, &str)> {
    let mut params = Params::default();
    let mut p = text;
    loop {
        p = p.trim_start();
        if let Some(rest) = p.strip_prefix(')') {
            return Ok((params, rest));
        }
        if params.varargs {
            return Err(ScriptError::IllegalArgument(p.to_string()));
        }
        if let Some(rest) = p.strip_prefix("...") {
            params.varargs = true;
            p = rest;
        } else {
            let end = p
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(p.len());
            let name = &p[..end];
            if name.is_empty()
                || name.starts_with(|c: char| c.is_ascii_digit())
                || name == "firstline"
                || name == "lastline"
            {
                let bad = p.split(|c| c == ',' || c == ')').next().unwrap_or(p);
                return Err(ScriptError::IllegalArgument(bad.trim().to_string()));
            }
            if params.names.iter().any(|n| n == name) {
                return Err(ScriptError::DuplicateArgument(name.to_string()));
            }
            params.names.push(name.to_string());
            p = p[end..].trim_start();

            if let Some(rest) = p.strip_prefix('=') {
                let (expr, used) = parse_expr(rest)?;
                params.defaults.push(Some(expr));
                p = &rest[used..];
            } else if params.defaults.iter().any(Option::is_some) {
                return Err(ScriptError::NonDefaultAfterDefault);
            } else {
                params.defaults.push(None);
            }
        }

        p = p.trim_start();
        if let Some(rest) = p.strip_prefix(',') {
            p = rest;
        } else if !p.starts_with(')') {
            return Err(ScriptError::IllegalArgument(p.to_string()));
        }
    }
}

/// Flags after the parameter list.
fn parse_flags(mut p: &str) -> ScriptResult<FuncFlags> {
    let mut flags = FuncFlags::default();
    loop {
        p = p.trim_start();
        if p.is_empty() || p.starts_with('"') {
            return Ok(flags);
        }
        let end = p.find(|c: char| c.is_whitespace()).unwrap_or(p.len());
        match &p[..end] {
            "range" => flags.range = true,
            "dict" => flags.dict = true,
            "abort" => flags.abort = true,
            "closure" => flags.closure = true,
            _ => return Err(ScriptError::TrailingCharacters(p.to_string())),
        }
        p = &p[end..];
    }
}

/// The line starts a nested definition: `function Name(`.
fn starts_definition(line: &str) -> bool {
    let head = parse_command(line);
    if !head.name.starts_with("fu") || !"function".starts_with(head.name) {
        return false;
    }
    let arg = head.arg;
    let end = arg.find(|c: char| !is_name_char(c)).unwrap_or(arg.len());
    end > 0 && arg[end..].trim_start().starts_with('(')
}

/// The line is `:endfunction`; returns what follows a `|` after it.
fn ends_definition(line: &str) -> Option<Option<String>> {
    let head = parse_command(line);
    if head.name.len() >= 4 && "endfunction".starts_with(head.name) {
        Some(split_bar(head.arg).1.map(str::to_string))
    } else {
        None
    }
}

impl Engine {
    pub(crate) fn ex_function(&mut self, eap: &mut ExArg, source: &mut dyn LineSource) {
        let arg = eap.arg.trim().to_string();
        if arg.is_empty() || arg.starts_with('"') {
            if !eap.skip {
                self.list_functions();
            }
            return;
        }

        let name_end = arg.find(|c: char| !is_name_char(c)).unwrap_or(arg.len());
        let name = arg[..name_end].to_string();
        let rest = arg[name_end..].trim_start();
        let Some(after_paren) = rest.strip_prefix('(') else {
            if rest.is_empty() || rest.starts_with('"') {
                if !eap.skip {
                    self.list_function(&name, eap);
                }
            } else {
                eap.errmsg = Some(ScriptError::MissingOpenParen(arg.clone()));
            }
            return;
        };

        // The body is read even when the definition fails or is skipped.
        let header = self.parse_header(&name, after_paren, eap.skip);
        let body = match self.read_body(source) {
            Some((body, nextcmd)) => {
                eap.nextcmd = nextcmd;
                body
            }
            None => {
                eap.errmsg = Some(ScriptError::MissingEndfunction);
                return;
            }
        };
        if eap.skip {
            return;
        }
        let (target, params, flags) = match header {
            Ok(header) => header,
            Err(err) => {
                eap.errmsg = Some(err);
                return;
            }
        };

        let scoped = if flags.closure {
            self.current_frame().map(|f| Rc::clone(&f.scope))
        } else {
            None
        };
        let make = |name: FuncName, engine: &Engine| {
            let mut func = UserFunction::new(name, FuncBody::Lines(body));
            func.params = params.names;
            func.defaults = params.defaults;
            func.varargs = params.varargs;
            func.flags = flags;
            func.flags.sandboxed = engine.ctx.sandbox > 0;
            func.script_id = engine.current_sid;
            func.scoped = scoped;
            Rc::new(func)
        };

        match target {
            DefTarget::Named(fname) => {
                let key = fname.to_string();
                if let Some(old) = self.functions.get(&key) {
                    if !eap.bang {
                        eap.errmsg = Some(ScriptError::FunctionExists(key));
                        return;
                    }
                    if old.calls.get() > 0 {
                        old.removed.set(true);
                    }
                }
                let func = make(fname, self);
                debug!(function = %key, "defined");
                self.functions.insert(func);
            }
            DefTarget::DictEntry { dict, key } => {
                if dict.borrow().contains_key(&key) && !eap.bang {
                    eap.errmsg = Some(ScriptError::DictEntryExists);
                    return;
                }
                let fname = self.functions.next_numbered();
                let func = make(fname, self);
                self.functions.register_anonymous(&func);
                debug!(function = %func.name, key = %key, "defined dictionary function");
                dict.borrow_mut().insert(key, Value::Func(FuncRef::to_func(func)));
            }
        }
    }

    /// Check the name, parameters and flags of a definition.
    fn parse_header(
        &mut self,
        name: &str,
        after_paren: &str,
        skip: bool,
    ) -> ScriptResult<(DefTarget, Params, FuncFlags)> {
        let (params, rest) = parse_params(after_paren)?;
        let mut flags = parse_flags(rest)?;
        if skip {
            // Nothing is defined; only the structure matters.
            return Ok((DefTarget::Named(FuncName::Global(String::new())), params, flags));
        }
        let target = self.definition_target(name)?;
        if let DefTarget::DictEntry { .. } = target {
            flags.dict = true;
        }
        if flags.closure && self.current_frame().is_none() {
            return Err(ScriptError::ClosureAtTopLevel(name.to_string()));
        }
        Ok((target, params, flags))
    }

    fn definition_target(&mut self, name: &str) -> ScriptResult<DefTarget> {
        let (script, bare) = if let Some(rest) = name.strip_prefix("s:").or_else(|| name.strip_prefix("<SID>")) {
            (true, rest)
        } else if let Some(rest) = name.strip_prefix("g:") {
            (false, rest)
        } else {
            (false, name)
        };

        if !script && bare.contains('.') {
            return self.dict_entry_target(name);
        }
        if bare.contains(':') {
            return Err(ScriptError::ColonInFunctionName(name.to_string()));
        }
        let valid = bare
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '#');
        if bare.is_empty() || !valid || (!script && !bare.starts_with(|c: char| c.is_ascii_uppercase())) {
            return Err(ScriptError::BadFunctionName(name.to_string()));
        }
        if script {
            return Ok(DefTarget::Named(FuncName::Script {
                sid: self.current_sid,
                name: bare.to_string(),
            }));
        }
        if matches!(self.lookup_var(bare), Some(Value::Func(_))) {
            return Err(ScriptError::FunctionNameConflict(bare.to_string()));
        }
        Ok(DefTarget::Named(FuncName::Global(bare.to_string())))
    }

    fn dict_entry_target(&mut self, name: &str) -> ScriptResult<DefTarget> {
        let (target, _) = parse_lvalue(name)?;
        let LetTarget::Var { name: var, mut path } = target else {
            return Err(ScriptError::BadFunctionName(name.to_string()));
        };
        let Some(Accessor::Key(key)) = path.pop() else {
            return Err(ScriptError::BadFunctionName(name.to_string()));
        };
        let mut container = self.get_var(&var)?;
        for accessor in &path {
            container = self.eval_accessor(container, accessor)?;
        }
        match container {
            Value::Dict(dict) => Ok(DefTarget::DictEntry { dict, key }),
            _ => Err(ScriptError::DictRequired),
        }
    }

    /// Read lines up to the matching `:endfunction`.  Continuation lines
    /// get an empty entry each so body line numbers stay physical.
    fn read_body(&mut self, source: &mut dyn LineSource) -> Option<(Vec<Option<String>>, Option<String>)> {
        let mut body = Vec::new();
        let mut nesting = 0usize;
        while let Some(line) = source.next_line(self) {
            if let Some(nextcmd) = ends_definition(&line.text) {
                if nesting == 0 {
                    return Some((body, nextcmd));
                }
                nesting -= 1;
            } else if starts_definition(&line.text) {
                nesting += 1;
            }
            let extra = line.end_lnum.saturating_sub(line.lnum);
            body.push(Some(line.text));
            body.extend(std::iter::repeat(None).take(extra));
        }
        None
    }

    fn list_functions(&mut self) {
        let lines: Vec<String> = self
            .functions
            .named()
            .iter()
            .filter(|f| !matches!(f.body, FuncBody::Native(_)))
            .map(|f| format!("function {}", f.signature()))
            .collect();
        for line in lines {
            self.msg(&line);
        }
    }

    fn list_function(&mut self, name: &str, eap: &mut ExArg) {
        let resolved = self.resolve_func_name(name);
        let Some(func) = self.functions.get(&resolved) else {
            eap.errmsg = Some(ScriptError::UndefinedFunction(name.to_string()));
            return;
        };
        self.msg(&format!("   function {}", func.signature()));
        for (idx, line) in func.lines().iter().enumerate() {
            if let Some(line) = line {
                self.msg(&format!("{:<3}{}", idx + 1, line));
            }
        }
        self.msg("   endfunction");
    }

    pub(crate) fn ex_endfunction(&mut self, eap: &mut ExArg) {
        eap.errmsg = Some(ScriptError::EndfunctionOutside);
    }

    pub(crate) fn ex_delfunction(&mut self, eap: &mut ExArg) {
        let name = eap.arg.trim().to_string();
        if name.is_empty() {
            eap.errmsg = Some(ScriptError::ArgumentRequired);
            return;
        }
        let bare = name.strip_prefix("g:").unwrap_or(&name);
        if bare.contains('.') && !name.starts_with("s:") {
            if let Err(err) = self.delete_dict_function(&name) {
                eap.errmsg = Some(err);
            }
            return;
        }

        let resolved = self.resolve_func_name(&name);
        let Some(func) = self.functions.get(&resolved) else {
            if !eap.bang {
                eap.errmsg = Some(ScriptError::NoSuchFunction(name));
            }
            return;
        };
        if func.calls.get() > 0 {
            eap.errmsg = Some(ScriptError::FunctionInUse(name));
            return;
        }
        self.functions.remove(&resolved);
        func.deleted.set(true);
        debug!(function = %resolved, "deleted");
    }

    fn delete_dict_function(&mut self, name: &str) -> ScriptResult<()> {
        let DefTarget::DictEntry { dict, key } = self.dict_entry_target(name)? else {
            return Err(ScriptError::NoSuchFunction(name.to_string()));
        };
        let removed = dict.borrow_mut().remove(&key);
        match removed {
            Some(Value::Func(fref)) => {
                if let Some(func) = self.functions.get(&fref.name()) {
                    if func.calls.get() == 0 {
                        func.deleted.set(true);
                    }
                }
                Ok(())
            }
            Some(other) => {
                dict.borrow_mut().insert(key, other);
                Err(ScriptError::NoSuchFunction(name.to_string()))
            }
            None => Err(ScriptError::MissingKey(key)),
        }
    }

    /// Evaluate a lambda expression: a new `<lambda>N` function that sees
    /// the variables of the current call.
    pub(crate) fn make_lambda(&mut self, lambda: &Rc<Lambda>) -> Value {
        let name = self.functions.next_lambda();
        let mut func = UserFunction::new(name, FuncBody::Lambda(Rc::clone(lambda)));
        func.params = lambda.params.clone();
        func.defaults = vec![None; lambda.params.len()];
        func.varargs = lambda.varargs;
        func.flags.sandboxed = self.ctx.sandbox > 0;
        func.script_id = self.current_sid;
        func.scoped = self.current_frame().map(|f| Rc::clone(&f.scope));
        let func = Rc::new(func);
        self.functions.register_anonymous(&func);
        Value::Func(FuncRef::to_func(func))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn run(script: &str) -> Vec<String> {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("define.vim", script);
        engine.take_messages()
    }

    fn last_error(script: &str) -> String {
        run(script).pop().unwrap_or_default()
    }

    #[test]
    fn test_parse_params() {
        let (params, rest) = parse_params("a, b = 1, ...) abort").unwrap();
        assert_eq!(params.names, vec!["a", "b"]);
        assert!(params.defaults[0].is_none());
        assert!(params.defaults[1].is_some());
        assert!(params.varargs);
        assert_eq!(rest, " abort");
        assert!(parse_flags(rest).unwrap().abort);
    }

    #[test]
    fn test_definition_errors() {
        assert_eq!(
            last_error("function F(a, a)\nendfunction"),
            "E853: Duplicate argument name: a"
        );
        assert_eq!(
            last_error("function F(a = 1, b)\nendfunction"),
            "E989: Non-default argument follows default argument"
        );
        assert_eq!(last_error("function F(1x)\nendfunction"), "E125: Illegal argument: 1x");
        assert_eq!(
            last_error("function lower()\nendfunction"),
            "E128: Function name must start with a capital or \"s:\": lower"
        );
        assert_eq!(
            last_error("function F()\nendfunction\nfunction F()\nendfunction"),
            "E122: Function F already exists, add ! to replace it"
        );
        assert_eq!(
            last_error("function F() closure\nendfunction"),
            "E932: Closure function should not be at top level: F"
        );
        assert_eq!(last_error("function F()\n  echo 1"), "E126: Missing :endfunction");
        assert_eq!(last_error("endfunction"), "E193: :endfunction not inside a function");
    }

    #[test]
    fn test_name_conflicts_with_funcref_variable() {
        assert_eq!(
            last_error("let Fn = function('len')\nfunction Fn()\nendfunction"),
            "E707: Function name conflicts with variable: Fn"
        );
    }

    #[test]
    fn test_nested_definitions_and_listing() {
        let out = run(
            "function Outer()\n  function! Inner()\n    return 2\n  endfunction\n  return 1\nendfunction\nfunction Outer",
        );
        assert_eq!(
            out,
            vec![
                "   function Outer()",
                "1    function! Inner()",
                "2      return 2",
                "3    endfunction",
                "4    return 1",
                "   endfunction"
            ]
        );
    }

    #[test]
    fn test_script_local_function() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("a.vim", "function s:Helper()\n  return 'a'\nendfunction\necho s:Helper()\necho <SID>Helper()");
        assert_eq!(engine.take_messages(), vec!["a", "a"]);
        engine.source_str("b.vim", "echo s:Helper()");
        assert_eq!(engine.take_messages().last().map(String::as_str), Some("E117: Unknown function: s:Helper"));
        assert!(engine.functions.contains("<SNR>1_Helper"));
    }

    #[test]
    fn test_dict_function() {
        let out = run("let d = {'n': 4}\nfunction d.get() abort\n  return self.n\nendfunction\necho d.get()\necho type(d.get)");
        assert_eq!(out, vec!["4", "2"]);
    }

    #[test]
    fn test_delfunction() {
        assert_eq!(last_error("delfunction Nope"), "E130: Unknown function: Nope");
        assert!(run("delfunction! Nope").is_empty());
        assert_eq!(
            last_error("function F()\n  delfunction F\nendfunction\ncall F()"),
            "E131: Cannot delete function F: It is in use"
        );
        let out = run("function G()\n  return 1\nendfunction\nlet R = funcref('G')\nlet N = function('G')\ndelfunction G\ncall R()\ncall N()");
        assert!(out.contains(&"E933: Function was deleted: G".to_string()), "{:?}", out);
        assert_eq!(out.last().map(String::as_str), Some("E117: Unknown function: G"));
    }

    #[test]
    fn test_redefining_function_in_use() {
        let out = run(
            "function F()\n  echo 'old'\n  function! F()\n    echo 'new'\n  endfunction\n  echo 'still old'\nendfunction\ncall F()\ncall F()",
        );
        assert_eq!(out, vec!["old", "still old", "new"]);
    }

    #[test]
    fn test_continuation_lines_keep_line_numbers() {
        let out = run("function F()\n  let x = 1\n  let y = [\n    \\ 2]\n  echo nosuch\nendfunction\ncall F()");
        assert_eq!(
            out,
            vec![
                "Error detected while processing function F:",
                "line    4:",
                "E121: Undefined variable: nosuch"
            ]
        );
    }
}
