//! `:let`, `:unlet`, `:echo`, `:echon`, `:echomsg`, `:echoerr` and
//! `:execute`.

use super::{binary, list_index};
use crate::error::{ScriptError, ScriptResult};
use crate::executor::{DoCmdFlags, Engine, LineSource, StringSource};
use crate::parser::{check_nextcmd, find_nextcmd, parse_expr, parse_lvalue, Accessor, BinOp, CmdId, ExArg, LetTarget};
use crate::value::Value;

/// Assignment operators of `:let`, longest first.
const LET_OPS: &[&str] = &["..=", "+=", "-=", "*=", "/=", "%=", ".=", "="];

/// `let x op= value`
fn apply_op(op: &str, old: Value, value: Value) -> ScriptResult<Value> {
    match (op, &old, &value) {
        ("+=", Value::List(list), Value::List(more)) => {
            let items = more.borrow().clone();
            list.borrow_mut().extend(items);
            return Ok(old);
        }
        (_, Value::List(_) | Value::Dict(_) | Value::Func(_), _) => {
            return Err(ScriptError::WrongLetType(op.trim_end_matches('=').to_string()));
        }
        _ => {}
    }
    let op = match op {
        "+=" => BinOp::Add,
        "-=" => BinOp::Sub,
        "*=" => BinOp::Mul,
        "/=" => BinOp::Div,
        "%=" => BinOp::Mod,
        _ => BinOp::Concat,
    };
    binary(op, &old, &value)
}

/// How a value is shown by `:let` listings.
fn list_line(name: &str, value: &Value) -> String {
    let marker = match value {
        Value::Number(_) => '#',
        Value::Func(_) => '*',
        _ => ' ',
    };
    format!("{:<24}{}{}", name, marker, value.to_display())
}

impl Engine {
    /// Assign `value` to `target`, combining with the old value for
    /// `+=` and friends.
    pub(crate) fn assign(&mut self, target: &LetTarget, value: Value, op: Option<&str>) -> ScriptResult<()> {
        match target {
            LetTarget::Var { name, path } if path.is_empty() => {
                let value = match op {
                    Some(op) => apply_op(op, self.get_var(name)?, value)?,
                    None => value,
                };
                self.set_var(name, value)
            }
            LetTarget::Var { name, path } => {
                let (last, walk) = path.split_last().ok_or(ScriptError::InvalidArgument(name.clone()))?;
                let mut container = self.get_var(name)?;
                for accessor in walk {
                    container = self.eval_accessor(container, accessor)?;
                }
                self.assign_item(container, last, value, op)
            }
            LetTarget::Unpack { targets, rest } => {
                let Value::List(list) = value else {
                    return Err(ScriptError::ListRequired);
                };
                let items = list.borrow().clone();
                if items.len() < targets.len() {
                    return Err(ScriptError::MoreTargets);
                }
                if rest.is_none() && items.len() > targets.len() {
                    return Err(ScriptError::LessTargets);
                }
                for (target, item) in targets.iter().zip(items.iter()) {
                    self.assign(target, item.clone(), op)?;
                }
                if let Some(rest) = rest {
                    let remaining = Value::list(items[targets.len()..].to_vec());
                    self.assign(rest, remaining, op)?;
                }
                Ok(())
            }
        }
    }

    fn assign_item(&mut self, container: Value, accessor: &Accessor, value: Value, op: Option<&str>) -> ScriptResult<()> {
        match (container, accessor) {
            (Value::Dict(dict), accessor) => {
                let key = match accessor {
                    Accessor::Key(key) => key.clone(),
                    Accessor::Index(expr) => self.eval_expr(expr)?.to_str()?,
                };
                let value = match op {
                    Some(op) => {
                        let old = dict.borrow().get(&key).cloned();
                        let old = old.ok_or_else(|| ScriptError::MissingKey(key.clone()))?;
                        apply_op(op, old, value)?
                    }
                    None => value,
                };
                dict.borrow_mut().insert(key, value);
                Ok(())
            }
            (Value::List(list), Accessor::Index(expr)) => {
                let n = self.eval_expr(expr)?.to_number()?;
                let len = list.borrow().len();
                let idx = list_index(n, len).ok_or(ScriptError::ListIndex(n))?;
                let value = match op {
                    Some(op) => {
                        let old = list.borrow()[idx].clone();
                        apply_op(op, old, value)?
                    }
                    None => value,
                };
                list.borrow_mut()[idx] = value;
                Ok(())
            }
            (Value::List(_), Accessor::Key(_)) => Err(ScriptError::DictRequired),
            (Value::Func(_), _) => Err(ScriptError::IndexFuncref),
            _ => Err(ScriptError::NotIndexable),
        }
    }

    pub(crate) fn ex_let(&mut self, eap: &mut ExArg) {
        let arg = eap.arg.clone();
        let trimmed = arg.trim();
        if trimmed.is_empty() || trimmed.starts_with('|') || trimmed.starts_with('"') {
            eap.nextcmd = find_nextcmd(trimmed);
            if !eap.skip {
                let lines: Vec<String> = self
                    .visible_vars()
                    .iter()
                    .map(|(name, value)| list_line(name, value))
                    .collect();
                for line in lines {
                    self.msg(&line);
                }
            }
            return;
        }

        let (target, used) = match parse_lvalue(&arg) {
            Ok(parsed) => parsed,
            Err(err) => {
                if !eap.skip {
                    eap.errmsg = Some(err);
                }
                eap.nextcmd = find_nextcmd(&arg);
                return;
            }
        };
        let rest = &arg[used..];
        let Some(op) = LET_OPS.iter().copied().find(|op| rest.starts_with(op) && !rest.starts_with("==")) else {
            // ":let var" lists the variable.
            match check_nextcmd(rest) {
                Ok(next) => eap.nextcmd = next,
                Err(trailing) => {
                    if !eap.skip {
                        eap.errmsg = Some(ScriptError::TrailingCharacters(trailing));
                    }
                    return;
                }
            }
            if !eap.skip {
                self.list_let_target(&target, eap);
            }
            return;
        };

        let expr = &rest[op.len()..];
        let Some(value) = self.eval0(expr, eap.skip, &mut eap.nextcmd) else {
            return;
        };
        if eap.skip {
            return;
        }
        let op = (op != "=").then_some(op);
        if let Err(err) = self.assign(&target, value, op) {
            eap.errmsg = Some(err);
        }
    }

    fn list_let_target(&mut self, target: &LetTarget, eap: &mut ExArg) {
        let LetTarget::Var { name, path } = target else {
            eap.errmsg = Some(ScriptError::InvalidArgument(eap.arg.trim().to_string()));
            return;
        };
        let mut value = match self.get_var(name) {
            Ok(value) => value,
            Err(err) => {
                eap.errmsg = Some(err);
                return;
            }
        };
        for accessor in path {
            value = match self.eval_accessor(value, accessor) {
                Ok(value) => value,
                Err(err) => {
                    eap.errmsg = Some(err);
                    return;
                }
            };
        }
        self.msg(&list_line(eap.arg.trim(), &value));
    }

    pub(crate) fn ex_unlet(&mut self, eap: &mut ExArg) {
        let arg = eap.arg.clone();
        let mut p = arg.trim_start();
        if p.is_empty() {
            eap.errmsg = Some(ScriptError::ArgumentRequired);
            return;
        }
        while !p.is_empty() && !p.starts_with('"') {
            let (target, used) = match parse_lvalue(p) {
                Ok(parsed) => parsed,
                Err(err) => {
                    eap.errmsg = Some(err);
                    return;
                }
            };
            if eap.skip {
                p = p[used..].trim_start();
                continue;
            }
            let result = match &target {
                LetTarget::Var { name, path } if path.is_empty() => self.unlet_var(name),
                LetTarget::Var { name, path } => self.unlet_item(name, path),
                LetTarget::Unpack { .. } => Err(ScriptError::InvalidArgument(p.to_string())),
            };
            match result {
                Err(ScriptError::NoSuchVariable(_)) if eap.bang => {}
                Err(err) => {
                    eap.errmsg = Some(err);
                    return;
                }
                Ok(()) => {}
            }
            p = p[used..].trim_start();
        }
    }

    fn unlet_item(&mut self, name: &str, path: &[Accessor]) -> ScriptResult<()> {
        let Some((last, walk)) = path.split_last() else {
            return self.unlet_var(name);
        };
        let mut container = self.get_var(name)?;
        for accessor in walk {
            container = self.eval_accessor(container, accessor)?;
        }
        match (container, last) {
            (Value::Dict(dict), accessor) => {
                let key = match accessor {
                    Accessor::Key(key) => key.clone(),
                    Accessor::Index(expr) => self.eval_expr(expr)?.to_str()?,
                };
                let removed = dict.borrow_mut().remove(&key);
                removed.map(|_| ()).ok_or(ScriptError::MissingKey(key))
            }
            (Value::List(list), Accessor::Index(expr)) => {
                let n = self.eval_expr(expr)?.to_number()?;
                let len = list.borrow().len();
                let idx = list_index(n, len).ok_or(ScriptError::ListIndex(n))?;
                list.borrow_mut().remove(idx);
                Ok(())
            }
            _ => Err(ScriptError::NotIndexable),
        }
    }

    /// Evaluate the white space separated expressions of `:echo` and
    /// friends.  `None` when skipping or on an error.
    fn eval_expr_list(&mut self, eap: &mut ExArg) -> Option<Vec<Value>> {
        let arg = eap.arg.clone();
        let mut p = arg.as_str();
        let mut values = Vec::new();
        loop {
            let rest = p.trim_start();
            if rest.is_empty() || rest.starts_with('|') {
                eap.nextcmd = check_nextcmd(rest).ok().flatten();
                break;
            }
            let (expr, used) = match parse_expr(rest) {
                Ok(parsed) => parsed,
                Err(err) => {
                    if !eap.skip {
                        eap.errmsg = Some(err);
                    }
                    eap.nextcmd = find_nextcmd(rest);
                    return None;
                }
            };
            if !eap.skip {
                match self.eval_expr(&expr) {
                    Ok(value) => values.push(value),
                    Err(err) => {
                        eap.errmsg = Some(err);
                        eap.nextcmd = find_nextcmd(&rest[used..]);
                        return None;
                    }
                }
            }
            p = &rest[used..];
        }
        (!eap.skip).then_some(values)
    }

    pub(crate) fn ex_echo(&mut self, eap: &mut ExArg) {
        let Some(values) = self.eval_expr_list(eap) else {
            return;
        };
        let texts: Vec<String> = values.iter().map(Value::to_display).collect();
        if eap.cmd == CmdId::Echon {
            self.msg_append(&texts.concat());
        } else {
            self.msg(&texts.join(" "));
        }
    }

    pub(crate) fn ex_echomsg(&mut self, eap: &mut ExArg) {
        let Some(values) = self.eval_expr_list(eap) else {
            return;
        };
        let text = values.iter().map(Value::to_display).collect::<Vec<_>>().join(" ");
        if eap.cmd == CmdId::Echoerr {
            eap.errmsg = Some(ScriptError::Message(text));
        } else {
            self.msg(&text);
        }
    }

    /// `:execute`: the joined values run as command lines.  A `:while` or
    /// `:if` left open continues with the lines of the enclosing source.
    pub(crate) fn ex_execute(&mut self, eap: &mut ExArg, source: &mut dyn LineSource) {
        let Some(values) = self.eval_expr_list(eap) else {
            return;
        };
        let mut parts = Vec::with_capacity(values.len());
        for value in &values {
            match value.to_str() {
                Ok(text) => parts.push(text),
                Err(err) => {
                    eap.errmsg = Some(err);
                    return;
                }
            }
        }
        let text = parts.join(" ");
        let lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        let mut commands = StringSource::new(lines, Some(source));
        self.do_cmdline(&mut commands, DoCmdFlags::default());
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::executor::Engine;

    fn run(script: &str) -> Vec<String> {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("let.vim", script);
        engine.take_messages()
    }

    #[test]
    fn test_let_operators() {
        let out = run("let n = 10\nlet n += 5\nlet n -= 3\nlet n *= 2\nlet n /= 5\nlet n %= 3\necho n\nlet s = 'a'\nlet s .= 'b'\nlet s ..= 1\necho s");
        assert_eq!(out, vec!["1", "ab1"]);
    }

    #[test]
    fn test_list_add_extends_in_place() {
        let out = run("let l = [1]\nlet m = l\nlet l += [2]\necho m\nlet l -= [1]");
        assert_eq!(out.first().map(String::as_str), Some("[1, 2]"));
        assert_eq!(out.last().map(String::as_str), Some("E734: Wrong variable type for -="));
    }

    #[test]
    fn test_unpacking() {
        let out = run("let [a, b; rest] = [1, 2, 3, 4]\necho a b rest\nlet [x, y] = [1]\nlet [x] = [1, 2]");
        assert_eq!(out[0], "1 2 [3, 4]");
        assert!(out.contains(&"E688: More targets than List items".to_string()));
        assert_eq!(out.last().map(String::as_str), Some("E687: Less targets than List items"));
    }

    #[test]
    fn test_item_targets() {
        let out = run("let d = {'l': [0, 0]}\nlet d.l[1] = 5\nlet d['k'] = 'v'\nlet d.l[0] += 2\necho d\nunlet d.k d.l[0]\necho d");
        assert_eq!(out, vec!["{'k': 'v', 'l': [2, 5]}", "{'l': [5]}"]);
    }

    #[test]
    fn test_echon_and_echomsg() {
        let out = run("echon 'a' 'b'\necho 'c'\nechomsg 'm' 1");
        assert_eq!(out, vec!["ab", "c", "m 1"]);
    }

    #[test]
    fn test_echoerr_becomes_exception() {
        let out = run("try\n  echoerr 'bad'\ncatch\n  echo v:exception\nendtry");
        assert_eq!(out, vec!["Vim(echoerr):bad"]);
    }

    #[test]
    fn test_echo_double_quoted() {
        let out = run("echo \"abc\" \"d\\te\"\necho \"x\" | echo 'y'");
        assert_eq!(out, vec!["abc d\te", "x", "y"]);
    }

    #[test]
    fn test_execute_lines() {
        let out = run("execute 'echo 1' '+ 1'\nexecute \"echo 'a'\\necho 'b'\"\nexecute 'while 0'\nendwhile\necho 'after'");
        assert_eq!(out, vec!["2", "a", "b", "after"]);
    }

    #[test]
    fn test_for_loop() {
        let out = run("for [k, v] in [['a', 1], ['b', 2]]\n  echo k v\nendfor\nfor x in 5\nendfor");
        assert_eq!(&out[..2], &["a 1", "b 2"]);
        assert_eq!(out.last().map(String::as_str), Some("E714: List required"));
    }

    #[test]
    fn test_let_listing() {
        let out = run("let g:num = 3\nlet num");
        assert_eq!(out, vec![format!("{:<24}#3", "num")]);
    }
}
