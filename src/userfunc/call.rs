//! Calling user functions: argument binding, the call frame, `:return`,
//! `:call` and `:defer`.

use super::{CallFrame, DeferredCall, FuncBody, FuncScope, UserFunction};
use crate::condstack::{CondStack, PendingAction, Search};
use crate::error::{ScriptError, ScriptResult};
use crate::executor::{BreakCursor, DoCmdFlags, Engine, FuncSource, Sourcing};
use crate::parser::{check_nextcmd, find_nextcmd, parse_expr, ExArg, Expr};
use crate::value::{Dict, FuncRef, FuncTarget, Value};
use std::rc::Rc;
use tracing::debug;

impl Engine {
    /// Call a Funcref; a partial supplies its bound arguments and `self`.
    pub(crate) fn call_func(&mut self, fref: &FuncRef, args: Vec<Value>, self_dict: Option<Dict>) -> ScriptResult<Value> {
        let args = if fref.bound_args.is_empty() {
            args
        } else {
            let mut all = fref.bound_args.clone();
            all.extend(args);
            all
        };
        let self_dict = fref.self_dict.clone().or(self_dict);
        match &fref.target {
            FuncTarget::Func(func) => self.call_user_func(Rc::clone(func), args, self_dict),
            FuncTarget::Name(name) => self.call_by_name(name, args, self_dict),
        }
    }

    /// `s:Name` and `<SID>Name` to the name in the function table.
    pub(crate) fn resolve_func_name(&self, name: &str) -> String {
        if let Some(rest) = name.strip_prefix("s:").or_else(|| name.strip_prefix("<SID>")) {
            format!("<SNR>{}_{}", self.current_sid, rest)
        } else if let Some(rest) = name.strip_prefix("g:") {
            rest.to_string()
        } else {
            name.to_string()
        }
    }

    pub(crate) fn call_by_name(&mut self, name: &str, args: Vec<Value>, self_dict: Option<Dict>) -> ScriptResult<Value> {
        let resolved = self.resolve_func_name(name);
        if let Some(func) = self.functions.get(&resolved) {
            return self.call_user_func(func, args, self_dict);
        }
        if let Some(result) = self.call_builtin(&resolved, &args) {
            return result;
        }
        Err(ScriptError::UnknownFunction(name.to_string()))
    }

    pub(crate) fn call_user_func(
        &mut self,
        func: Rc<UserFunction>,
        args: Vec<Value>,
        self_dict: Option<Dict>,
    ) -> ScriptResult<Value> {
        let name = func.name.to_string();
        if func.deleted.get() {
            return Err(ScriptError::DeletedFunction(name));
        }
        if args.len() < func.required_args() {
            return Err(ScriptError::NotEnoughArgs(name));
        }
        if !func.varargs && args.len() > func.params.len() {
            return Err(ScriptError::TooManyArgs(name));
        }
        if func.flags.dict && self_dict.is_none() {
            return Err(ScriptError::DictWithoutSelf(name));
        }
        if let FuncBody::Native(native) = &func.body {
            let native = Rc::clone(native);
            return native(self, &args);
        }
        if self.frames.len() >= self.config.max_func_depth {
            self.emsg(&ScriptError::CallDepth);
            return Ok(Value::Number(-1));
        }

        let scope = Rc::new(self.bind_arguments(&func, &args, self_dict));
        let level = self.ctx.ex_nesting_level;
        let cursor = BreakCursor::new(self, false, &name);
        self.frames.push(CallFrame {
            func: Rc::clone(&func),
            scope,
            linenr: 0,
            returned: false,
            rettv: None,
            cursor,
            level,
            defers: Vec::new(),
        });
        let depth = self.frames.len() - 1;
        func.calls.set(func.calls.get() + 1);
        if func.flags.sandboxed {
            self.ctx.sandbox += 1;
        }

        let sourcing_name = match &self.sourcing.name {
            Some(prev) if prev.starts_with("function ") => format!("{}[{}]..{}", prev, self.sourcing.lnum, name),
            _ => format!("function {}", name),
        };
        let saved_sourcing = std::mem::replace(
            &mut self.sourcing,
            Sourcing {
                name: Some(sourcing_name),
                lnum: 0,
            },
        );
        let saved_sid = std::mem::replace(&mut self.current_sid, func.script_id);
        let saved_did_emsg = std::mem::take(&mut self.ctx.did_emsg);
        debug!("calling {}", name);

        let defaults_ok = self.bind_defaults(&func, args.len(), depth);
        if !defaults_ok && func.flags.abort {
            self.ctx.did_emsg = true;
        } else {
            match &func.body {
                FuncBody::Lambda(lambda) => {
                    let lambda = Rc::clone(lambda);
                    match self.eval_expr(&lambda.body) {
                        Ok(value) => self.frames[depth].rettv = Some(value),
                        Err(err) => self.emsg(&err),
                    }
                }
                _ => {
                    let mut source = FuncSource::new(depth);
                    self.do_cmdline(&mut source, DoCmdFlags::REPEAT);
                }
            }
        }

        self.run_deferred(depth);

        let mut result = self.frames[depth].rettv.take().unwrap_or_default();
        if self.ctx.did_emsg && func.flags.abort {
            result = Value::Number(-1);
        }
        if self.ctx.aborting() {
            debug!("{} aborted", name);
        } else {
            debug!("{} returning {}", name, result.repr());
        }

        self.sourcing = saved_sourcing;
        self.current_sid = saved_sid;
        self.ctx.did_emsg |= saved_did_emsg;
        func.calls.set(func.calls.get().saturating_sub(1));
        if func.flags.sandboxed {
            self.ctx.sandbox = self.ctx.sandbox.saturating_sub(1);
        }
        if let Some(caller) = self.sourcing.name.as_deref() {
            if caller.starts_with("function ") {
                debug!("continuing in {}", caller.trim_start_matches("function "));
            }
        }

        if let Some(CallFrame { scope, .. }) = self.frames.pop() {
            if scope.escaped() {
                self.reclaimer.keep(scope);
            }
        }
        self.reclaimer.prune();
        Ok(result)
    }

    /// Scope of a new call with the given arguments bound; defaults are
    /// evaluated later, inside the call.
    fn bind_arguments(&self, func: &UserFunction, args: &[Value], self_dict: Option<Dict>) -> FuncScope {
        let scope = FuncScope::new(func.scoped.clone());
        let extra: Vec<Value> = args.iter().skip(func.params.len()).cloned().collect();
        {
            let mut avars = scope.args.borrow_mut();
            let mut lvars = scope.locals.borrow_mut();
            avars.insert("0".into(), Value::Number(extra.len() as i64));
            for (i, value) in extra.iter().enumerate() {
                avars.insert((i + 1).to_string(), value.clone());
            }
            scope.varargs.borrow_mut().extend(extra);
            avars.insert("000".into(), Value::List(Rc::clone(&scope.varargs)));
            avars.insert("firstline".into(), Value::Number(0));
            avars.insert("lastline".into(), Value::Number(0));
            let is_lambda = matches!(func.body, FuncBody::Lambda(_));
            for (param, value) in func.params.iter().zip(args) {
                avars.insert(param.clone(), value.clone());
                if is_lambda {
                    lvars.insert(param.clone(), value.clone());
                }
            }
            if let Some(dict) = self_dict {
                lvars.insert("self".into(), Value::Dict(dict));
            }
        }
        scope
    }

    /// Evaluate default values for the parameters not given, left to
    /// right.  The first failure is reported and stops binding.
    fn bind_defaults(&mut self, func: &UserFunction, given: usize, depth: usize) -> bool {
        for (param, default) in func.params.iter().zip(&func.defaults).skip(given) {
            let Some(expr) = default else {
                continue;
            };
            match self.eval_expr(expr) {
                Ok(value) => {
                    let scope = Rc::clone(&self.frames[depth].scope);
                    scope.args.borrow_mut().insert(param.clone(), value);
                }
                Err(err) => {
                    self.emsg(&err);
                    return false;
                }
            }
        }
        true
    }

    /// Run what `:defer` queued on the frame, newest first, each with the
    /// exception state of the function put aside.
    fn run_deferred(&mut self, depth: usize) {
        let calls = std::mem::take(&mut self.frames[depth].defers);
        for call in calls.into_iter().rev() {
            let state = self.ctx.take_exception_state();
            if let Err(err) = self.call_func(&call.func, call.args, None) {
                self.emsg(&err);
            }
            self.ctx.restore_exception_state(state);
        }
    }

    /// Return from the current function, or make the return pending on a
    /// try conditional whose finally clause has to run first.
    /// `reanimate` is set when a return done in a nested dispatcher is
    /// checked again here.  Returns true when the function returns now.
    pub(crate) fn do_return(
        &mut self,
        cstack: &mut CondStack,
        reanimate: bool,
        value: Option<Value>,
    ) -> bool {
        if reanimate {
            if let Some(frame) = self.current_frame_mut() {
                frame.returned = false;
            }
        }

        match self.cleanup_conditionals(cstack, Search::Nothing, true) {
            Some(idx) => {
                // A reanimated return takes its value back from the frame;
                // a `:return` without one in the finally clause returns 0.
                let value = if reanimate {
                    self.current_frame_mut().and_then(|f| f.rettv.take())
                } else {
                    value
                };
                let pending = PendingAction::Return(value);
                self.report_pending("made pending", &pending, None);
                cstack.level_mut(idx).pending = pending;
                false
            }
            None => {
                if let Some(frame) = self.current_frame_mut() {
                    frame.returned = true;
                    if !reanimate && value.is_some() {
                        frame.rettv = value;
                    }
                }
                true
            }
        }
    }

    pub(crate) fn ex_return(&mut self, eap: &mut ExArg, cstack: &mut CondStack) {
        if self.current_frame().is_none() {
            eap.errmsg = Some(ScriptError::ReturnOutsideFunction);
            return;
        }
        let arg = eap.arg.clone();
        let trimmed = arg.trim_start();
        eap.nextcmd = None;
        let mut returning = false;

        let value = if !trimmed.is_empty() && !trimmed.starts_with('|') {
            self.eval0(&arg, eap.skip, &mut eap.nextcmd)
        } else {
            None
        };
        if value.is_some() {
            if !eap.skip {
                returning = self.do_return(cstack, false, value);
            }
        } else if !eap.skip {
            // Return on an error as well, unless it aborts everything.
            if self.ctx.cause_abort {
                self.ctx.force_abort = true;
            }
            if !self.ctx.aborting() {
                returning = self.do_return(cstack, false, None);
            }
        }

        if returning {
            eap.nextcmd = None;
        } else if eap.nextcmd.is_none() {
            eap.nextcmd = check_nextcmd(trimmed).ok().flatten();
        }
    }

    pub(crate) fn ex_call(&mut self, eap: &mut ExArg) {
        let arg = eap.arg.clone();
        let (expr, used) = match parse_expr(&arg) {
            Ok(parsed) => parsed,
            Err(err) => {
                if !eap.skip {
                    eap.errmsg = Some(err);
                }
                eap.nextcmd = find_nextcmd(&arg);
                return;
            }
        };
        match check_nextcmd(&arg[used..]) {
            Ok(next) => eap.nextcmd = next,
            Err(trailing) => {
                if !eap.skip {
                    eap.errmsg = Some(ScriptError::TrailingCharacters(trailing));
                }
                return;
            }
        }
        if eap.skip {
            return;
        }
        if !matches!(expr, Expr::Call(..)) {
            eap.errmsg = Some(ScriptError::MissingParens(arg[..used].trim().to_string()));
            return;
        }
        if let Err(err) = self.eval_expr(&expr) {
            eap.errmsg = Some(err);
        }
    }

    /// `:defer Func(args)`: the arguments are evaluated now, the call is
    /// made when the current function ends.
    pub(crate) fn ex_defer(&mut self, eap: &mut ExArg) {
        let arg = eap.arg.clone();
        let (expr, used) = match parse_expr(&arg) {
            Ok(parsed) => parsed,
            Err(err) => {
                if !eap.skip {
                    eap.errmsg = Some(err);
                }
                eap.nextcmd = find_nextcmd(&arg);
                return;
            }
        };
        match check_nextcmd(&arg[used..]) {
            Ok(next) => eap.nextcmd = next,
            Err(trailing) => {
                if !eap.skip {
                    eap.errmsg = Some(ScriptError::TrailingCharacters(trailing));
                }
                return;
            }
        }
        if eap.skip {
            return;
        }
        if self.current_frame().is_none() {
            eap.errmsg = Some(ScriptError::DeferOutsideFunction);
            return;
        }
        let Expr::Call(callee, arg_exprs) = expr else {
            eap.errmsg = Some(ScriptError::MissingParens(arg[..used].trim().to_string()));
            return;
        };

        let deferred = self.eval_callee(&callee).and_then(|func| {
            let args = arg_exprs
                .iter()
                .map(|a| self.eval_expr(a))
                .collect::<ScriptResult<Vec<_>>>()?;
            Ok(DeferredCall { func, args })
        });
        match deferred {
            Ok(call) => {
                if let Some(frame) = self.current_frame_mut() {
                    frame.defers.push(call);
                }
            }
            Err(err) => eap.errmsg = Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::EngineConfig;
    use crate::executor::Engine;

    fn run(script: &str) -> Vec<String> {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("call.vim", script);
        engine.take_messages()
    }

    #[test]
    fn test_default_arguments() {
        let out = run("function F(a, b = 1)\n  return a:a + a:b\nendfunction\necho F(5)\necho F(5, 6)");
        assert_eq!(out, vec!["6", "11"]);
    }

    #[test]
    fn test_argument_count_errors() {
        let out = run("let g:entered = 0\nfunction F(a, b = 1)\n  let g:entered = 1\nendfunction\ncall F(5, 6, 7)\ncall F()\necho g:entered");
        assert!(out.contains(&"E118: Too many arguments for function: F".to_string()), "{:?}", out);
        assert!(out.contains(&"E119: Not enough arguments for function: F".to_string()), "{:?}", out);
        assert_eq!(out.last().map(String::as_str), Some("0"));
    }

    #[test]
    fn test_varargs() {
        let out = run("function V(first, ...)\n  echo a:0 a:000 a:first\n  if a:0 > 1\n    echo a:2\n  endif\nendfunction\ncall V(1, 'x', 'y')");
        assert_eq!(out, vec!["2 ['x', 'y'] 1", "y"]);
    }

    #[test]
    fn test_call_depth_limit() {
        let config = EngineConfig {
            max_func_depth: 10,
            ..EngineConfig::default()
        };
        let mut engine = Engine::captured(config);
        engine.source_str("deep.vim", "function R(n)\n  return R(a:n + 1)\nendfunction\necho R(0)");
        let out = engine.take_messages();
        assert!(out.iter().any(|l| l.starts_with("E132:")), "{:?}", out);
        assert_eq!(out.last().map(String::as_str), Some("-1"));
    }

    #[test]
    fn test_return_value_and_abort() {
        let out = run("function A() abort\n  echo nosuch\n  return 5\nendfunction\necho A()");
        assert_eq!(out.last().map(String::as_str), Some("-1"));
        let out = run("function B()\n  echo nosuch\n  return 5\nendfunction\necho B()");
        assert_eq!(out.last().map(String::as_str), Some("5"));
    }

    #[test]
    fn test_return_outside_function() {
        assert_eq!(
            run("return 1"),
            vec![
                "Error detected while processing call.vim:",
                "line    1:",
                "E133: :return not inside a function"
            ]
        );
    }

    #[test]
    fn test_return_double_quoted_string() {
        let out = run("function F()\n  return \"x\" \" trailing comment\nendfunction\necho F()");
        assert_eq!(out, vec!["x"]);
    }

    #[test]
    fn test_return_pending_on_finally() {
        let out = run("function F()\n  try\n    return 1\n  finally\n    echo 'cleanup'\n  endtry\n  echo 'not here'\nendfunction\necho F()");
        assert_eq!(out, vec!["cleanup", "1"]);
    }

    #[test]
    fn test_deferred_calls_run_in_reverse() {
        let out = run(
            "function Log(s)\n  echo a:s\nendfunction\nfunction F() abort\n  defer Log('one')\n  defer Log('two')\n  echo nosuch\n  echo 'unreached'\nendfunction\ncall F()",
        );
        assert_eq!(out.first().map(String::as_str), Some("Error detected while processing function F:"));
        assert_eq!(&out[out.len() - 2..], ["two", "one"]);
    }

    #[test]
    fn test_defer_outside_function() {
        assert_eq!(
            run("defer Log('x')"),
            vec![
                "Error detected while processing call.vim:",
                "line    1:",
                "E1131: Cannot use :defer outside of a function"
            ]
        );
    }

    #[test]
    fn test_call_requires_parentheses() {
        assert_eq!(run("call Foo").last().map(String::as_str), Some("E107: Missing parentheses: Foo"));
        assert_eq!(
            run("echo 'x'\ncall Nope()"),
            vec![
                "x",
                "Error detected while processing call.vim:",
                "line    2:",
                "E117: Unknown function: Nope"
            ]
        );
    }

    #[test]
    fn test_dict_function_needs_self() {
        let out = run("function D() dict\n  return self.v\nendfunction\nlet d = {'v': 3, 'f': function('D')}\necho d.f()\ncall D()");
        assert_eq!(out[0], "3");
        assert_eq!(out.last().map(String::as_str), Some("E725: Calling dict function without Dictionary: D"));
    }
}
