//! Expression evaluation and the helpers commands use to evaluate their
//! arguments.

mod builtins;
mod commands;
mod vars;

pub use crate::parser::LetTarget;

use crate::condstack::ForInfo;
use crate::error::{ScriptError, ScriptResult};
use crate::executor::Engine;
use crate::parser::{check_nextcmd, compile_pattern, find_nextcmd, parse_expr, parse_lvalue, Accessor, BinOp, CmpOp, Expr};
use crate::value::{new_dict, Dict, FuncRef, FuncTarget, Value};
use std::cmp::Ordering;

/// Normalize an index into a container of `len` items; negative indexes
/// count from the end.
pub(crate) fn list_index(idx: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let idx = if idx < 0 { len + idx } else { idx };
    (0..len).contains(&idx).then_some(idx as usize)
}

fn divide(a: i64, b: i64) -> i64 {
    if b == 0 {
        match a.cmp(&0) {
            Ordering::Greater => i64::MAX,
            Ordering::Less => -i64::MAX,
            Ordering::Equal => i64::MIN,
        }
    } else {
        a.wrapping_div(b)
    }
}

fn modulo(a: i64, b: i64) -> i64 {
    if b == 0 {
        0
    } else {
        a.wrapping_rem(b)
    }
}

/// Byte-wise `s[start : end]`, with Vim's clamping.
fn slice_str(s: &str, start: i64, end: Option<i64>) -> String {
    let len = s.len() as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let end = match end {
        Some(e) if e < 0 => len + e,
        Some(e) => e.min(len - 1),
        None => len - 1,
    };
    if start > end || start >= len {
        return String::new();
    }
    s.get(start as usize..=end as usize).unwrap_or_default().to_string()
}

impl Engine {
    /// Evaluate a complete expression; anything after it is an error.
    pub(crate) fn eval_str(&mut self, src: &str) -> ScriptResult<Value> {
        let (expr, used) = parse_expr(src)?;
        let rest = src[used..].trim();
        if !rest.is_empty() {
            return Err(ScriptError::TrailingCharacters(rest.to_string()));
        }
        self.eval_expr(&expr)
    }

    /// Evaluate without showing errors (watch expressions, `exists()`).
    pub(crate) fn eval_quiet(&mut self, src: &str) -> Option<Value> {
        self.ctx.emsg_skip += 1;
        let result = self.eval_str(src);
        self.ctx.emsg_skip -= 1;
        result.ok()
    }

    /// Evaluate the expression argument of a command.  `nextcmd` is set to
    /// the command after a `|`.  When skipping the expression is only
    /// parsed and Number 0 is returned.  Errors are reported here.
    pub(crate) fn eval0(&mut self, arg: &str, skip: bool, nextcmd: &mut Option<String>) -> Option<Value> {
        let (expr, used) = match parse_expr(arg) {
            Ok(parsed) => parsed,
            Err(err) => {
                if !skip {
                    self.emsg(&err);
                }
                *nextcmd = find_nextcmd(arg);
                return None;
            }
        };
        match check_nextcmd(&arg[used..]) {
            Ok(next) => *nextcmd = next,
            Err(trailing) => {
                if !skip {
                    self.emsg(&ScriptError::TrailingCharacters(trailing));
                }
                return None;
            }
        }
        if skip {
            return Some(Value::Number(0));
        }
        match self.eval_expr(&expr) {
            Ok(value) => Some(value),
            Err(err) => {
                self.emsg(&err);
                None
            }
        }
    }

    /// Condition of `:if`, `:elseif` and `:while`.  Returns the result and
    /// whether evaluating failed.
    pub(crate) fn eval_to_bool(&mut self, arg: &str, skip: bool, nextcmd: &mut Option<String>) -> (bool, bool) {
        match self.eval0(arg, skip, nextcmd) {
            None => (false, true),
            Some(_) if skip => (false, false),
            Some(value) => match value.is_truthy() {
                Ok(truthy) => (truthy, false),
                Err(err) => {
                    self.emsg(&err);
                    (false, true)
                }
            },
        }
    }

    pub(crate) fn eval_to_string(&mut self, arg: &str, skip: bool, nextcmd: &mut Option<String>) -> Option<String> {
        let value = self.eval0(arg, skip, nextcmd)?;
        match value.to_str() {
            Ok(s) => Some(s),
            Err(err) => {
                if !skip {
                    self.emsg(&err);
                }
                None
            }
        }
    }

    /// `:for {var} in {list}`: the target and the List to iterate over.
    pub(crate) fn eval_for_line(
        &mut self,
        arg: &str,
        skip: bool,
        nextcmd: &mut Option<String>,
    ) -> (Option<ForInfo>, bool) {
        let (target, used) = match parse_lvalue(arg) {
            Ok(parsed) => parsed,
            Err(err) => {
                if !skip {
                    self.emsg(&err);
                }
                *nextcmd = find_nextcmd(arg);
                return (None, true);
            }
        };
        let rest = &arg[used..];
        let expr = match rest.strip_prefix("in") {
            Some(expr) if expr.starts_with(char::is_whitespace) => expr,
            _ => {
                if !skip {
                    self.emsg(&ScriptError::MissingIn);
                }
                *nextcmd = find_nextcmd(rest);
                return (None, true);
            }
        };
        match self.eval0(expr, skip, nextcmd) {
            None => (None, true),
            Some(_) if skip => (None, false),
            Some(Value::List(list)) => (
                Some(ForInfo {
                    list,
                    index: 0,
                    target,
                }),
                false,
            ),
            Some(_) => {
                self.emsg(&ScriptError::ListRequired);
                (None, true)
            }
        }
    }

    /// Assign the next item to the loop variable.  False when the list is
    /// done or the assignment failed.
    pub(crate) fn next_for_item(&mut self, info: &mut ForInfo) -> bool {
        let item = info.list.borrow().get(info.index).cloned();
        let Some(item) = item else {
            return false;
        };
        info.index += 1;
        match self.assign(&info.target, item, None) {
            Ok(()) => true,
            Err(err) => {
                self.emsg(&err);
                false
            }
        }
    }

    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> ScriptResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval_expr(item))
                    .collect::<ScriptResult<Vec<_>>>()?;
                Ok(Value::list(items))
            }
            Expr::Dict(entries) => {
                let dict = new_dict();
                for (key, value) in entries {
                    let key = self.eval_expr(key)?.to_str()?;
                    let value = self.eval_expr(value)?;
                    dict.borrow_mut().insert(key, value);
                }
                Ok(Value::Dict(dict))
            }
            Expr::Var(name) => self.get_var(name),
            Expr::Lambda(lambda) => Ok(self.make_lambda(lambda)),
            Expr::Not(inner) => Ok(Value::from(!self.eval_expr(inner)?.is_truthy()?)),
            Expr::Negate(inner) => Ok(Value::Number(self.eval_expr(inner)?.to_number()?.wrapping_neg())),
            Expr::Plus(inner) => Ok(Value::Number(self.eval_expr(inner)?.to_number()?)),
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval_expr(lhs)?;
                let rhs = self.eval_expr(rhs)?;
                binary(*op, &lhs, &rhs)
            }
            Expr::Compare(op, ic, lhs, rhs) => {
                let lhs = self.eval_expr(lhs)?;
                let rhs = self.eval_expr(rhs)?;
                compare(*op, ic.unwrap_or(false), &lhs, &rhs).map(Value::from)
            }
            Expr::And(lhs, rhs) => {
                let result = self.eval_expr(lhs)?.is_truthy()? && self.eval_expr(rhs)?.is_truthy()?;
                Ok(Value::from(result))
            }
            Expr::Or(lhs, rhs) => {
                let result = self.eval_expr(lhs)?.is_truthy()? || self.eval_expr(rhs)?.is_truthy()?;
                Ok(Value::from(result))
            }
            Expr::Ternary(cond, then, otherwise) => {
                if self.eval_expr(cond)?.is_truthy()? {
                    self.eval_expr(then)
                } else {
                    self.eval_expr(otherwise)
                }
            }
            Expr::Index(base, index) => {
                let base = self.eval_expr(base)?;
                let index = self.eval_expr(index)?;
                self.index_value(base, &index)
            }
            Expr::Slice(base, start, end) => {
                let base = self.eval_expr(base)?;
                let start = match start {
                    Some(e) => self.eval_expr(e)?.to_number()?,
                    None => 0,
                };
                let end = match end {
                    Some(e) => Some(self.eval_expr(e)?.to_number()?),
                    None => None,
                };
                slice_value(&base, start, end)
            }
            Expr::Member(base, key) => {
                let base = self.eval_expr(base)?;
                match base {
                    Value::Dict(dict) => {
                        let item = dict.borrow().get(key).cloned();
                        let item = item.ok_or_else(|| ScriptError::MissingKey(key.clone()))?;
                        Ok(self.bind_self(item, &dict))
                    }
                    other => {
                        // Not a Dictionary: "a.b" concatenates.
                        let rhs = self.get_var(key)?;
                        Ok(Value::String(other.to_str()? + &rhs.to_str()?))
                    }
                }
            }
            Expr::Call(callee, args) => {
                let fref = self.eval_callee(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval_expr(arg))
                    .collect::<ScriptResult<Vec<_>>>()?;
                let result = self.call_func(&fref, args, None);
                if self.ctx.aborting() {
                    return Err(ScriptError::Aborted);
                }
                result
            }
        }
    }

    /// The function a call expression refers to.  A plain name is looked
    /// up as a Funcref variable first, then as a function.
    pub(crate) fn eval_callee(&mut self, callee: &Expr) -> ScriptResult<FuncRef> {
        if let Expr::Var(name) = callee {
            if let Some(Value::Func(fref)) = self.lookup_var(name) {
                return Ok(fref);
            }
            let resolved = self.resolve_func_name(name);
            if self.functions.contains(&resolved) || builtins::exists(&resolved) {
                return Ok(FuncRef::named(resolved));
            }
            return Err(ScriptError::UnknownFunction(name.clone()));
        }
        match self.eval_expr(callee)? {
            Value::Func(fref) => Ok(fref),
            Value::String(name) => Ok(FuncRef::named(self.resolve_func_name(&name))),
            other => Err(ScriptError::UnknownFuncref(other.to_display())),
        }
    }

    /// A dict function taken from a Dictionary gets it as `self`.
    fn bind_self(&self, item: Value, dict: &Dict) -> Value {
        let Value::Func(fref) = &item else {
            return item;
        };
        if fref.self_dict.is_some() {
            return item;
        }
        let is_dict = match &fref.target {
            FuncTarget::Func(func) => func.flags.dict,
            FuncTarget::Name(name) => self.functions.get(name).map_or(false, |f| f.flags.dict),
        };
        if !is_dict {
            return item;
        }
        let mut bound = fref.clone();
        bound.self_dict = Some(dict.clone());
        Value::Func(bound)
    }

    pub(crate) fn index_value(&self, base: Value, index: &Value) -> ScriptResult<Value> {
        match base {
            Value::List(list) => {
                let n = index.to_number()?;
                let list = list.borrow();
                list_index(n, list.len())
                    .map(|i| list[i].clone())
                    .ok_or(ScriptError::ListIndex(n))
            }
            Value::Dict(dict) => {
                let key = index.to_str()?;
                let item = dict.borrow().get(&key).cloned();
                let item = item.ok_or(ScriptError::MissingKey(key))?;
                Ok(self.bind_self(item, &dict))
            }
            Value::Func(_) => Err(ScriptError::IndexFuncref),
            Value::Special(_) => Err(ScriptError::NotIndexable),
            scalar => {
                let s = scalar.to_str()?;
                let n = index.to_number()?;
                if n < 0 {
                    return Ok(Value::String(String::new()));
                }
                Ok(Value::String(slice_str(&s, n, Some(n))))
            }
        }
    }

    /// Step into a container along one accessor of an assignment target.
    pub(crate) fn eval_accessor(&mut self, base: Value, accessor: &Accessor) -> ScriptResult<Value> {
        match accessor {
            Accessor::Index(expr) => {
                let index = self.eval_expr(expr)?;
                self.index_value(base, &index)
            }
            Accessor::Key(key) => match base {
                Value::Dict(dict) => {
                    let item = dict.borrow().get(key).cloned();
                    item.ok_or_else(|| ScriptError::MissingKey(key.clone()))
                }
                _ => Err(ScriptError::DictRequired),
            },
        }
    }
}

pub(super) fn binary(op: BinOp, lhs: &Value, rhs: &Value) -> ScriptResult<Value> {
    let numbers = |f: fn(i64, i64) -> i64| -> ScriptResult<Value> {
        Ok(Value::Number(f(lhs.to_number()?, rhs.to_number()?)))
    };
    match (op, lhs, rhs) {
        (BinOp::Concat, _, _) => Ok(Value::String(lhs.to_str()? + &rhs.to_str()?)),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, _, _) => numbers(i64::wrapping_add),
        (BinOp::Sub, _, _) => numbers(i64::wrapping_sub),
        (BinOp::Mul, _, _) => numbers(i64::wrapping_mul),
        (BinOp::Div, _, _) => numbers(divide),
        (BinOp::Mod, _, _) => numbers(modulo),
    }
}

fn compare(op: CmpOp, ic: bool, lhs: &Value, rhs: &Value) -> ScriptResult<bool> {
    Ok(match op {
        CmpOp::Equal => lhs.loose_eq(rhs, ic)?,
        CmpOp::NotEqual => !lhs.loose_eq(rhs, ic)?,
        CmpOp::Greater => lhs.compare(rhs, ic)? == Ordering::Greater,
        CmpOp::GreaterEqual => lhs.compare(rhs, ic)? != Ordering::Less,
        CmpOp::Less => lhs.compare(rhs, ic)? == Ordering::Less,
        CmpOp::LessEqual => lhs.compare(rhs, ic)? != Ordering::Greater,
        CmpOp::Match | CmpOp::NoMatch => {
            let text = lhs.to_str()?;
            let re = compile_pattern(&rhs.to_str()?, ic)?;
            re.is_match(&text) == (op == CmpOp::Match)
        }
        CmpOp::Is => lhs.is_same(rhs),
        CmpOp::IsNot => !lhs.is_same(rhs),
    })
}

fn slice_value(base: &Value, start: i64, end: Option<i64>) -> ScriptResult<Value> {
    match base {
        Value::List(list) => {
            let list = list.borrow();
            let len = list.len() as i64;
            let start = if start < 0 { (len + start).max(0) } else { start };
            let end = match end {
                Some(e) if e < 0 => len + e,
                Some(e) => e.min(len - 1),
                None => len - 1,
            };
            if start > end || start >= len {
                return Ok(Value::list(Vec::new()));
            }
            Ok(Value::list(list[start as usize..=end as usize].to_vec()))
        }
        Value::Dict(_) => Err(ScriptError::DictOperation),
        Value::Func(_) => Err(ScriptError::IndexFuncref),
        Value::Special(_) => Err(ScriptError::NotIndexable),
        scalar => Ok(Value::String(slice_str(&scalar.to_str()?, start, end))),
    }
}
