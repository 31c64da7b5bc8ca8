//! Builtin functions.

use super::list_index;
use crate::error::{ScriptError, ScriptResult};
use crate::executor::Engine;
use crate::parser::{compile_pattern, parse_lvalue, LetTarget};
use crate::value::{new_list, Dict, FuncRef, FuncTarget, List, Special, Value};

/// Name, minimum and maximum number of arguments.
const BUILTINS: &[(&str, usize, usize)] = &[
    ("abs", 1, 1),
    ("add", 2, 2),
    ("call", 2, 3),
    ("copy", 1, 1),
    ("empty", 1, 1),
    ("exists", 1, 1),
    ("funcref", 1, 3),
    ("function", 1, 3),
    ("garbagecollect", 0, 1),
    ("get", 2, 3),
    ("has_key", 2, 2),
    ("insert", 2, 3),
    ("join", 1, 2),
    ("json_decode", 1, 1),
    ("json_encode", 1, 1),
    ("keys", 1, 1),
    ("len", 1, 1),
    ("max", 1, 1),
    ("min", 1, 1),
    ("range", 1, 3),
    ("remove", 2, 3),
    ("split", 1, 3),
    ("string", 1, 1),
    ("tolower", 1, 1),
    ("toupper", 1, 1),
    ("type", 1, 1),
    ("values", 1, 1),
];

pub(crate) fn exists(name: &str) -> bool {
    BUILTINS.iter().any(|(n, _, _)| *n == name)
}

fn list_arg(value: &Value) -> ScriptResult<List> {
    match value {
        Value::List(list) => Ok(list.clone()),
        _ => Err(ScriptError::ListRequired),
    }
}

fn dict_arg(value: &Value) -> ScriptResult<Dict> {
    match value {
        Value::Dict(dict) => Ok(dict.clone()),
        _ => Err(ScriptError::DictRequired),
    }
}

fn len(value: &Value) -> ScriptResult<Value> {
    let n = match value {
        Value::String(s) => s.len(),
        Value::Number(n) => n.to_string().len(),
        Value::List(list) => list.borrow().len(),
        Value::Dict(dict) => dict.borrow().len(),
        Value::Special(_) | Value::Func(_) => return Err(ScriptError::InvalidLenType),
    };
    Ok(Value::Number(n as i64))
}

fn empty(value: &Value) -> bool {
    match value {
        Value::Number(n) => *n == 0,
        Value::String(s) => s.is_empty(),
        Value::List(list) => list.borrow().is_empty(),
        Value::Dict(dict) => dict.borrow().is_empty(),
        Value::Special(sp) => *sp != Special::True,
        Value::Func(_) => false,
    }
}

fn range(args: &[Value]) -> ScriptResult<Value> {
    let first = args[0].to_number()?;
    let (start, end) = match args.get(1) {
        Some(end) => (first, end.to_number()?),
        None => (0, first - 1),
    };
    let stride = match args.get(2) {
        Some(stride) => stride.to_number()?,
        None => 1,
    };
    if stride == 0 {
        return Err(ScriptError::ZeroStride);
    }
    if (stride > 0 && end + 1 < start) || (stride < 0 && end - 1 > start) {
        return Err(ScriptError::StartPastEnd);
    }
    let mut items = Vec::new();
    let mut i = start;
    while (stride > 0 && i <= end) || (stride < 0 && i >= end) {
        items.push(Value::Number(i));
        i += stride;
    }
    Ok(Value::list(items))
}

/// `split()`: empty items only survive in the middle, unless `keepempty`.
fn split(args: &[Value]) -> ScriptResult<Value> {
    let text = args[0].to_str()?;
    let pattern = match args.get(1) {
        Some(p) => p.to_str()?,
        None => String::new(),
    };
    let keepempty = match args.get(2) {
        Some(k) => k.is_truthy()?,
        None => false,
    };
    let pattern = if pattern.is_empty() { "\\s\\+".to_string() } else { pattern };
    let re = compile_pattern(&pattern, false)?;
    let mut parts: Vec<&str> = re.split(&text).collect();
    if !keepempty {
        if parts.first() == Some(&"") {
            parts.remove(0);
        }
        if parts.last() == Some(&"") {
            parts.pop();
        }
    }
    Ok(Value::list(parts.into_iter().map(Value::from).collect()))
}

fn extreme(value: &Value, want_max: bool) -> ScriptResult<Value> {
    let items: Vec<Value> = match value {
        Value::List(list) => list.borrow().clone(),
        Value::Dict(dict) => dict.borrow().values().cloned().collect(),
        _ => return Err(ScriptError::ListRequired),
    };
    let mut best: Option<i64> = None;
    for item in &items {
        let n = item.to_number()?;
        best = Some(match best {
            Some(b) if want_max => b.max(n),
            Some(b) => b.min(n),
            None => n,
        });
    }
    Ok(Value::Number(best.unwrap_or(0)))
}

impl Engine {
    /// Call builtin `name`; `None` when there is no such builtin.
    pub(crate) fn call_builtin(&mut self, name: &str, args: &[Value]) -> Option<ScriptResult<Value>> {
        let (_, min, max) = BUILTINS.iter().find(|(n, _, _)| *n == name)?;
        if args.len() < *min {
            return Some(Err(ScriptError::BuiltinTooFew(name.to_string())));
        }
        if args.len() > *max {
            return Some(Err(ScriptError::BuiltinTooMany(name.to_string())));
        }
        Some(self.dispatch_builtin(name, args))
    }

    fn dispatch_builtin(&mut self, name: &str, args: &[Value]) -> ScriptResult<Value> {
        match name {
            "abs" => Ok(Value::Number(args[0].to_number()?.wrapping_abs())),
            "add" => {
                let list = list_arg(&args[0])?;
                list.borrow_mut().push(args[1].clone());
                Ok(args[0].clone())
            }
            "call" => {
                let fref = self.funcref_arg(&args[0])?;
                let call_args = list_arg(&args[1])?.borrow().clone();
                let self_dict = args.get(2).map(dict_arg).transpose()?;
                self.call_func(&fref, call_args, self_dict)
            }
            "copy" => Ok(args[0].shallow_copy()),
            "empty" => Ok(Value::from(empty(&args[0]))),
            "exists" => Ok(Value::from(self.exists(&args[0].to_str()?))),
            "funcref" | "function" => self.make_funcref(name == "funcref", args),
            "garbagecollect" => {
                self.want_gc = true;
                Ok(Value::Number(0))
            }
            "get" => {
                let default = args.get(2).cloned().unwrap_or_default();
                Ok(match &args[0] {
                    Value::List(list) => {
                        let n = args[1].to_number()?;
                        let list = list.borrow();
                        list_index(n, list.len()).map_or(default, |i| list[i].clone())
                    }
                    Value::Dict(dict) => {
                        let key = args[1].to_str()?;
                        let item = dict.borrow().get(&key).cloned();
                        item.unwrap_or(default)
                    }
                    Value::Func(fref) if args[1].to_str()? == "name" => Value::String(fref.name()),
                    Value::Func(fref) if args[1].to_str()? == "args" => Value::list(fref.bound_args.clone()),
                    Value::Func(fref) if args[1].to_str()? == "dict" => {
                        fref.self_dict.clone().map_or(default, Value::Dict)
                    }
                    _ => return Err(ScriptError::ListRequired),
                })
            }
            "has_key" => {
                let dict = dict_arg(&args[0])?;
                let key = args[1].to_str()?;
                let found = dict.borrow().contains_key(&key);
                Ok(Value::from(found))
            }
            "insert" => {
                let list = list_arg(&args[0])?;
                let n = match args.get(2) {
                    Some(idx) => idx.to_number()?,
                    None => 0,
                };
                let len = list.borrow().len();
                let idx = if n == len as i64 {
                    len
                } else {
                    list_index(n, len).ok_or(ScriptError::ListIndex(n))?
                };
                list.borrow_mut().insert(idx, args[1].clone());
                Ok(args[0].clone())
            }
            "join" => {
                let list = list_arg(&args[0])?;
                let sep = match args.get(1) {
                    Some(sep) => sep.to_str()?,
                    None => " ".to_string(),
                };
                let parts: Vec<String> = list.borrow().iter().map(Value::to_display).collect();
                Ok(Value::String(parts.join(&sep)))
            }
            "json_decode" => {
                let text = args[0].to_str()?;
                let json: serde_json::Value = serde_json::from_str(&text).map_err(|_| ScriptError::InvalidJson)?;
                Value::from_json(json)
            }
            "json_encode" => serde_json::to_string(&args[0])
                .map(Value::String)
                .map_err(|_| ScriptError::InvalidJson),
            "keys" => {
                let dict = dict_arg(&args[0])?;
                let keys = dict.borrow().keys().map(|k| Value::from(k.as_str())).collect();
                Ok(Value::list(keys))
            }
            "len" => len(&args[0]),
            "max" => extreme(&args[0], true),
            "min" => extreme(&args[0], false),
            "range" => range(args),
            "remove" => self.remove(args),
            "split" => split(args),
            "string" => Ok(Value::String(args[0].repr())),
            "tolower" => Ok(Value::String(args[0].to_str()?.to_lowercase())),
            "toupper" => Ok(Value::String(args[0].to_str()?.to_uppercase())),
            "type" => Ok(Value::Number(args[0].type_number())),
            "values" => {
                let dict = dict_arg(&args[0])?;
                let values = dict.borrow().values().cloned().collect();
                Ok(Value::list(values))
            }
            _ => Err(ScriptError::UnknownFunction(name.to_string())),
        }
    }

    /// A Funcref, or the name of a function, as passed to `call()`.
    fn funcref_arg(&self, value: &Value) -> ScriptResult<FuncRef> {
        match value {
            Value::Func(fref) => Ok(fref.clone()),
            Value::String(name) => Ok(FuncRef::named(self.resolve_func_name(name))),
            other => Err(ScriptError::UnknownFuncref(other.to_display())),
        }
    }

    /// `function()` refers to the function by name; `funcref()` holds on
    /// to the function itself, so it keeps working after `:delfunction`.
    fn make_funcref(&mut self, hold: bool, args: &[Value]) -> ScriptResult<Value> {
        let mut fref = match &args[0] {
            Value::Func(fref) => fref.clone(),
            Value::String(name) => {
                let resolved = self.resolve_func_name(name);
                match self.functions.get(&resolved) {
                    Some(func) if hold => FuncRef::to_func(func),
                    Some(_) => FuncRef::named(resolved),
                    None if exists(&resolved) => FuncRef::named(resolved),
                    None => return Err(ScriptError::UnknownFuncref(name.clone())),
                }
            }
            other => return Err(ScriptError::UnknownFuncref(other.to_display())),
        };
        if hold {
            if let FuncTarget::Name(name) = &fref.target {
                if let Some(func) = self.functions.get(name) {
                    fref.target = FuncTarget::Func(func);
                }
            }
        }
        for extra in &args[1..] {
            match extra {
                Value::List(list) => fref.bound_args.extend(list.borrow().iter().cloned()),
                Value::Dict(dict) => fref.self_dict = Some(dict.clone()),
                _ => return Err(ScriptError::ListRequired),
            }
        }
        Ok(Value::Func(fref))
    }

    fn remove(&mut self, args: &[Value]) -> ScriptResult<Value> {
        match &args[0] {
            Value::List(list) => {
                let len = list.borrow().len();
                let n = args[1].to_number()?;
                let start = list_index(n, len).ok_or(ScriptError::ListIndex(n))?;
                let Some(end) = args.get(2) else {
                    return Ok(list.borrow_mut().remove(start));
                };
                let m = end.to_number()?;
                let end = list_index(m, len).ok_or(ScriptError::ListIndex(m))?;
                if end < start {
                    return Err(ScriptError::InvalidArgument(m.to_string()));
                }
                let removed: Vec<Value> = list.borrow_mut().drain(start..=end).collect();
                Ok(Value::List(new_list(removed)))
            }
            Value::Dict(dict) => {
                let key = args[1].to_str()?;
                let removed = dict.borrow_mut().remove(&key);
                removed.ok_or(ScriptError::MissingKey(key))
            }
            _ => Err(ScriptError::ListRequired),
        }
    }

    /// `exists()`: "*Name" for functions, a variable name (with keys or
    /// indexes) otherwise.
    fn exists(&mut self, what: &str) -> bool {
        if let Some(name) = what.strip_prefix('*') {
            let resolved = self.resolve_func_name(name);
            return self.functions.contains(&resolved) || exists(&resolved);
        }
        let Ok((target, used)) = parse_lvalue(what) else {
            return false;
        };
        if used != what.len() {
            return false;
        }
        let LetTarget::Var { name, path } = target else {
            return false;
        };
        let Some(mut value) = self.lookup_var(&name) else {
            return false;
        };
        self.ctx.emsg_skip += 1;
        let mut found = true;
        for accessor in &path {
            match self.eval_accessor(value, accessor) {
                Ok(next) => value = next,
                Err(_) => {
                    found = false;
                    break;
                }
            }
        }
        self.ctx.emsg_skip -= 1;
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn show(src: &str) -> String {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.eval(src).map(|v| v.repr()).unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn test_container_builtins() {
        assert_eq!(show("len([1, 2, 3])"), "3");
        assert_eq!(show("len('abc')"), "3");
        assert_eq!(show("len(v:true)"), "E701: Invalid type for len()");
        assert_eq!(show("add([1], 2)"), "[1, 2]");
        assert_eq!(show("insert([1, 2], 0)"), "[0, 1, 2]");
        assert_eq!(show("insert([1, 2], 3, 2)"), "[1, 2, 3]");
        assert_eq!(show("remove([1, 2, 3], 1)"), "2");
        assert_eq!(show("remove([1, 2, 3, 4], 1, 2)"), "[2, 3]");
        assert_eq!(show("remove({'a': 1}, 'b')"), "E716: Key not present in Dictionary: \"b\"");
        assert_eq!(show("get([1], 5, 'x')"), "'x'");
        assert_eq!(show("get({'a': 1}, 'a')"), "1");
        assert_eq!(show("has_key({'a': 1}, 'a')"), "1");
        assert_eq!(show("keys({'b': 1, 'a': 2})"), "['a', 'b']");
        assert_eq!(show("values({'b': 1, 'a': 2})"), "[2, 1]");
        assert_eq!(show("empty([]) . empty('x') . empty(v:null)"), "'101'");
    }

    #[test]
    fn test_range() {
        assert_eq!(show("range(3)"), "[0, 1, 2]");
        assert_eq!(show("range(2, 4)"), "[2, 3, 4]");
        assert_eq!(show("range(5, 0, -2)"), "[5, 3, 1]");
        assert_eq!(show("range(2, 1)"), "[]");
        assert_eq!(show("range(1, 2, 0)"), "E726: Stride is zero");
        assert_eq!(show("range(5, 1)"), "E727: Start past end");
    }

    #[test]
    fn test_strings() {
        assert_eq!(show("join([1, 'a', [2]], '-')"), "'1-a-[2]'");
        assert_eq!(show("split('  a b  c ')"), "['a', 'b', 'c']");
        assert_eq!(show("split(':a::b:', ':')"), "['a', '', 'b']");
        assert_eq!(show("split(':a:', ':', 1)"), "['', 'a', '']");
        assert_eq!(show("toupper('abc') . tolower('DEF')"), "'ABCdef'");
        assert_eq!(show("string({'a': [1]})"), "'{''a'': [1]}'");
        assert_eq!(show("max([3, 9, 2]) - min([3, 9, 2])"), "7");
        assert_eq!(show("abs(-4)"), "4");
    }

    #[test]
    fn test_argument_counts() {
        assert_eq!(show("len()"), "E119: Not enough arguments for function: len");
        assert_eq!(show("abs(1, 2)"), "E118: Too many arguments for function: abs");
    }

    #[test]
    fn test_json() {
        assert_eq!(show("json_encode({'a': [1, v:true, v:null]})"), "'{\"a\":[1,true,null]}'");
        assert_eq!(show("json_decode('[1, {\"k\": \"v\"}]')"), "[1, {'k': 'v'}]");
        assert_eq!(show("json_decode('[1,')"), "E474: Invalid argument");
    }

    #[test]
    fn test_function_and_call() {
        assert_eq!(show("call('len', [[1, 2]])"), "2");
        assert_eq!(show("function('len', [[1, 2, 3]])()"), "3");
        assert_eq!(show("function('Nope')"), "E700: Unknown function: Nope");
        assert_eq!(show("call(function('add', [[]]), [1])"), "[1]");
        assert_eq!(show("call({x -> x + 1}, [1])"), "2");
    }

    #[test]
    fn test_exists() {
        let mut engine = Engine::captured(EngineConfig::default());
        engine.source_str("e.vim", "let g:d = {'k': [1]}\nfunction F()\nendfunction");
        let check = |engine: &mut Engine, what: &str| engine.eval(&format!("exists('{}')", what)).unwrap().repr();
        assert_eq!(check(&mut engine, "g:d"), "1");
        assert_eq!(check(&mut engine, "d.k"), "1");
        assert_eq!(check(&mut engine, "d.x"), "0");
        assert_eq!(check(&mut engine, "*F"), "1");
        assert_eq!(check(&mut engine, "*len"), "1");
        assert_eq!(check(&mut engine, "*G"), "0");
    }
}
