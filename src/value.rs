use crate::error::{ScriptError, ScriptResult};
use crate::userfunc::UserFunction;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

pub type List = Rc<RefCell<Vec<Value>>>;
pub type Dict = Rc<RefCell<BTreeMap<String, Value>>>;

/// Containers nested deeper than this print as `[...]` / `{...}`.
const MAX_REPR_DEPTH: usize = 100;

pub fn new_list(items: Vec<Value>) -> List {
    Rc::new(RefCell::new(items))
}

pub fn new_dict() -> Dict {
    Rc::new(RefCell::new(BTreeMap::new()))
}

/// `v:false`, `v:true` and `v:null`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    False,
    True,
    Null,
}

impl Special {
    fn name(self) -> &'static str {
        match self {
            Special::False => "v:false",
            Special::True => "v:true",
            Special::Null => "v:null",
        }
    }
}

#[derive(Clone)]
pub enum FuncTarget {
    /// Resolved by name at call time (builtins and named user functions).
    Name(String),
    /// Held directly; keeps lambdas and numbered functions alive.
    Func(Rc<UserFunction>),
}

/// A Funcref, possibly a partial with a bound dictionary and arguments.
#[derive(Clone)]
pub struct FuncRef {
    pub target: FuncTarget,
    pub self_dict: Option<Dict>,
    pub bound_args: Vec<Value>,
}

impl FuncRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            target: FuncTarget::Name(name.into()),
            self_dict: None,
            bound_args: Vec::new(),
        }
    }

    pub fn to_func(func: Rc<UserFunction>) -> Self {
        Self {
            target: FuncTarget::Func(func),
            self_dict: None,
            bound_args: Vec::new(),
        }
    }

    pub fn name(&self) -> String {
        match &self.target {
            FuncTarget::Name(name) => name.clone(),
            FuncTarget::Func(func) => func.name.to_string(),
        }
    }

    pub(crate) fn same_target(&self, other: &FuncRef) -> bool {
        match (&self.target, &other.target) {
            (FuncTarget::Func(a), FuncTarget::Func(b)) => Rc::ptr_eq(a, b),
            _ => self.name() == other.name(),
        }
    }

    fn is_partial(&self) -> bool {
        self.self_dict.is_some() || !self.bound_args.is_empty()
    }
}

impl fmt::Debug for FuncRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function('{}')", self.name())
    }
}

#[derive(Clone)]
pub enum Value {
    Number(i64),
    String(String),
    Special(Special),
    List(List),
    Dict(Dict),
    Func(FuncRef),
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Number(b as i64)
    }
}

impl Value {
    pub fn list(items: Vec<Value>) -> Self {
        Value::List(new_list(items))
    }

    pub fn dict(entries: BTreeMap<String, Value>) -> Self {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    /// Number reported by `type()`.
    pub fn type_number(&self) -> i64 {
        match self {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Func(_) => 2,
            Value::List(_) => 3,
            Value::Dict(_) => 4,
            Value::Special(Special::Null) => 7,
            Value::Special(_) => 6,
        }
    }

    pub fn to_number(&self) -> ScriptResult<i64> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::String(s) => Ok(str_to_number(s)),
            Value::Special(Special::True) => Ok(1),
            Value::Special(_) => Ok(0),
            Value::List(_) => Err(ScriptError::ListAsNumber),
            Value::Dict(_) => Err(ScriptError::DictAsNumber),
            Value::Func(_) => Err(ScriptError::FuncrefAsNumber),
        }
    }

    pub fn is_truthy(&self) -> ScriptResult<bool> {
        Ok(self.to_number()? != 0)
    }

    /// The value used where a String is expected (concatenation, `:execute`).
    pub fn to_str(&self) -> ScriptResult<String> {
        match self {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => Ok(s.clone()),
            Value::Special(sp) => Ok(sp.name().to_string()),
            Value::List(_) => Err(ScriptError::ListAsString),
            Value::Dict(_) => Err(ScriptError::DictAsString),
            Value::Func(_) => Err(ScriptError::FuncrefAsString),
        }
    }

    /// What `:echo` shows: strings bare, everything else as `string()`.
    pub fn to_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            other => other.repr(),
        }
    }

    /// The `string()` representation.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, 0);
        out
    }

    fn write_repr(&self, out: &mut String, depth: usize) {
        match self {
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::String(s) => {
                out.push('\'');
                out.push_str(&s.replace('\'', "''"));
                out.push('\'');
            }
            Value::Special(sp) => out.push_str(sp.name()),
            Value::List(list) => {
                if depth > MAX_REPR_DEPTH {
                    out.push_str("[...]");
                    return;
                }
                out.push('[');
                for (i, item) in list.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, depth + 1);
                }
                out.push(']');
            }
            Value::Dict(dict) => {
                if depth > MAX_REPR_DEPTH {
                    out.push_str("{...}");
                    return;
                }
                out.push('{');
                for (i, (key, item)) in dict.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push('\'');
                    out.push_str(&key.replace('\'', "''"));
                    out.push_str("': ");
                    item.write_repr(out, depth + 1);
                }
                out.push('}');
            }
            Value::Func(fref) => {
                out.push_str("function('");
                out.push_str(&fref.name());
                out.push('\'');
                if !fref.bound_args.is_empty() {
                    out.push_str(", ");
                    Value::list(fref.bound_args.clone()).write_repr(out, depth + 1);
                }
                if let Some(d) = &fref.self_dict {
                    out.push_str(", ");
                    Value::Dict(d.clone()).write_repr(out, depth + 1);
                }
                out.push(')');
            }
        }
    }

    /// `==` with Vim's conversions: Number and String compare numerically,
    /// containers compare deeply and only against their own kind.
    pub fn loose_eq(&self, other: &Value, ic: bool) -> ScriptResult<bool> {
        match (self, other) {
            (Value::List(_), Value::List(_)) => Ok(deep_equal(self, other, ic, 0)),
            (Value::List(_), _) | (_, Value::List(_)) => Err(ScriptError::CompareList),
            (Value::Dict(_), Value::Dict(_)) => Ok(deep_equal(self, other, ic, 0)),
            (Value::Dict(_), _) | (_, Value::Dict(_)) => Err(ScriptError::CompareDict),
            (Value::Func(_), Value::Func(_)) => Ok(deep_equal(self, other, ic, 0)),
            (Value::Func(_), _) | (_, Value::Func(_)) => Err(ScriptError::FuncrefOperation),
            (Value::String(a), Value::String(b)) => Ok(if ic {
                a.to_lowercase() == b.to_lowercase()
            } else {
                a == b
            }),
            _ => Ok(self.to_number()? == other.to_number()?),
        }
    }

    /// `is`: identity for containers and functions, same type and value otherwise.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Func(a), Value::Func(b)) => {
                a.same_target(b) && !a.is_partial() && !b.is_partial()
            }
            _ => self.type_number() == other.type_number() && deep_equal(self, other, false, 0),
        }
    }

    /// Ordering for `<`, `>` and friends.
    pub fn compare(&self, other: &Value, ic: bool) -> ScriptResult<std::cmp::Ordering> {
        match (self, other) {
            (Value::List(_), _) | (_, Value::List(_)) => Err(ScriptError::ListOperation),
            (Value::Dict(_), _) | (_, Value::Dict(_)) => Err(ScriptError::DictOperation),
            (Value::Func(_), _) | (_, Value::Func(_)) => Err(ScriptError::FuncrefOperation),
            (Value::String(a), Value::String(b)) => Ok(if ic {
                a.to_lowercase().cmp(&b.to_lowercase())
            } else {
                a.cmp(b)
            }),
            _ => Ok(self.to_number()?.cmp(&other.to_number()?)),
        }
    }

    /// Copy the top level of a container.
    pub fn shallow_copy(&self) -> Value {
        match self {
            Value::List(list) => Value::list(list.borrow().clone()),
            Value::Dict(dict) => Value::dict(dict.borrow().clone()),
            other => other.clone(),
        }
    }

    pub fn from_json(json: serde_json::Value) -> ScriptResult<Value> {
        Ok(match json {
            serde_json::Value::Null => Value::Special(Special::Null),
            serde_json::Value::Bool(b) => Value::Special(if b { Special::True } else { Special::False }),
            serde_json::Value::Number(n) => Value::Number(n.as_i64().ok_or(ScriptError::InvalidJson)?),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::list(
                items
                    .into_iter()
                    .map(Value::from_json)
                    .collect::<ScriptResult<Vec<_>>>()?,
            ),
            serde_json::Value::Object(map) => {
                let mut entries = BTreeMap::new();
                for (key, item) in map {
                    entries.insert(key, Value::from_json(item)?);
                }
                Value::dict(entries)
            }
        })
    }
}

/// Strict structural equality: no Number/String conversion, used for list
/// and dict members and for watch expression values.
pub fn deep_equal(a: &Value, b: &Value, ic: bool, depth: usize) -> bool {
    if depth > MAX_REPR_DEPTH {
        return false;
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => {
            if ic {
                x.to_lowercase() == y.to_lowercase()
            } else {
                x == y
            }
        }
        (Value::Special(x), Value::Special(y)) => x == y,
        (Value::Special(_), Value::Number(_)) | (Value::Number(_), Value::Special(_)) => {
            a.to_number().ok() == b.to_number().ok()
        }
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x
                    .iter()
                    .zip(y.iter())
                    .all(|(p, q)| deep_equal(p, q, ic, depth + 1))
        }
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter().all(|(key, p)| match y.get(key) {
                    Some(q) => deep_equal(p, q, ic, depth + 1),
                    None => false,
                })
        }
        (Value::Func(x), Value::Func(y)) => {
            x.same_target(y)
                && x.bound_args.len() == y.bound_args.len()
                && x
                    .bound_args
                    .iter()
                    .zip(y.bound_args.iter())
                    .all(|(p, q)| deep_equal(p, q, ic, depth + 1))
                && match (&x.self_dict, &y.self_dict) {
                    (None, None) => true,
                    (Some(p), Some(q)) => Rc::ptr_eq(p, q),
                    _ => false,
                }
        }
        _ => false,
    }
}

/// Leading-number conversion of a String: "12abc" is 12, "abc" is 0.
pub fn str_to_number(s: &str) -> i64 {
    let bytes = s.as_bytes();
    let mut i = 0;
    let negative = bytes.first() == Some(&b'-');
    if negative {
        i += 1;
    }
    let rest = &s[i..];
    let (radix, digits) = if rest.starts_with("0x") || rest.starts_with("0X") {
        (16, &rest[2..])
    } else if rest.starts_with("0b") || rest.starts_with("0B") {
        (2, &rest[2..])
    } else {
        (10, rest)
    };
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix))
        .map(|(idx, _)| idx)
        .unwrap_or(digits.len());
    let n = i64::from_str_radix(&digits[..end], radix).unwrap_or(0);
    if negative {
        -n
    } else {
        n
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Number(n) => serializer.serialize_i64(*n),
            Value::String(s) => serializer.serialize_str(s),
            Value::Special(Special::True) => serializer.serialize_bool(true),
            Value::Special(Special::False) => serializer.serialize_bool(false),
            Value::Special(Special::Null) => serializer.serialize_unit(),
            Value::List(list) => {
                let list = list.borrow();
                let mut seq = serializer.serialize_seq(Some(list.len()))?;
                for item in list.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Dict(dict) => {
                let dict = dict.borrow();
                let mut map = serializer.serialize_map(Some(dict.len()))?;
                for (key, item) in dict.iter() {
                    map.serialize_entry(key, item)?;
                }
                map.end()
            }
            Value::Func(_) => Err(S::Error::custom(ScriptError::InvalidJson.to_string())),
        }
    }
}
