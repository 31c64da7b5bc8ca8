//! User functions: definition, the function table, call frames and
//! closures.

mod call;
mod define;
mod frame;

pub use frame::{CallFrame, DeferredCall, FuncScope, Reclaimer};

use crate::error::ScriptResult;
use crate::executor::Engine;
use crate::parser::{Expr, Lambda};
use crate::value::Value;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// A function implemented in Rust and registered with the engine.
pub type NativeFn = Rc<dyn Fn(&mut Engine, &[Value]) -> ScriptResult<Value>>;

/// Name of a user function, as stored in the function table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FuncName {
    Global(String),
    /// `s:Name`, stored as `<SNR>{sid}_Name`.
    Script { sid: usize, name: String },
    Lambda(usize),
    /// Dictionary functions: `function dict.key()`.
    Numbered(usize),
}

impl fmt::Display for FuncName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncName::Global(name) => f.write_str(name),
            FuncName::Script { sid, name } => write!(f, "<SNR>{}_{}", sid, name),
            FuncName::Lambda(n) => write!(f, "<lambda>{}", n),
            FuncName::Numbered(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuncFlags {
    pub abort: bool,
    pub range: bool,
    pub dict: bool,
    pub closure: bool,
    /// Defined in the sandbox, runs in it.
    pub sandboxed: bool,
}

pub enum FuncBody {
    /// Body lines; `None` marks a continuation line joined into the
    /// previous one, so line numbers stay physical.
    Lines(Vec<Option<String>>),
    Lambda(Rc<Lambda>),
    /// Registered by the embedder.
    Native(NativeFn),
}

pub struct UserFunction {
    pub name: FuncName,
    pub params: Vec<String>,
    /// Default value expressions, parallel to `params`.
    pub defaults: Vec<Option<Expr>>,
    pub varargs: bool,
    pub body: FuncBody,
    pub flags: FuncFlags,
    pub script_id: usize,
    /// Scope of the frame a closure or lambda was created in.
    pub scoped: Option<Rc<FuncScope>>,
    /// Active calls.
    pub calls: Cell<usize>,
    /// Deleted with `:delfunction` while still referenced.
    pub deleted: Cell<bool>,
    /// Replaced by a new definition while being called.
    pub removed: Cell<bool>,
}

impl UserFunction {
    pub fn new(name: FuncName, body: FuncBody) -> Self {
        Self {
            name,
            params: Vec::new(),
            defaults: Vec::new(),
            varargs: false,
            body,
            flags: FuncFlags::default(),
            script_id: 0,
            scoped: None,
            calls: Cell::new(0),
            deleted: Cell::new(false),
            removed: Cell::new(false),
        }
    }

    pub fn lines(&self) -> &[Option<String>] {
        match &self.body {
            FuncBody::Lines(lines) => lines,
            _ => &[],
        }
    }

    /// Arguments that must be given.
    pub fn required_args(&self) -> usize {
        self.defaults.iter().filter(|d| d.is_none()).count()
    }

    /// "Name(a, b, ...) abort" as shown by `:function`.
    pub fn signature(&self) -> String {
        let mut params: Vec<String> = self
            .params
            .iter()
            .zip(&self.defaults)
            .map(|(p, d)| match d {
                Some(_) => format!("{} = ...", p),
                None => p.clone(),
            })
            .collect();
        if self.varargs {
            params.push("...".to_string());
        }
        let mut sig = format!("{}({})", self.name, params.join(", "));
        for (set, word) in [
            (self.flags.range, " range"),
            (self.flags.dict, " dict"),
            (self.flags.abort, " abort"),
            (self.flags.closure, " closure"),
        ] {
            if set {
                sig.push_str(word);
            }
        }
        sig
    }
}

impl fmt::Debug for UserFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserFunction")
            .field("name", &self.name.to_string())
            .field("params", &self.params)
            .field("varargs", &self.varargs)
            .field("flags", &self.flags)
            .field("calls", &self.calls.get())
            .finish()
    }
}

/// Named functions, plus weak entries for lambdas and dictionary
/// functions so they can be called by name while something holds them.
#[derive(Default)]
pub struct FunctionTable {
    named: HashMap<String, Rc<UserFunction>>,
    anonymous: HashMap<String, Weak<UserFunction>>,
    last_lambda: usize,
    last_numbered: usize,
}

impl FunctionTable {
    pub fn get(&self, name: &str) -> Option<Rc<UserFunction>> {
        self.named
            .get(name)
            .cloned()
            .or_else(|| self.anonymous.get(name).and_then(Weak::upgrade))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Install a named function, returning the one it replaces.
    pub fn insert(&mut self, func: Rc<UserFunction>) -> Option<Rc<UserFunction>> {
        self.named.insert(func.name.to_string(), func)
    }

    pub fn remove(&mut self, name: &str) -> Option<Rc<UserFunction>> {
        self.named.remove(name)
    }

    pub fn register_anonymous(&mut self, func: &Rc<UserFunction>) {
        self.anonymous.retain(|_, f| f.strong_count() > 0);
        self.anonymous.insert(func.name.to_string(), Rc::downgrade(func));
    }

    pub fn next_lambda(&mut self) -> FuncName {
        self.last_lambda += 1;
        FuncName::Lambda(self.last_lambda)
    }

    pub fn next_numbered(&mut self) -> FuncName {
        self.last_numbered += 1;
        FuncName::Numbered(self.last_numbered)
    }

    pub fn define_native(&mut self, name: &str, f: NativeFn) {
        let mut func = UserFunction::new(FuncName::Global(name.to_string()), FuncBody::Native(f));
        func.varargs = true;
        self.insert(Rc::new(func));
    }

    /// Named functions, sorted by name.
    pub fn named(&self) -> Vec<Rc<UserFunction>> {
        let mut funcs: Vec<_> = self.named.values().cloned().collect();
        funcs.sort_by_key(|f| f.name.to_string());
        funcs
    }

    /// Scopes captured by named closures; they stay reachable.
    pub fn captured_scopes(&self) -> Vec<Rc<FuncScope>> {
        self.named.values().filter_map(|f| f.scoped.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_func(name: FuncName) -> UserFunction {
        UserFunction::new(name, FuncBody::Lines(vec![Some("return 1".into())]))
    }

    #[test]
    fn test_func_names() {
        assert_eq!(FuncName::Global("Foo".into()).to_string(), "Foo");
        assert_eq!(
            FuncName::Script {
                sid: 3,
                name: "Bar".into()
            }
            .to_string(),
            "<SNR>3_Bar"
        );
        assert_eq!(FuncName::Lambda(2).to_string(), "<lambda>2");
        assert_eq!(FuncName::Numbered(7).to_string(), "7");
    }

    #[test]
    fn test_anonymous_entries_are_weak() {
        let mut table = FunctionTable::default();
        let name = table.next_lambda();
        let func = Rc::new(lines_func(name));
        table.register_anonymous(&func);
        assert!(table.contains("<lambda>1"));
        drop(func);
        assert!(!table.contains("<lambda>1"));
    }

    #[test]
    fn test_signature() {
        let mut func = lines_func(FuncName::Global("F".into()));
        func.params = vec!["a".into(), "b".into()];
        func.defaults = vec![None, Some(Expr::Number(1))];
        func.varargs = true;
        func.flags.abort = true;
        assert_eq!(func.signature(), "F(a, b = ..., ...) abort");
        assert_eq!(func.required_args(), 1);
    }
}
