use super::UserFunction;
use crate::executor::{BreakCursor, Engine};
use crate::value::{new_dict, new_list, Dict, FuncRef, FuncTarget, List, Value};
use std::collections::HashSet;
use std::rc::Rc;
use tracing::trace;

/// Variables of one call: `l:`, `a:` and the `a:000` list.  Closures and
/// lambdas created during the call keep it alive through `parent`.
#[derive(Debug)]
pub struct FuncScope {
    pub locals: Dict,
    pub args: Dict,
    pub varargs: List,
    /// Scope of the frame the called closure was defined in.
    pub parent: Option<Rc<FuncScope>>,
}

impl FuncScope {
    pub fn new(parent: Option<Rc<FuncScope>>) -> Self {
        Self {
            locals: new_dict(),
            args: new_dict(),
            varargs: new_list(Vec::new()),
            parent,
        }
    }

    /// Something besides the finished call still refers to the scope or
    /// one of its containers.  `a:000` holds one reference of its own.
    pub fn escaped(self: &Rc<Self>) -> bool {
        Rc::strong_count(self) > 1
            || Rc::strong_count(&self.locals) > 1
            || Rc::strong_count(&self.args) > 1
            || Rc::strong_count(&self.varargs) > 2
    }

    fn clear(&self) {
        self.locals.borrow_mut().clear();
        self.args.borrow_mut().clear();
        self.varargs.borrow_mut().clear();
    }
}

/// `:defer Func(args)`, run when the frame ends.
#[derive(Debug, Clone)]
pub struct DeferredCall {
    pub func: FuncRef,
    pub args: Vec<Value>,
}

/// One active call.
pub struct CallFrame {
    pub func: Rc<UserFunction>,
    pub scope: Rc<FuncScope>,
    /// Index of the next body line.
    pub linenr: usize,
    pub returned: bool,
    pub rettv: Option<Value>,
    /// Next breakpoint line in this call.
    pub cursor: BreakCursor,
    /// Nesting level of the command that made the call.
    pub level: i32,
    pub defers: Vec<DeferredCall>,
}

/// Scopes of finished calls that something may still refer to.
#[derive(Debug, Default)]
pub struct Reclaimer {
    scopes: Vec<Rc<FuncScope>>,
}

impl Reclaimer {
    pub fn keep(&mut self, scope: Rc<FuncScope>) {
        self.scopes.push(scope);
    }

    /// Free scopes nothing refers to anymore.
    pub fn prune(&mut self) {
        let before = self.scopes.len();
        // Dropping one scope can release another through `parent`.
        loop {
            let len = self.scopes.len();
            self.scopes.retain(|scope| scope.escaped());
            if self.scopes.len() == len {
                break;
            }
        }
        if self.scopes.len() != before {
            trace!(freed = before - self.scopes.len(), kept = self.scopes.len(), "reclaimed frames");
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// Reachability marks for `garbage_collect`, by container address.
#[derive(Default)]
struct Marks {
    lists: HashSet<*const ()>,
    dicts: HashSet<*const ()>,
    scopes: HashSet<*const FuncScope>,
    funcs: HashSet<*const UserFunction>,
}

impl Marks {
    fn value(&mut self, engine: &Engine, value: &Value) {
        match value {
            Value::List(list) => self.list(engine, list),
            Value::Dict(dict) => self.dict(engine, dict),
            Value::Func(fref) => self.funcref(engine, fref),
            _ => {}
        }
    }

    fn list(&mut self, engine: &Engine, list: &List) {
        if !self.lists.insert(Rc::as_ptr(list) as *const ()) {
            return;
        }
        let items: Vec<Value> = list.borrow().clone();
        for item in &items {
            self.value(engine, item);
        }
    }

    fn dict(&mut self, engine: &Engine, dict: &Dict) {
        if !self.dicts.insert(Rc::as_ptr(dict) as *const ()) {
            return;
        }
        let items: Vec<Value> = dict.borrow().values().cloned().collect();
        for item in &items {
            self.value(engine, item);
        }
    }

    fn funcref(&mut self, engine: &Engine, fref: &FuncRef) {
        match &fref.target {
            FuncTarget::Func(func) => self.func(engine, func),
            FuncTarget::Name(name) => {
                if let Some(func) = engine.functions.get(name) {
                    self.func(engine, &func);
                }
            }
        }
        if let Some(dict) = &fref.self_dict {
            self.dict(engine, dict);
        }
        for arg in &fref.bound_args {
            self.value(engine, arg);
        }
    }

    fn func(&mut self, engine: &Engine, func: &Rc<UserFunction>) {
        if !self.funcs.insert(Rc::as_ptr(func)) {
            return;
        }
        if let Some(scope) = &func.scoped {
            self.scope(engine, scope);
        }
    }

    fn scope(&mut self, engine: &Engine, scope: &Rc<FuncScope>) {
        if !self.scopes.insert(Rc::as_ptr(scope)) {
            return;
        }
        self.dict(engine, &scope.locals);
        self.dict(engine, &scope.args);
        self.list(engine, &scope.varargs);
        if let Some(parent) = &scope.parent {
            self.scope(engine, parent);
        }
    }
}

impl Engine {
    /// Free reclaimed frames that cannot be reached anymore, including
    /// frames kept alive only by a cycle with their own closures.
    pub fn garbage_collect(&mut self) {
        self.reclaimer.prune();
        if self.reclaimer.is_empty() {
            return;
        }

        let mut marks = Marks::default();
        marks.dict(self, &self.globals.clone());
        let script_dicts: Vec<Dict> = self.script_vars.values().cloned().collect();
        for dict in &script_dicts {
            marks.dict(self, dict);
        }
        let active: Vec<Rc<FuncScope>> = self.frames.iter().map(|f| Rc::clone(&f.scope)).collect();
        for scope in &active {
            marks.scope(self, scope);
        }
        for frame in &self.frames {
            for call in &frame.defers {
                marks.funcref(self, &call.func);
                for arg in &call.args {
                    marks.value(self, arg);
                }
            }
        }
        for scope in self.functions.captured_scopes() {
            marks.scope(self, &scope);
        }
        let roots = self.gc_roots.clone();
        for root in &roots {
            marks.value(self, root);
        }

        let mut freed = 0usize;
        let mut kept = Vec::new();
        for scope in std::mem::take(&mut self.reclaimer.scopes) {
            if marks.scopes.contains(&Rc::as_ptr(&scope)) {
                kept.push(scope);
            } else {
                scope.clear();
                freed += 1;
            }
        }
        self.reclaimer.scopes = kept;
        self.reclaimer.prune();
        trace!(freed, kept = self.reclaimer.len(), "garbage collected");
    }

    /// Number of finished calls whose variables are still kept.
    pub fn retained_frames(&mut self) -> usize {
        self.reclaimer.prune();
        self.reclaimer.len()
    }

    /// Scope of the function frame selected for variable lookup: the
    /// current one, or the one picked with `frame`/`up`/`down` at the
    /// debug prompt.
    pub(crate) fn lookup_scope(&self) -> Option<Rc<FuncScope>> {
        let visible = self.frames.len().checked_sub(self.frame_base)?;
        if visible == 0 {
            return None;
        }
        let mut back = 0;
        if self.debugger.backtrace_level > 0 && self.debugger.prompt_frames == Some(self.frames.len()) {
            back = self.debugger.backtrace_level.min(visible - 1);
        }
        self.frames
            .get(self.frames.len() - 1 - back)
            .map(|f| Rc::clone(&f.scope))
    }
}
