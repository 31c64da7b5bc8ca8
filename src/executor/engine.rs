use super::output::{Message, Output, OutputMode};
use super::source::{ScriptSource, StringSource};
use super::DoCmdFlags;
use crate::config::EngineConfig;
use crate::context::InterpreterContext;
use crate::debugger::{DebugContext, DebugInput};
use crate::error::{ScriptError, ScriptResult};
use crate::parser::preprocess_source;
use crate::userfunc::{CallFrame, FunctionTable, NativeFn, Reclaimer};
use crate::value::{new_dict, Dict, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Where the command being executed came from.
#[derive(Debug, Default, Clone)]
pub struct Sourcing {
    /// "path/to/script.vim", "function Name" or "function A[3]..B".
    pub name: Option<String>,
    pub lnum: usize,
}

/// Requests an interrupt from another thread or a signal handler.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn interrupt(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// The interpreter: variables, functions, the call stack and the debugger.
pub struct Engine {
    pub(crate) ctx: InterpreterContext,
    pub(crate) config: EngineConfig,
    pub(crate) debugger: DebugContext,
    pub(crate) sourcing: Sourcing,
    pub(crate) globals: Dict,
    pub(crate) script_vars: HashMap<usize, Dict>,
    /// Script names, the script id is the index plus one.
    pub(crate) scripts: Vec<String>,
    pub(crate) current_sid: usize,
    pub(crate) functions: FunctionTable,
    pub(crate) frames: Vec<CallFrame>,
    /// Frames below this index belong to callers hidden by `:source`.
    pub(crate) frame_base: usize,
    pub(crate) reclaimer: Reclaimer,
    pub(crate) gc_roots: Vec<Value>,
    pub(crate) output: Output,
    pub(crate) msg_silent: usize,
    pub(crate) cmdline_depth: usize,
    /// `garbagecollect()` was called; collect when back at the top level.
    pub(crate) want_gc: bool,
    interrupt: InterruptHandle,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            ctx: InterpreterContext::default(),
            config,
            debugger: DebugContext::default(),
            sourcing: Sourcing::default(),
            globals: new_dict(),
            script_vars: HashMap::new(),
            scripts: Vec::new(),
            current_sid: 0,
            functions: FunctionTable::default(),
            frames: Vec::new(),
            frame_base: 0,
            reclaimer: Reclaimer::default(),
            gc_roots: Vec::new(),
            output: Output::new(OutputMode::Terminal),
            msg_silent: 0,
            cmdline_depth: 0,
            want_gc: false,
            interrupt: InterruptHandle::default(),
        }
    }

    /// An engine that keeps its output in memory.
    pub fn captured(config: EngineConfig) -> Self {
        let mut engine = Self::with_config(config);
        engine.output = Output::new(OutputMode::Captured);
        engine
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // --- messages ---

    pub(crate) fn msg(&mut self, text: &str) {
        if self.msg_silent == 0 {
            self.output.info(text);
        }
    }

    /// `:echon` output, continuing the current line.
    pub(crate) fn msg_append(&mut self, text: &str) {
        if self.msg_silent == 0 {
            self.output.append(text);
        }
    }

    pub(crate) fn debug_msg(&mut self, text: &str) {
        self.output.debug(text);
    }

    /// Report an error: turned into an exception inside a try, shown
    /// otherwise.
    pub(crate) fn emsg(&mut self, err: &ScriptError) {
        if err.is_silent() || self.ctx.emsg_skip > 0 {
            return;
        }
        let text = err.to_string();
        let mut ignore = false;
        if self.cause_errthrow(&text, &mut ignore) {
            if !ignore {
                self.ctx.did_emsg = true;
            }
            return;
        }
        self.ctx.errmsg = text.clone();
        if self.ctx.emsg_silent > 0 {
            return;
        }
        self.ctx.did_emsg = true;
        self.msg_silent = 0;
        debug!(message = %text, "error");
        let name = self.sourcing.name.clone();
        self.output.error(&text, name.as_deref(), self.sourcing.lnum);
    }

    /// Output in captured mode.
    pub fn output(&self) -> &[Message] {
        self.output.captured()
    }

    /// Text of every captured line so far.
    pub fn messages(&self) -> Vec<String> {
        self.output.captured().iter().map(|m| m.text().to_string()).collect()
    }

    pub fn take_messages(&mut self) -> Vec<String> {
        self.output
            .take_captured()
            .into_iter()
            .map(|m| m.text().to_string())
            .collect()
    }

    // --- debugger and interrupts ---

    pub fn set_debug_input(&mut self, input: Box<dyn DebugInput>) {
        self.debugger.set_input(input);
    }

    /// Stop before commands at nesting `level` or lower (9999 steps through everything).
    pub fn set_break_level(&mut self, level: i32) {
        self.debugger.break_level = level;
    }

    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Move a requested interrupt into the interpreter state.
    pub(crate) fn poll_interrupt(&mut self) {
        if self.interrupt.take() {
            info!("interrupt requested");
            self.ctx.got_int = true;
        }
    }

    // --- running scripts ---

    fn begin_toplevel(&mut self) {
        if self.cmdline_depth == 0 {
            self.debugger.did_msg = false;
            self.ctx.got_int = false;
            self.ctx.did_emsg = false;
            self.output.reset_context();
        }
    }

    fn end_toplevel(&mut self) {
        if self.cmdline_depth == 0 && self.want_gc {
            self.want_gc = false;
            self.garbage_collect();
        }
    }

    fn script_id(&mut self, name: &str) -> usize {
        match self.scripts.iter().position(|s| s == name) {
            Some(idx) => idx + 1,
            None => {
                self.scripts.push(name.to_string());
                self.scripts.len()
            }
        }
    }

    /// Run script text as if sourced from a file called `name`.
    pub fn source_str(&mut self, name: &str, text: &str) {
        self.begin_toplevel();
        self.do_source(name, text);
        self.end_toplevel();
    }

    pub fn source_file(&mut self, path: impl AsRef<Path>) -> ScriptResult<()> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|_| ScriptError::CantOpenFile(name.clone()))?;
        self.source_str(&name, &text);
        Ok(())
    }

    pub(crate) fn do_source(&mut self, name: &str, text: &str) {
        let sid = self.script_id(name);
        let saved_sourcing = std::mem::replace(
            &mut self.sourcing,
            Sourcing {
                name: Some(name.to_string()),
                lnum: 0,
            },
        );
        let saved_sid = std::mem::replace(&mut self.current_sid, sid);
        // A sourced script does not see the locals of the calling function.
        let saved_base = std::mem::replace(&mut self.frame_base, self.frames.len());
        debug!(script = %name, sid, "sourcing");

        let mut source = ScriptSource::new(self, name, preprocess_source(text));
        self.do_cmdline(&mut source, DoCmdFlags::REPEAT);

        if self.ctx.got_int {
            self.emsg(&ScriptError::Interrupted);
        }
        self.frame_base = saved_base;
        self.current_sid = saved_sid;
        self.sourcing = saved_sourcing;
        debug!(script = %name, "finished sourcing");
    }

    /// Execute command lines, as typed.
    pub fn execute(&mut self, text: &str) {
        self.begin_toplevel();
        let lines = text.lines().map(str::to_string).collect();
        let mut source = StringSource::new(lines, None);
        self.do_cmdline(&mut source, DoCmdFlags::REPEAT);
        self.end_toplevel();
    }

    /// Run cleanup commands while an error, interrupt or exception is
    /// pending; the pending state survives unless the commands abort.
    pub fn execute_cleanup(&mut self, text: &str) {
        let state = self.enter_cleanup();
        let lines = text.lines().map(str::to_string).collect();
        let mut source = StringSource::new(lines, None);
        self.do_cmdline(&mut source, DoCmdFlags::REPEAT);
        self.leave_cleanup(state);
    }

    /// Evaluate an expression; errors are returned instead of shown.
    pub fn eval(&mut self, expr: &str) -> ScriptResult<Value> {
        self.eval_str(expr)
    }

    pub fn call_function(&mut self, name: &str, args: &[Value]) -> ScriptResult<Value> {
        self.call_by_name(name, args.to_vec(), None)
    }

    /// Make `f` callable from scripts as `name`.
    pub fn register_native<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&mut Engine, &[Value]) -> ScriptResult<Value> + 'static,
    {
        let f: NativeFn = Rc::new(f);
        self.functions.define_native(name, f);
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().insert(name.to_string(), value);
    }

    /// Keep `value` alive across `garbage_collect`.
    pub fn add_gc_root(&mut self, value: Value) {
        self.gc_roots.push(value);
    }

    pub fn is_aborting(&self) -> bool {
        self.ctx.aborting()
    }

    /// `v:errmsg`
    pub fn last_error(&self) -> &str {
        &self.ctx.errmsg
    }

    /// The frame of the innermost call visible to the current script.
    pub(crate) fn current_frame(&self) -> Option<&CallFrame> {
        if self.frames.len() > self.frame_base {
            self.frames.last()
        } else {
            None
        }
    }

    pub(crate) fn current_frame_mut(&mut self) -> Option<&mut CallFrame> {
        if self.frames.len() > self.frame_base {
            self.frames.last_mut()
        } else {
            None
        }
    }

    pub(crate) fn script_dict(&mut self) -> Dict {
        self.script_vars
            .entry(self.current_sid)
            .or_insert_with(new_dict)
            .clone()
    }
}
