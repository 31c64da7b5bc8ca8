use crate::condstack::Exception;
use std::rc::Rc;

/// Error messages collected while a try conditional is active; they become
/// one error exception after the command that produced them.
#[derive(Debug, Default, Clone)]
pub struct MsgList {
    pub messages: Vec<String>,
    /// Index of the message used for the exception value.
    pub throw_msg: Option<usize>,
}

impl MsgList {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Interpreter-wide error, interrupt and exception state.
///
/// Nested interpretation (deferred calls, the debug prompt, cleanup code)
/// snapshots part of this with one of the `*State` types below and puts it
/// back afterwards.
#[derive(Debug, Default)]
pub struct InterpreterContext {
    /// An error message was given (or converted) since the flag was reset.
    pub did_emsg: bool,
    /// Interrupt requested; polled between statements.
    pub got_int: bool,
    /// An error occurred inside a try conditional: abort all statements.
    pub force_abort: bool,
    /// `force_abort` is set once the error has been turned into an exception.
    pub cause_abort: bool,
    /// Do not turn errors into exceptions (the exception is being reported).
    pub suppress_errthrow: bool,
    /// An exception escaped a nested dispatcher; rethrow it in the caller.
    pub need_rethrow: bool,
    /// A `:return` or `:finish` happened in a nested dispatcher.
    pub check_cstack: bool,
    pub current_exception: Option<Rc<Exception>>,
    /// Exceptions caught but not finished, newest last.
    pub caught_stack: Vec<Rc<Exception>>,
    /// Number of active try conditionals across all dispatchers.
    pub trylevel: usize,
    pub emsg_silent: usize,
    /// Evaluation is only parsing: suppress messages.
    pub emsg_skip: usize,
    pub msg_list: Option<MsgList>,
    pub ex_nesting_level: i32,
    pub sandbox: usize,
    /// Advanced whenever a breakpoint is added or deleted.
    pub debug_tick: u64,
    /// `v:errmsg`
    pub errmsg: String,
}

impl InterpreterContext {
    /// Errors, interrupts or exceptions that end the current script.
    pub fn aborting(&self) -> bool {
        (self.did_emsg && self.force_abort) || self.got_int || self.current_exception.is_some()
    }

    /// An error inside a try conditional forces everything to abort.
    pub fn aborted_in_try(&self) -> bool {
        self.force_abort
    }

    /// Take the exception state before running deferred calls.
    pub fn take_exception_state(&mut self) -> ExceptionState {
        ExceptionState {
            current_exception: self.current_exception.take(),
            need_rethrow: std::mem::take(&mut self.need_rethrow),
            trylevel: std::mem::take(&mut self.trylevel),
            did_emsg: std::mem::take(&mut self.did_emsg),
        }
    }

    pub fn restore_exception_state(&mut self, state: ExceptionState) {
        self.current_exception = state.current_exception;
        self.need_rethrow = state.need_rethrow;
        self.trylevel = state.trylevel;
        self.did_emsg = state.did_emsg;
    }

    /// Take everything a command typed at the debug prompt must not see.
    pub fn take_debug_state(&mut self) -> DebugState {
        DebugState {
            trylevel: std::mem::take(&mut self.trylevel),
            force_abort: std::mem::take(&mut self.force_abort),
            caught_stack: std::mem::take(&mut self.caught_stack),
            did_emsg: std::mem::take(&mut self.did_emsg),
            got_int: std::mem::take(&mut self.got_int),
            need_rethrow: std::mem::take(&mut self.need_rethrow),
            check_cstack: std::mem::take(&mut self.check_cstack),
            current_exception: self.current_exception.take(),
        }
    }

    pub fn restore_debug_state(&mut self, state: DebugState) {
        self.trylevel = state.trylevel;
        self.force_abort = state.force_abort;
        self.caught_stack = state.caught_stack;
        self.did_emsg = state.did_emsg;
        self.got_int = state.got_int;
        self.need_rethrow = state.need_rethrow;
        self.check_cstack = state.check_cstack;
        self.current_exception = state.current_exception;
    }
}

/// Saved around each deferred call.
#[derive(Debug)]
pub struct ExceptionState {
    current_exception: Option<Rc<Exception>>,
    need_rethrow: bool,
    trylevel: usize,
    did_emsg: bool,
}

/// Saved around commands run from the debug prompt.
#[derive(Debug)]
pub struct DebugState {
    trylevel: usize,
    force_abort: bool,
    caught_stack: Vec<Rc<Exception>>,
    did_emsg: bool,
    got_int: bool,
    need_rethrow: bool,
    check_cstack: bool,
    current_exception: Option<Rc<Exception>>,
}

/// A pending error, interrupt or exception parked while cleanup code runs.
#[derive(Debug, Default)]
pub struct CleanupState {
    pub error: bool,
    pub interrupt: bool,
    pub throw: bool,
    pub exception: Option<Rc<Exception>>,
}

impl CleanupState {
    pub fn is_pending(&self) -> bool {
        self.error || self.interrupt || self.throw
    }
}
