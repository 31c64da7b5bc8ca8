use super::Engine;
use crate::parser::SourceLine;
use std::collections::VecDeque;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A sourced file or string.
    Script,
    /// A user function body.
    Function,
    /// Commands given directly (`:execute` at top level, the debug prompt).
    Command,
}

/// Next breakpoint line of a script or call, recomputed whenever the
/// breakpoint tick moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct BreakCursor {
    pub next: usize,
    pub tick: u64,
}

impl BreakCursor {
    pub fn new(engine: &mut Engine, file: bool, name: &str) -> Self {
        Self {
            next: engine.dbg_find_breakpoint(file, name, 0),
            tick: engine.ctx.debug_tick,
        }
    }

    pub fn refresh(&mut self, engine: &mut Engine, file: bool, name: &str) {
        if self.tick != engine.ctx.debug_tick {
            self.next = engine.dbg_find_breakpoint(file, name, engine.sourcing.lnum);
            self.tick = engine.ctx.debug_tick;
        }
    }

    /// Record a hit when line `lnum` is at or past the next breakpoint.
    pub fn check_hit(&mut self, engine: &mut Engine, file: bool, name: &str, lnum: usize) {
        if self.next != 0 && self.next <= lnum {
            engine.dbg_breakpoint(name, lnum);
            self.next = engine.dbg_find_breakpoint(file, name, lnum);
            self.tick = engine.ctx.debug_tick;
        }
    }

    /// Recompute from line `after`; also re-evaluates watch expressions.
    pub fn recheck(&mut self, engine: &mut Engine, file: bool, name: &str, after: usize) {
        self.next = engine.dbg_find_breakpoint(file, name, after);
        self.tick = engine.ctx.debug_tick;
    }
}

/// Supplies lines to the dispatcher.
pub trait LineSource {
    fn kind(&self) -> SourceKind;

    /// Nesting level the script was sourced or the function called at.
    fn level(&self, engine: &Engine) -> i32;

    fn next_line(&mut self, engine: &mut Engine) -> Option<SourceLine>;

    /// `:finish` was done in the script, or the function returned.
    fn has_ended(&self, engine: &Engine) -> bool;

    /// The function was defined with `abort`.
    fn has_abort(&self, _engine: &Engine) -> bool {
        false
    }

    /// An error ended an `abort` function.
    fn aborted(&self, engine: &Engine) -> bool {
        self.has_abort(engine) && engine.ctx.did_emsg && !engine.ctx.aborted_in_try()
    }

    fn set_finished(&mut self, _finished: bool) {}

    /// Breakpoint check for a line replayed from the stored loop lines.
    fn check_replayed(&mut self, _engine: &mut Engine, _lnum: usize) {}

    /// Find the next breakpoint after line `after`, after a jump back to a
    /// loop start or when watch expressions may have changed.
    fn recheck_breakpoint(&mut self, _engine: &mut Engine, _after: usize) {}

    /// Lines of its own still to come, even when the dispatcher would
    /// otherwise stop after one line.
    fn has_pending_lines(&self) -> bool {
        false
    }
}

/// A sourced file or script text.
pub struct ScriptSource {
    name: String,
    lines: VecDeque<SourceLine>,
    level: i32,
    finished: bool,
    cursor: BreakCursor,
}

impl ScriptSource {
    pub fn new(engine: &mut Engine, name: impl Into<String>, lines: Vec<SourceLine>) -> Self {
        let name = name.into();
        let cursor = BreakCursor::new(engine, true, &name);
        Self {
            level: engine.ctx.ex_nesting_level,
            name,
            lines: lines.into(),
            finished: false,
            cursor,
        }
    }
}

impl LineSource for ScriptSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Script
    }

    fn level(&self, _engine: &Engine) -> i32 {
        self.level
    }

    fn next_line(&mut self, engine: &mut Engine) -> Option<SourceLine> {
        self.cursor.refresh(engine, true, &self.name);
        engine.sourcing.lnum += 1;
        let line = if self.finished {
            None
        } else {
            self.lines.pop_front()
        };
        if let Some(line) = &line {
            engine.sourcing.lnum = line.lnum;
        }
        let lnum = engine.sourcing.lnum;
        self.cursor.check_hit(engine, true, &self.name, lnum);
        line
    }

    fn has_ended(&self, _engine: &Engine) -> bool {
        self.finished
    }

    fn set_finished(&mut self, finished: bool) {
        self.finished = finished;
    }

    fn check_replayed(&mut self, engine: &mut Engine, lnum: usize) {
        self.cursor.refresh(engine, true, &self.name);
        self.cursor.check_hit(engine, true, &self.name, lnum);
    }

    fn recheck_breakpoint(&mut self, engine: &mut Engine, after: usize) {
        self.cursor.recheck(engine, true, &self.name, after);
    }
}

/// The body of the call at `engine.frames[depth]`.
pub struct FuncSource {
    depth: usize,
}

impl FuncSource {
    pub fn new(depth: usize) -> Self {
        Self { depth }
    }

    fn name(&self, engine: &Engine) -> String {
        engine.frames[self.depth].func.name.to_string()
    }

    fn with_cursor(&self, engine: &mut Engine, f: impl FnOnce(&mut BreakCursor, &mut Engine, &str)) {
        let name = self.name(engine);
        let mut cursor = engine.frames[self.depth].cursor;
        f(&mut cursor, engine, &name);
        engine.frames[self.depth].cursor = cursor;
    }
}

impl LineSource for FuncSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Function
    }

    fn level(&self, engine: &Engine) -> i32 {
        engine.frames[self.depth].level
    }

    fn next_line(&mut self, engine: &mut Engine) -> Option<SourceLine> {
        self.with_cursor(engine, |cursor, engine, name| cursor.refresh(engine, false, name));

        let line = if self.aborted(engine) || self.has_ended(engine) {
            None
        } else {
            let frame = &mut engine.frames[self.depth];
            let func = Rc::clone(&frame.func);
            let body = func.lines();
            while frame.linenr < body.len() && body[frame.linenr].is_none() {
                frame.linenr += 1;
            }
            match body.get(frame.linenr).and_then(|l| l.clone()) {
                Some(text) => {
                    frame.linenr += 1;
                    let lnum = frame.linenr;
                    engine.sourcing.lnum = lnum;
                    Some(SourceLine::new(text, lnum))
                }
                None => None,
            }
        };

        let lnum = engine.sourcing.lnum;
        self.with_cursor(engine, |cursor, engine, name| cursor.check_hit(engine, false, name, lnum));
        line
    }

    fn has_ended(&self, engine: &Engine) -> bool {
        engine.frames[self.depth].returned
    }

    fn has_abort(&self, engine: &Engine) -> bool {
        engine.frames[self.depth].func.flags.abort
    }

    fn check_replayed(&mut self, engine: &mut Engine, lnum: usize) {
        self.with_cursor(engine, |cursor, engine, name| {
            cursor.refresh(engine, false, name);
            cursor.check_hit(engine, false, name, lnum);
        });
    }

    fn recheck_breakpoint(&mut self, engine: &mut Engine, after: usize) {
        self.with_cursor(engine, |cursor, engine, name| cursor.recheck(engine, false, name, after));
    }
}

/// Lines from a string, continuing with the enclosing source (if any)
/// when they run out.  Everything else is answered by the enclosing
/// source, so `:return` and `:finish` in executed strings act on it.
pub struct StringSource<'a> {
    lines: VecDeque<String>,
    outer: Option<&'a mut dyn LineSource>,
}

impl<'a> StringSource<'a> {
    pub fn new(lines: Vec<String>, outer: Option<&'a mut dyn LineSource>) -> Self {
        Self {
            lines: lines.into(),
            outer,
        }
    }
}

impl LineSource for StringSource<'_> {
    fn kind(&self) -> SourceKind {
        self.outer.as_ref().map_or(SourceKind::Command, |o| o.kind())
    }

    fn level(&self, engine: &Engine) -> i32 {
        self.outer.as_ref().map_or(0, |o| o.level(engine))
    }

    fn next_line(&mut self, engine: &mut Engine) -> Option<SourceLine> {
        if self.has_ended(engine) || self.aborted(engine) {
            return None;
        }
        match self.lines.pop_front() {
            Some(text) => Some(SourceLine::new(text, engine.sourcing.lnum)),
            None => self.outer.as_mut().and_then(|o| o.next_line(engine)),
        }
    }

    fn has_ended(&self, engine: &Engine) -> bool {
        self.outer.as_ref().map_or(false, |o| o.has_ended(engine))
    }

    fn has_abort(&self, engine: &Engine) -> bool {
        self.outer.as_ref().map_or(false, |o| o.has_abort(engine))
    }

    fn set_finished(&mut self, finished: bool) {
        if let Some(outer) = self.outer.as_mut() {
            outer.set_finished(finished);
        }
    }

    fn check_replayed(&mut self, engine: &mut Engine, lnum: usize) {
        if let Some(outer) = self.outer.as_mut() {
            outer.check_replayed(engine, lnum);
        }
    }

    fn recheck_breakpoint(&mut self, engine: &mut Engine, after: usize) {
        if let Some(outer) = self.outer.as_mut() {
            outer.recheck_breakpoint(engine, after);
        }
    }

    fn has_pending_lines(&self) -> bool {
        !self.lines.is_empty()
    }
}
