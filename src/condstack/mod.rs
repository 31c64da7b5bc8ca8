mod exception;
mod flow;

pub use exception::{error_exception_value, has_vim_prefix, Exception, ExceptionKind};
pub(crate) use flow::{end_emsg, Search};

use crate::eval::LetTarget;
use crate::value::{List, Value};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondKind {
    If,
    While,
    For,
    Try,
}

impl CondKind {
    pub fn is_loop(self) -> bool {
        matches!(self, CondKind::While | CondKind::For)
    }
}

/// Status of one conditional level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelState {
    /// The condition was true (or the try was entered).
    pub truthy: bool,
    /// Commands in the current branch are executed.
    pub active: bool,
    pub else_seen: bool,
    pub finally: bool,
    /// An exception was thrown into this try.
    pub thrown: bool,
    pub caught: bool,
    /// The caught exception was already finished.
    pub finished: bool,
}

/// What happens once the finally clause of a try conditional is done.
#[derive(Debug, Clone, Default)]
pub enum PendingAction {
    #[default]
    None,
    Continue,
    Break,
    Finish,
    Return(Option<Value>),
    /// The exception itself is kept on the level.
    Signal {
        error: bool,
        interrupt: bool,
        exception: bool,
    },
}

impl PendingAction {
    pub fn is_none(&self) -> bool {
        matches!(self, PendingAction::None)
    }
}

/// Iteration state of a `:for` loop.
#[derive(Debug, Clone)]
pub struct ForInfo {
    pub list: List,
    pub index: usize,
    pub target: LetTarget,
}

#[derive(Debug)]
pub struct CondLevel {
    pub kind: CondKind,
    pub state: LevelState,
    pub pending: PendingAction,
    /// Pending or caught exception.
    pub exception: Option<Rc<Exception>>,
    /// Index of the loop's first line in the stored loop lines.
    pub loop_line: Option<usize>,
    pub for_info: Option<ForInfo>,
    /// `emsg_silent` from before a `:silent! try`.
    pub saved_emsg_silent: Option<usize>,
}

impl CondLevel {
    fn new(kind: CondKind) -> Self {
        Self {
            kind,
            state: LevelState::default(),
            pending: PendingAction::None,
            exception: None,
            loop_line: None,
            for_info: None,
            saved_emsg_silent: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopFlags {
    /// Just entered a loop body; remember where it starts.
    pub had_loop: bool,
    pub had_endloop: bool,
    pub had_cont: bool,
    pub had_finally: bool,
}

/// Which counter `rewind_to` decrements for the levels it drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counted {
    Loops,
    Tries,
}

/// Open `:if`/`:while`/`:for`/`:try` levels of one dispatcher.
#[derive(Debug)]
pub struct CondStack {
    levels: Vec<CondLevel>,
    capacity: usize,
    pub looplevel: usize,
    pub trylevel: usize,
    pub lflags: LoopFlags,
}

impl CondStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            levels: Vec::new(),
            capacity,
            looplevel: 0,
            trylevel: 0,
            lflags: LoopFlags::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_full(&self) -> bool {
        self.levels.len() >= self.capacity
    }

    pub fn top_index(&self) -> Option<usize> {
        self.levels.len().checked_sub(1)
    }

    pub fn top(&self) -> Option<&CondLevel> {
        self.levels.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut CondLevel> {
        self.levels.last_mut()
    }

    pub fn level(&self, idx: usize) -> &CondLevel {
        &self.levels[idx]
    }

    pub fn level_mut(&mut self, idx: usize) -> &mut CondLevel {
        &mut self.levels[idx]
    }

    pub fn push(&mut self, kind: CondKind) -> &mut CondLevel {
        self.levels.push(CondLevel::new(kind));
        let top = self.levels.len() - 1;
        &mut self.levels[top]
    }

    pub fn pop(&mut self) -> Option<CondLevel> {
        self.levels.pop()
    }

    pub fn top_inactive(&self) -> bool {
        self.levels.last().map_or(false, |top| !top.state.active)
    }

    /// The enclosing level of the top one is inactive.
    pub fn enclosing_inactive(&self) -> bool {
        let n = self.levels.len();
        n >= 2 && !self.levels[n - 2].state.active
    }

    /// Drop levels above `idx` (all levels for `None`).
    pub fn rewind_to(&mut self, idx: Option<usize>, counted: Counted) {
        let keep = idx.map_or(0, |i| i + 1);
        while self.levels.len() > keep {
            if let Some(level) = self.levels.pop() {
                match (counted, level.kind) {
                    (Counted::Loops, CondKind::While | CondKind::For) => {
                        self.looplevel = self.looplevel.saturating_sub(1)
                    }
                    (Counted::Tries, CondKind::Try) => {
                        self.trylevel = self.trylevel.saturating_sub(1)
                    }
                    _ => {}
                }
            }
        }
    }

    /// Innermost try level at or below `from`, stopping at level 0.
    pub fn find_try_from(&self, from: usize) -> usize {
        let mut idx = from;
        while idx > 0 && self.levels[idx].kind != CondKind::Try {
            idx -= 1;
        }
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewind_counts_only_matching_kind() {
        let mut cs = CondStack::new(50);
        cs.push(CondKind::Try);
        cs.trylevel += 1;
        cs.push(CondKind::While);
        cs.looplevel += 1;
        cs.push(CondKind::If);
        cs.push(CondKind::For);
        cs.looplevel += 1;

        cs.rewind_to(Some(0), Counted::Loops);
        assert_eq!(cs.len(), 1);
        assert_eq!(cs.looplevel, 0);
        assert_eq!(cs.trylevel, 1);

        cs.rewind_to(None, Counted::Tries);
        assert!(cs.is_empty());
        assert_eq!(cs.trylevel, 0);
    }

    #[test]
    fn test_capacity_and_enclosing() {
        let mut cs = CondStack::new(2);
        cs.push(CondKind::If).state.active = true;
        assert!(!cs.is_full());
        cs.push(CondKind::If);
        assert!(cs.is_full());
        assert!(!cs.enclosing_inactive());
        assert!(cs.top_inactive());
        cs.level_mut(0).state.active = false;
        assert!(cs.enclosing_inactive());
        cs.level_mut(1).state.active = true;
        assert!(!cs.top_inactive());
    }

    #[test]
    fn test_find_try_from() {
        let mut cs = CondStack::new(50);
        cs.push(CondKind::If);
        cs.push(CondKind::Try);
        cs.push(CondKind::While);
        cs.push(CondKind::If);
        assert_eq!(cs.find_try_from(3), 1);
        assert_eq!(cs.find_try_from(0), 0);
    }
}
