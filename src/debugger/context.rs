use super::breakpoints::BreakpointRegistry;
use super::input::{DebugInput, StdinInput};
use super::DebugCommand;

/// Break level meaning "do not stop".
pub const NO_BREAK: i32 = -1;
/// Break level that stops at every command.
pub const BREAK_ALWAYS: i32 = 9999;

/// Debugger state shared by every dispatcher.
pub struct DebugContext {
    /// Stop before commands at this nesting level or lower.
    pub break_level: i32,
    /// Frame selected with `up`/`down`/`frame`, 0 is the current one.
    pub backtrace_level: usize,
    /// Breakpoint hit while fetching a line, reported by the next command.
    pub pending_hit: Option<(String, usize)>,
    /// A stop was skipped because the command was not executed.
    pub skipped: bool,
    pub skipped_hit: Option<(String, usize)>,
    pub oldval: Option<String>,
    pub newval: Option<String>,
    /// The "Entering Debug mode" message was given.
    pub did_msg: bool,
    pub last_cmd: Option<DebugCommand>,
    /// Number of call frames when the prompt was entered.
    pub prompt_frames: Option<usize>,
    pub registry: BreakpointRegistry,
    input: Box<dyn DebugInput>,
}

impl Default for DebugContext {
    fn default() -> Self {
        Self::new(Box::new(StdinInput))
    }
}

impl DebugContext {
    pub fn new(input: Box<dyn DebugInput>) -> Self {
        Self {
            break_level: NO_BREAK,
            backtrace_level: 0,
            pending_hit: None,
            skipped: false,
            skipped_hit: None,
            oldval: None,
            newval: None,
            did_msg: false,
            last_cmd: None,
            prompt_frames: None,
            registry: BreakpointRegistry::new(),
            input,
        }
    }

    pub fn set_input(&mut self, input: Box<dyn DebugInput>) {
        self.input = input;
    }

    pub fn read_command(&mut self) -> Option<String> {
        self.input.read_command()
    }

    /// Commands at `nesting` stop in the debugger.
    pub fn should_stop_at(&self, nesting: i32) -> bool {
        nesting <= self.break_level
    }
}

impl std::fmt::Debug for DebugContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebugContext")
            .field("break_level", &self.break_level)
            .field("backtrace_level", &self.backtrace_level)
            .field("pending_hit", &self.pending_hit)
            .field("breakpoints", &self.registry.len())
            .finish()
    }
}

/// Number of levels in a sourcing name such as "function F[2]..G".
pub fn max_backtrace_level(sourcing_name: Option<&str>) -> usize {
    sourcing_name.map_or(0, |name| name.matches("..").count())
}

/// Backtrace lines, outermost first.
pub fn backtrace_lines(sourcing_name: Option<&str>, selected: usize) -> Vec<String> {
    let Some(name) = sourcing_name else {
        return Vec::new();
    };
    let max = max_backtrace_level(Some(name));
    name.split("..")
        .enumerate()
        .map(|(i, part)| {
            let level = max - i;
            if level == selected {
                format!("->{} {}", level, part)
            } else {
                format!("  {} {}", level, part)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_level() {
        let mut dc = DebugContext::default();
        assert!(!dc.should_stop_at(1));
        dc.break_level = 2;
        assert!(dc.should_stop_at(1));
        assert!(dc.should_stop_at(2));
        assert!(!dc.should_stop_at(3));
    }

    #[test]
    fn test_backtrace_lines() {
        let name = "function Outer[3]..Middle[2]..Inner";
        assert_eq!(max_backtrace_level(Some(name)), 2);
        assert_eq!(
            backtrace_lines(Some(name), 0),
            vec!["  2 function Outer[3]", "  1 Middle[2]", "->0 Inner"]
        );
        assert_eq!(backtrace_lines(Some(name), 2)[0], "->2 function Outer[3]");
        assert!(backtrace_lines(None, 0).is_empty());
    }
}
