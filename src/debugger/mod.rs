mod breakpoints;
mod context;
mod input;
mod prompt;
mod stepping;

pub use breakpoints::{BreakKind, BreakSpec, Breakpoint, BreakpointRegistry};
pub use context::{backtrace_lines, max_backtrace_level, DebugContext, BREAK_ALWAYS, NO_BREAK};
pub use input::{DebugInput, ScriptedInput, StdinInput};
pub use stepping::DebugCommand;
