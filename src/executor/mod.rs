mod commands;
mod engine;
mod output;
mod runner;
mod source;

pub use engine::{Engine, InterruptHandle, Sourcing};
pub use output::{Message, Output, OutputMode};
pub use source::{BreakCursor, FuncSource, LineSource, ScriptSource, SourceKind, StringSource};

/// Options for one run of the statement dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoCmdFlags {
    /// Keep reading lines until the source runs out.
    pub repeat: bool,
    /// Hide the exception state of the interrupted code (debug prompt).
    pub excreset: bool,
}

impl DoCmdFlags {
    pub const REPEAT: Self = Self {
        repeat: true,
        excreset: false,
    };
    pub const EXCRESET: Self = Self {
        repeat: false,
        excreset: true,
    };
}
