//! Execution core for Vim script: user functions and closures, the
//! conditional/exception stack and the debug mode with breakpoints.
//!
//! ```no_run
//! use exscript::{Engine, EngineConfig};
//!
//! let mut engine = Engine::with_config(EngineConfig::default());
//! engine.source_str("demo.vim", "function Add(a, b)\n  return a:a + a:b\nendfunction");
//! let sum = engine.call_function("Add", &[1.into(), 2.into()]).unwrap();
//! assert_eq!(sum.repr(), "3");
//! ```

pub mod condstack;
pub mod config;
pub mod context;
pub mod debugger;
pub mod error;
pub mod eval;
pub mod executor;
pub mod parser;
pub mod userfunc;
pub mod value;

pub use config::{ConfigError, EngineConfig};
pub use debugger::{BreakKind, DebugInput, ScriptedInput, StdinInput};
pub use error::{ScriptError, ScriptResult};
pub use executor::{Engine, InterruptHandle, Message, OutputMode};
pub use value::{FuncRef, Special, Value};
