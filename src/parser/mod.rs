mod commands;
mod expr;
mod pattern;
mod preprocessor;
mod types;

pub use commands::{
    check_nextcmd, find_nextcmd, has_loop_cmd, is_comment, parse_command, split_bar, CommandHead, Modifiers,
};
pub use expr::{parse_expr, parse_lvalue, Accessor, BinOp, CmpOp, Expr, Lambda, LetTarget};
pub use pattern::{compile_pattern, glob_to_regex, skip_pattern, translate_pattern};
pub use preprocessor::{join_continued_lines, preprocess_source};
pub use types::{find_command, BarMode, CmdDef, CmdId, ExArg, SourceLine, COMMANDS};
