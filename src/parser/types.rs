use crate::error::ScriptError;

/// One logical source line, after joining continuation lines.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub text: String,
    /// First physical line (1-based).
    pub lnum: usize,
    /// Last physical line that was joined into this one.
    pub end_lnum: usize,
}

impl SourceLine {
    pub fn new(text: impl Into<String>, lnum: usize) -> Self {
        Self {
            text: text.into(),
            lnum,
            end_lnum: lnum,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdId {
    Break,
    Breakadd,
    Breakdel,
    Breaklist,
    Call,
    Catch,
    Continue,
    Debug,
    Defer,
    Delfunction,
    Echo,
    Echoerr,
    Echomsg,
    Echon,
    Else,
    Elseif,
    Endfor,
    Endfunction,
    Endif,
    Endtry,
    Endwhile,
    Execute,
    Finally,
    Finish,
    For,
    Function,
    If,
    Let,
    Return,
    Source,
    Throw,
    Try,
    Unlet,
    While,
}

/// How the rest of the line after a command is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarMode {
    /// Split at the first `|` before running the command.
    Split,
    /// The command parses its expression and finds `|` itself.
    Expr,
    /// The command takes the whole rest of the line.
    Rest,
}

#[derive(Debug, Clone, Copy)]
pub struct CmdDef {
    pub name: &'static str,
    /// Shortest accepted abbreviation.
    pub min_len: usize,
    pub id: CmdId,
    pub bar: BarMode,
    pub bang: bool,
    /// Executed even when commands are skipped, to track block structure.
    pub structural: bool,
    pub sandbox_ok: bool,
}

const fn def(name: &'static str, min_len: usize, id: CmdId, bar: BarMode) -> CmdDef {
    CmdDef {
        name,
        min_len,
        id,
        bar,
        bang: false,
        structural: false,
        sandbox_ok: true,
    }
}

const fn structural(mut d: CmdDef) -> CmdDef {
    d.structural = true;
    d
}

const fn bang(mut d: CmdDef) -> CmdDef {
    d.bang = true;
    d
}

const fn no_sandbox(mut d: CmdDef) -> CmdDef {
    d.sandbox_ok = false;
    d
}

pub const COMMANDS: &[CmdDef] = &[
    def("break", 4, CmdId::Break, BarMode::Split),
    def("breakadd", 6, CmdId::Breakadd, BarMode::Split),
    def("breakdel", 6, CmdId::Breakdel, BarMode::Split),
    def("breaklist", 6, CmdId::Breaklist, BarMode::Split),
    def("call", 3, CmdId::Call, BarMode::Expr),
    structural(def("catch", 3, CmdId::Catch, BarMode::Rest)),
    def("continue", 3, CmdId::Continue, BarMode::Split),
    def("debug", 3, CmdId::Debug, BarMode::Rest),
    def("defer", 4, CmdId::Defer, BarMode::Expr),
    bang(def("delfunction", 4, CmdId::Delfunction, BarMode::Split)),
    def("echo", 2, CmdId::Echo, BarMode::Expr),
    def("echoerr", 5, CmdId::Echoerr, BarMode::Expr),
    def("echomsg", 5, CmdId::Echomsg, BarMode::Expr),
    def("echon", 5, CmdId::Echon, BarMode::Expr),
    structural(def("else", 2, CmdId::Else, BarMode::Split)),
    structural(def("elseif", 5, CmdId::Elseif, BarMode::Expr)),
    structural(def("endfor", 5, CmdId::Endfor, BarMode::Split)),
    def("endfunction", 4, CmdId::Endfunction, BarMode::Split),
    structural(def("endif", 2, CmdId::Endif, BarMode::Split)),
    structural(def("endtry", 4, CmdId::Endtry, BarMode::Split)),
    structural(def("endwhile", 4, CmdId::Endwhile, BarMode::Split)),
    def("execute", 3, CmdId::Execute, BarMode::Expr),
    structural(def("finally", 4, CmdId::Finally, BarMode::Split)),
    def("finish", 4, CmdId::Finish, BarMode::Split),
    structural(def("for", 3, CmdId::For, BarMode::Expr)),
    structural(bang(def("function", 2, CmdId::Function, BarMode::Split))),
    structural(def("if", 2, CmdId::If, BarMode::Expr)),
    def("let", 3, CmdId::Let, BarMode::Expr),
    def("return", 4, CmdId::Return, BarMode::Expr),
    no_sandbox(def("source", 2, CmdId::Source, BarMode::Split)),
    def("throw", 2, CmdId::Throw, BarMode::Expr),
    structural(def("try", 3, CmdId::Try, BarMode::Split)),
    bang(def("unlet", 3, CmdId::Unlet, BarMode::Split)),
    structural(def("while", 2, CmdId::While, BarMode::Expr)),
];

/// Look up a possibly abbreviated command name.
pub fn find_command(name: &str) -> Option<&'static CmdDef> {
    COMMANDS
        .iter()
        .find(|d| name.len() >= d.min_len && d.name.starts_with(name))
}

/// A command about to be executed, with the results of executing it.
#[derive(Debug)]
pub struct ExArg {
    pub cmd: CmdId,
    /// Full name, used in error exception values.
    pub cmdname: &'static str,
    /// The command text as typed, for the debugger.
    pub cmdline: String,
    pub arg: String,
    pub bang: bool,
    pub skip: bool,
    pub nextcmd: Option<String>,
    pub errmsg: Option<ScriptError>,
}

impl ExArg {
    pub fn new(def: &CmdDef, cmdline: &str, arg: &str, bang: bool, skip: bool) -> Self {
        Self {
            cmd: def.id,
            cmdname: def.name,
            cmdline: cmdline.to_string(),
            arg: arg.to_string(),
            bang,
            skip,
            nextcmd: None,
            errmsg: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbreviations() {
        assert_eq!(find_command("fu").map(|d| d.id), Some(CmdId::Function));
        assert_eq!(find_command("endf").map(|d| d.id), Some(CmdId::Endfunction));
        assert_eq!(find_command("endfo").map(|d| d.id), Some(CmdId::Endfor));
        assert_eq!(find_command("en").map(|d| d.id), Some(CmdId::Endif));
        assert_eq!(find_command("end").map(|d| d.id), Some(CmdId::Endif));
        assert_eq!(find_command("echon").map(|d| d.id), Some(CmdId::Echon));
        assert_eq!(find_command("echoe").map(|d| d.id), Some(CmdId::Echoerr));
        assert_eq!(find_command("el").map(|d| d.id), Some(CmdId::Else));
        assert_eq!(find_command("elsei").map(|d| d.id), Some(CmdId::Elseif));
        assert_eq!(find_command("th").map(|d| d.id), Some(CmdId::Throw));
        assert_eq!(find_command("brea").map(|d| d.id), Some(CmdId::Break));
        assert_eq!(find_command("breakl").map(|d| d.id), Some(CmdId::Breaklist));
        assert!(find_command("f").is_none());
        assert!(find_command("fin").is_none());
        assert!(find_command("bogus").is_none());
    }
}
