#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    /// Thrown by `:throw`.
    User,
    /// Converted from error messages.
    Error,
    /// Converted from an interrupt.
    Interrupt,
}

#[derive(Debug)]
pub struct Exception {
    pub kind: ExceptionKind,
    pub value: String,
    /// Error messages an error exception was made from.
    pub messages: Vec<String>,
    pub throw_name: Option<String>,
    pub throw_lnum: usize,
}

impl Exception {
    pub fn new(kind: ExceptionKind, value: String) -> Self {
        Self {
            kind,
            value,
            messages: Vec::new(),
            throw_name: None,
            throw_lnum: 0,
        }
    }

    /// Value of `v:throwpoint` while the exception is caught.
    pub fn throwpoint(&self) -> String {
        match &self.throw_name {
            Some(name) if self.throw_lnum > 0 => format!("{}, line {}", name, self.throw_lnum),
            Some(name) => name.clone(),
            None => String::new(),
        }
    }
}

/// User exceptions may not look like the ones made from errors.
pub fn has_vim_prefix(value: &str) -> bool {
    match value.strip_prefix("Vim") {
        Some(rest) => rest.is_empty() || rest.starts_with(':') || rest.starts_with('('),
        None => false,
    }
}

/// "Vim(cmd):msg", or "Vim:msg" when no command is known.
pub fn error_exception_value(msg: &str, cmdname: Option<&str>) -> String {
    match cmdname {
        Some(cmd) => format!("Vim({}):{}", cmd, msg),
        None => format!("Vim:{}", msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vim_prefix() {
        assert!(has_vim_prefix("Vim"));
        assert!(has_vim_prefix("Vim:oops"));
        assert!(has_vim_prefix("Vim(echo):E121"));
        assert!(!has_vim_prefix("Vimscript"));
        assert!(!has_vim_prefix("vim:x"));
    }

    #[test]
    fn test_throwpoint_forms() {
        let mut exc = Exception::new(ExceptionKind::User, "x".into());
        assert_eq!(exc.throwpoint(), "");
        exc.throw_name = Some("function Foo".into());
        assert_eq!(exc.throwpoint(), "function Foo");
        exc.throw_lnum = 3;
        assert_eq!(exc.throwpoint(), "function Foo, line 3");
    }

    #[test]
    fn test_error_value() {
        assert_eq!(
            error_exception_value("E121: Undefined variable: x", Some("echo")),
            "Vim(echo):E121: Undefined variable: x"
        );
        assert_eq!(error_exception_value("E1", None), "Vim:E1");
    }
}
