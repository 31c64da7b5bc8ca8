/// Commands understood at the debug prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugCommand {
    Cont,
    Next,
    Step,
    Finish,
    Quit,
    Interrupt,
    Backtrace,
    Frame,
    Up,
    Down,
}

impl DebugCommand {
    /// Recognize a prompt command by its first letter, accepting any
    /// prefix of the full spelling.  Returns the command and its argument.
    pub fn parse(line: &str) -> Option<(Self, &str)> {
        let p = line.trim_start();
        let mut chars = p.chars();
        let first = chars.next()?;
        let second = chars.next();
        let (cmd, tail) = match first {
            'c' => (DebugCommand::Cont, "ont"),
            'n' => (DebugCommand::Next, "ext"),
            's' => (DebugCommand::Step, "tep"),
            'f' if second == Some('r') => (DebugCommand::Frame, "rame"),
            'f' => (DebugCommand::Finish, "inish"),
            'q' => (DebugCommand::Quit, "uit"),
            'i' => (DebugCommand::Interrupt, "nterrupt"),
            'b' if second == Some('t') => (DebugCommand::Backtrace, "t"),
            'b' => (DebugCommand::Backtrace, "acktrace"),
            'w' => (DebugCommand::Backtrace, "here"),
            'u' => (DebugCommand::Up, "p"),
            'd' => (DebugCommand::Down, "own"),
            _ => return None,
        };

        let rest = &p[1..];
        let matched = rest
            .bytes()
            .zip(tail.bytes())
            .take_while(|(a, b)| a == b)
            .count();
        let rest = &rest[matched..];
        if rest.starts_with(|c: char| c.is_ascii_alphabetic()) && cmd != DebugCommand::Frame {
            return None;
        }
        Some((cmd, rest.trim()))
    }

    /// Commands that leave the prompt and resume execution.
    pub fn resumes(self) -> bool {
        !matches!(
            self,
            DebugCommand::Backtrace | DebugCommand::Frame | DebugCommand::Up | DebugCommand::Down
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes() {
        assert_eq!(DebugCommand::parse("c"), Some((DebugCommand::Cont, "")));
        assert_eq!(DebugCommand::parse("cont"), Some((DebugCommand::Cont, "")));
        assert_eq!(DebugCommand::parse("  next"), Some((DebugCommand::Next, "")));
        assert_eq!(DebugCommand::parse("fin"), Some((DebugCommand::Finish, "")));
        assert_eq!(DebugCommand::parse("fr 2"), Some((DebugCommand::Frame, "2")));
        assert_eq!(DebugCommand::parse("frame -1"), Some((DebugCommand::Frame, "-1")));
        assert_eq!(DebugCommand::parse("bt"), Some((DebugCommand::Backtrace, "")));
        assert_eq!(DebugCommand::parse("where"), Some((DebugCommand::Backtrace, "")));
        assert_eq!(DebugCommand::parse("up 2"), Some((DebugCommand::Up, "2")));
    }

    #[test]
    fn test_trailing_letters_are_not_commands() {
        assert_eq!(DebugCommand::parse("echo x"), None);
        assert_eq!(DebugCommand::parse("call F()"), None);
        assert_eq!(DebugCommand::parse("let x = 1"), None);
        assert_eq!(DebugCommand::parse("steps"), None);
        assert_eq!(DebugCommand::parse(""), None);
    }

    #[test]
    fn test_resumes() {
        assert!(DebugCommand::Step.resumes());
        assert!(!DebugCommand::Up.resumes());
    }
}
