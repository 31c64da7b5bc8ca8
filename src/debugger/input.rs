use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Where debug prompt commands come from.
pub trait DebugInput {
    /// Next command line, `None` at end of input.
    fn read_command(&mut self) -> Option<String>;
}

/// Reads commands from the terminal.
#[derive(Debug, Default)]
pub struct StdinInput;

impl DebugInput for StdinInput {
    fn read_command(&mut self) -> Option<String> {
        eprint!(">");
        let _ = io::stderr().flush();

        let mut input = String::new();
        match io::stdin().lock().read_line(&mut input) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(input.trim_end_matches(['\n', '\r']).to_string()),
        }
    }
}

/// Replays a fixed list of commands.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInput {
    commands: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.commands.len()
    }
}

impl DebugInput for ScriptedInput {
    fn read_command(&mut self) -> Option<String> {
        self.commands.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_input_in_order() {
        let mut input = ScriptedInput::new(["step", "cont"]);
        assert_eq!(input.remaining(), 2);
        assert_eq!(input.read_command().as_deref(), Some("step"));
        assert_eq!(input.read_command().as_deref(), Some("cont"));
        assert_eq!(input.read_command(), None);
    }
}
