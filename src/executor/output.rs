use serde::Serialize;

/// One line of script output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "text", rename_all = "lowercase")]
pub enum Message {
    Info(String),
    Error(String),
    /// Debug prompt output.
    Debug(String),
}

impl Message {
    pub fn text(&self) -> &str {
        match self {
            Message::Info(t) | Message::Error(t) | Message::Debug(t) => t,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Messages to stdout, errors and the debugger to stderr.
    Terminal,
    /// Kept in memory, in order.
    Captured,
}

/// Where `:echo`, error messages and the debugger write.
#[derive(Debug)]
pub struct Output {
    mode: OutputMode,
    captured: Vec<Message>,
    /// The last line was written by `:echon` and may be continued.
    open_line: bool,
    /// Source context of the last error, to print headers only on change.
    last_source: Option<String>,
    last_lnum: usize,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            captured: Vec::new(),
            open_line: false,
            last_source: None,
            last_lnum: 0,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    fn close_line(&mut self) {
        if self.open_line && self.mode == OutputMode::Terminal {
            println!();
        }
        self.open_line = false;
    }

    pub fn info(&mut self, text: &str) {
        self.close_line();
        match self.mode {
            OutputMode::Terminal => println!("{}", text),
            OutputMode::Captured => self.captured.push(Message::Info(text.to_string())),
        }
    }

    /// Text without a line break, continued by the next `echon`.
    pub fn append(&mut self, text: &str) {
        match self.mode {
            OutputMode::Terminal => print!("{}", text),
            OutputMode::Captured => match self.captured.last_mut() {
                Some(Message::Info(line)) if self.open_line => line.push_str(text),
                _ => self.captured.push(Message::Info(text.to_string())),
            },
        }
        self.open_line = true;
    }

    /// An error message, preceded by where it happened when that changed.
    pub fn error(&mut self, text: &str, source: Option<&str>, lnum: usize) {
        self.close_line();
        if let Some(name) = source {
            let changed = self.last_source.as_deref() != Some(name);
            if changed {
                self.write_error(&format!("Error detected while processing {}:", name));
            }
            if lnum != 0 && (changed || lnum != self.last_lnum) {
                self.write_error(&format!("line {:>4}:", lnum));
            }
            self.last_source = Some(name.to_string());
            self.last_lnum = lnum;
        }
        self.write_error(text);
    }

    fn write_error(&mut self, text: &str) {
        match self.mode {
            OutputMode::Terminal => eprintln!("{}", text),
            OutputMode::Captured => self.captured.push(Message::Error(text.to_string())),
        }
    }

    pub fn debug(&mut self, text: &str) {
        self.close_line();
        match self.mode {
            OutputMode::Terminal => eprintln!("{}", text),
            OutputMode::Captured => self.captured.push(Message::Debug(text.to_string())),
        }
    }

    /// Forget the error context, so the next error prints its headers.
    pub fn reset_context(&mut self) {
        self.last_source = None;
        self.last_lnum = 0;
    }

    pub fn captured(&self) -> &[Message] {
        &self.captured
    }

    pub fn take_captured(&mut self) -> Vec<Message> {
        self.open_line = false;
        std::mem::take(&mut self.captured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_headers_only_on_change() {
        let mut out = Output::new(OutputMode::Captured);
        out.error("E1", Some("function F"), 2);
        out.error("E2", Some("function F"), 2);
        out.error("E3", Some("function F"), 3);
        out.error("E4", None, 0);
        let texts: Vec<_> = out.captured().iter().map(Message::text).collect();
        assert_eq!(
            texts,
            vec![
                "Error detected while processing function F:",
                "line    2:",
                "E1",
                "E2",
                "line    3:",
                "E3",
                "E4"
            ]
        );
    }

    #[test]
    fn test_echon_continues_line() {
        let mut out = Output::new(OutputMode::Captured);
        out.append("a");
        out.append("b");
        out.info("c");
        out.append("d");
        let texts: Vec<_> = out.take_captured().into_iter().map(|m| m.text().to_string()).collect();
        assert_eq!(texts, vec!["ab", "c", "d"]);
    }

    #[test]
    fn test_message_json() {
        let json = serde_json::to_string(&Message::Error("E1".into())).unwrap();
        assert_eq!(json, r#"{"kind":"error","text":"E1"}"#);
    }
}
