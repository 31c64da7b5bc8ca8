use super::types::SourceLine;

/// Whether a physical line continues the previous one: its first
/// non-blank character is a backslash.
fn continuation_tail(line: &str) -> Option<&str> {
    line.trim_start().strip_prefix('\\')
}

/// `"\ ` lines are comments between continuation lines.
fn is_continuation_comment(line: &str) -> bool {
    line.trim_start().starts_with("\"\\ ")
}

/// Join physical lines continued with a leading backslash.
pub fn join_continued_lines(physical: &[&str]) -> Vec<SourceLine> {
    let mut out: Vec<SourceLine> = Vec::new();

    for (i, line) in physical.iter().enumerate() {
        let lnum = i + 1;
        if let Some(prev) = out.last_mut() {
            if is_continuation_comment(line) {
                prev.end_lnum = lnum;
                continue;
            }
            if let Some(tail) = continuation_tail(line) {
                prev.text.push_str(tail);
                prev.end_lnum = lnum;
                continue;
            }
        }
        out.push(SourceLine::new(*line, lnum));
    }

    out
}

/// Split script text into logical lines.
pub fn preprocess_source(text: &str) -> Vec<SourceLine> {
    let physical: Vec<&str> = text.lines().collect();
    join_continued_lines(&physical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_keeps_physical_span() {
        let lines = preprocess_source("let x = [1,\n      \\ 2,\n      \\ 3]\necho x");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "let x = [1, 2, 3]");
        assert_eq!(lines[0].lnum, 1);
        assert_eq!(lines[0].end_lnum, 3);
        assert_eq!(lines[1].lnum, 4);
    }

    #[test]
    fn test_comment_inside_continuation() {
        let lines = preprocess_source("call F(1,\n\"\\ the second one\n\\ 2)");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "call F(1, 2)");
        assert_eq!(lines[0].end_lnum, 3);
    }

    #[test]
    fn test_leading_backslash_on_first_line_is_kept() {
        let lines = preprocess_source("\\ echo 1");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "\\ echo 1");
    }
}
