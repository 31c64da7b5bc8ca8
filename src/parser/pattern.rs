use crate::error::{ScriptError, ScriptResult};
use regex::{Regex, RegexBuilder};

/// Translate a Vim pattern ('magic' syntax) to `regex` syntax.
/// Returns the translation and whether `\c` asked for ignoring case.
pub fn translate_pattern(pat: &str) -> (String, Option<bool>) {
    let mut out = String::new();
    let mut case = None;
    let chars: Vec<char> = pat.chars().collect();
    let mut i = 0;
    // At the start of a branch: `^` is special there.
    let mut branch_start = true;

    while i < chars.len() {
        let c = chars[i];
        let at_start = branch_start;
        branch_start = false;
        match c {
            '\\' if i + 1 < chars.len() => {
                let n = chars[i + 1];
                i += 2;
                match n {
                    '|' => {
                        out.push('|');
                        branch_start = true;
                    }
                    '(' => {
                        out.push('(');
                        branch_start = true;
                    }
                    '%' if chars.get(i) == Some(&'(') => {
                        out.push_str("(?:");
                        i += 1;
                        branch_start = true;
                    }
                    ')' => out.push(')'),
                    '+' => out.push('+'),
                    '=' | '?' => out.push('?'),
                    '<' | '>' => out.push_str("\\b"),
                    '{' => {
                        let close = chars[i..].iter().position(|&ch| ch == '}');
                        let body: String = match close {
                            Some(len) => chars[i..i + len].iter().collect(),
                            None => String::new(),
                        };
                        i += close.map_or(0, |len| len + 1);
                        let (lazy, body) = match body.strip_prefix('-') {
                            Some(b) => (true, b.to_string()),
                            None => (false, body),
                        };
                        let body = body.trim_end_matches('\\');
                        if body.is_empty() {
                            out.push('*');
                        } else if body.starts_with(',') {
                            out.push_str(&format!("{{0{}}}", body));
                        } else {
                            out.push_str(&format!("{{{}}}", body));
                        }
                        if lazy {
                            out.push('?');
                        }
                    }
                    'd' | 'D' | 's' | 'S' | 'w' | 'W' => {
                        out.push('\\');
                        out.push(n);
                    }
                    'a' => out.push_str("[A-Za-z]"),
                    'A' => out.push_str("[^A-Za-z]"),
                    'l' => out.push_str("[a-z]"),
                    'L' => out.push_str("[^a-z]"),
                    'u' => out.push_str("[A-Z]"),
                    'U' => out.push_str("[^A-Z]"),
                    'x' => out.push_str("[0-9A-Fa-f]"),
                    'X' => out.push_str("[^0-9A-Fa-f]"),
                    'n' => out.push_str("\\n"),
                    't' => out.push_str("\\t"),
                    'e' => out.push_str("\\x1b"),
                    'c' => case = Some(true),
                    'C' => case = Some(false),
                    other => out.push_str(&regex::escape(&other.to_string())),
                }
                continue;
            }
            '^' if at_start => out.push('^'),
            '$' if i + 1 == chars.len()
                || (chars[i + 1] == '\\' && matches!(chars.get(i + 2), Some('|') | Some(')'))) =>
            {
                out.push('$')
            }
            '.' => out.push('.'),
            '*' if !at_start => out.push('*'),
            '[' => {
                // Copy a collection through; `]` right after `[` or `[^` is literal.
                let mut j = i + 1;
                if chars.get(j) == Some(&'^') {
                    j += 1;
                }
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                while j < chars.len() && chars[j] != ']' {
                    j += if chars[j] == '\\' { 2 } else { 1 };
                }
                if j < chars.len() {
                    let class: String = chars[i + 1..j].iter().collect();
                    let class = match class.strip_prefix("^]") {
                        Some(rest) => format!("^\\]{}", rest),
                        None => match class.strip_prefix(']') {
                            Some(rest) => format!("\\]{}", rest),
                            None => class,
                        },
                    };
                    out.push('[');
                    out.push_str(&class.replace('[', "\\["));
                    out.push(']');
                    i = j + 1;
                    continue;
                }
                out.push_str("\\[");
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }

    (out, case)
}

/// Compile a Vim pattern.  `\c` and `\C` in the pattern override `ignore_case`.
pub fn compile_pattern(pat: &str, ignore_case: bool) -> ScriptResult<Regex> {
    let (translated, case) = translate_pattern(pat);
    RegexBuilder::new(&translated)
        .case_insensitive(case.unwrap_or(ignore_case))
        .build()
        .map_err(|_| ScriptError::InvalidPattern(pat.to_string()))
}

/// Byte index of the first `delim` in `s` that is not escaped or inside
/// `[]`; `s.len()` when there is none.
pub fn skip_pattern(s: &str, delim: char) -> usize {
    let mut chars = s.char_indices().peekable();
    let mut in_class = false;
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                chars.next();
            }
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            c if c == delim && !in_class => return i,
            _ => {}
        }
    }
    s.len()
}

/// Regex for a file or function name pattern as used by breakpoints:
/// `*` matches anything, `?` one character.
pub fn glob_to_regex(pat: &str) -> String {
    let mut out = String::new();
    if !pat.starts_with('*') {
        out.push('^');
    }
    let mut chars = pat.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' => {
                if let Some(n) = chars.next() {
                    out.push_str(&regex::escape(&n.to_string()));
                }
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    if !pat.ends_with('*') {
        out.push('$');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pat: &str, text: &str) -> bool {
        compile_pattern(pat, false).unwrap().is_match(text)
    }

    #[test]
    fn test_magic_translation() {
        assert!(matches("^Vim(\\a\\+):E\\d\\+", "Vim(echo):E121: Undefined variable: x"));
        assert!(matches("foo\\|bar", "a bar"));
        assert!(matches("x\\{2}", "axxb"));
        assert!(!matches("x\\{3}", "axxb"));
        assert!(matches("\\<word\\>", "a word here"));
        assert!(matches("a(b)", "a(b)"));
        assert!(matches("1+1", "1+1"));
        assert!(matches("[^]x]", "y"));
        assert!(matches("^\\d\\+$", "123"));
        assert!(!matches("^\\d\\+$", "12a"));
    }

    #[test]
    fn test_case_flags() {
        assert!(matches("\\cABC", "abc"));
        assert!(!compile_pattern("\\Cabc", true).unwrap().is_match("ABC"));
        assert!(compile_pattern("abc", true).unwrap().is_match("ABC"));
    }

    #[test]
    fn test_skip_pattern() {
        assert_eq!(skip_pattern("abc/ rest", '/'), 3);
        assert_eq!(skip_pattern("a\\/b/", '/'), 4);
        assert_eq!(skip_pattern("[/]x/", '/'), 4);
        assert_eq!(skip_pattern("none", '/'), 4);
    }

    #[test]
    fn test_glob_to_regex() {
        let re = Regex::new(&glob_to_regex("*Test?")).unwrap();
        assert!(re.is_match("MyTest1"));
        assert!(!re.is_match("MyTest12"));
        let re = Regex::new(&glob_to_regex("Foo")).unwrap();
        assert!(re.is_match("Foo"));
        assert!(!re.is_match("Foobar"));
    }
}
