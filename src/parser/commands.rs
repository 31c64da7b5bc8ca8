use super::types::{find_command, CmdDef};

/// Command modifiers in front of the command name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    /// `silent!`: errors are not shown and do not abort.
    pub silent_bang: bool,
    pub silent: bool,
    pub sandbox: bool,
}

/// A command line split into modifiers, name and argument.
#[derive(Debug, Clone)]
pub struct CommandHead<'a> {
    pub mods: Modifiers,
    /// Text from the command name on, used for display.
    pub cmd_text: &'a str,
    pub name: &'a str,
    pub def: Option<&'static CmdDef>,
    pub bang: bool,
    pub arg: &'a str,
}

/// Check if line is a comment (or empty).
pub fn is_comment(line: &str) -> bool {
    let trimmed = skip_colons(line);
    trimmed.is_empty() || trimmed.starts_with('"')
}

fn skip_colons(line: &str) -> &str {
    line.trim_start_matches(|c: char| c.is_whitespace() || c == ':')
}

fn split_name(text: &str) -> (&str, &str) {
    let end = text
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    text.split_at(end)
}

/// Parse modifiers, command name and bang.
pub fn parse_command(line: &str) -> CommandHead<'_> {
    let mut mods = Modifiers::default();
    let mut text = skip_colons(line);

    loop {
        let (name, rest) = split_name(text);
        let is_modifier = |full: &str| name.len() >= 3 && full.starts_with(name);
        if is_modifier("silent") {
            if let Some(after) = rest.strip_prefix('!') {
                mods.silent_bang = true;
                text = skip_colons(after);
            } else {
                mods.silent = true;
                text = skip_colons(rest);
            }
            continue;
        }
        if is_modifier("sandbox") {
            mods.sandbox = true;
            text = skip_colons(rest);
            continue;
        }
        break;
    }

    let cmd_text = text;
    let (name, mut rest) = split_name(text);
    let def = find_command(name);
    let mut bang = false;
    if let Some(d) = def {
        if d.bang {
            if let Some(after) = rest.strip_prefix('!') {
                bang = true;
                rest = after;
            }
        }
    }

    CommandHead {
        mods,
        cmd_text,
        name,
        def,
        bang,
        arg: rest.trim_start(),
    }
}

/// Split at the first `|` outside quotes.
pub fn split_bar(line: &str) -> (&str, Option<&str>) {
    let mut in_double = false;
    let mut in_single = false;
    let mut escaped = false;

    for (i, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_double => escaped = true,
            '"' if !in_single => in_double = !in_double,
            '\'' if !in_double => in_single = !in_single,
            '|' if !in_double && !in_single => return (line[..i].trim_end(), Some(&line[i + 1..])),
            _ => {}
        }
    }
    (line.trim_end(), None)
}

/// The command after the first `|` anywhere in `p`.
pub fn find_nextcmd(p: &str) -> Option<String> {
    p.find('|').map(|i| p[i + 1..].to_string())
}

/// What follows an expression: nothing, a comment, or `|` and the next
/// command.  Anything else is returned as trailing characters.
pub fn check_nextcmd(p: &str) -> Result<Option<String>, String> {
    let p = p.trim_start();
    if p.is_empty() || p.starts_with('"') {
        Ok(None)
    } else if let Some(rest) = p.strip_prefix('|') {
        Ok(Some(rest.to_string()))
    } else {
        Err(p.to_string())
    }
}

/// A line starting a `:while` or `:for`; such lines are kept for looping.
pub fn has_loop_cmd(line: &str) -> bool {
    let head = parse_command(line);
    head.name.starts_with("wh") || head.name == "for"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::CmdId;

    #[test]
    fn test_modifiers_and_bang() {
        let head = parse_command("  :silent! call Foo()");
        assert!(head.mods.silent_bang);
        assert_eq!(head.def.map(|d| d.id), Some(CmdId::Call));
        assert_eq!(head.arg, "Foo()");

        let head = parse_command("sandbox function! Bar()");
        assert!(head.mods.sandbox);
        assert!(head.bang);
        assert_eq!(head.arg, "Bar()");

        let head = parse_command("if !x");
        assert!(!head.bang);
        assert_eq!(head.arg, "!x");
    }

    #[test]
    fn test_unknown_command() {
        let head = parse_command("frobnicate now");
        assert!(head.def.is_none());
        assert_eq!(head.name, "frobnicate");
    }

    #[test]
    fn test_split_bar_respects_quotes() {
        assert_eq!(split_bar("try | echo 1"), ("try", Some(" echo 1")));
        assert_eq!(split_bar("file 'a|b'"), ("file 'a|b'", None));
        assert_eq!(split_bar("x \"a\\\"|\" | y"), ("x \"a\\\"|\"", Some(" y")));
    }

    #[test]
    fn test_check_nextcmd() {
        assert_eq!(check_nextcmd("  | endif"), Ok(Some(" endif".to_string())));
        assert_eq!(check_nextcmd("  \" comment"), Ok(None));
        assert_eq!(check_nextcmd(""), Ok(None));
        assert_eq!(check_nextcmd(" junk"), Err("junk".to_string()));
    }

    #[test]
    fn test_comments_and_loops() {
        assert!(is_comment("  \" note"));
        assert!(is_comment(""));
        assert!(!is_comment("echo 1"));
        assert!(has_loop_cmd("  while x < 3"));
        assert!(has_loop_cmd("for i in range(3)"));
        assert!(!has_loop_cmd("function F()"));
    }
}
