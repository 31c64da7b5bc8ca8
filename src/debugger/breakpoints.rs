use crate::error::{ScriptError, ScriptResult};
use crate::parser::glob_to_regex;
use crate::value::Value;
use regex::Regex;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    Func,
    File,
    Expr,
}

impl BreakKind {
    fn keyword(self) -> &'static str {
        match self {
            BreakKind::Func => "func",
            BreakKind::File => "file",
            BreakKind::Expr => "expr",
        }
    }
}

/// A parsed `breakadd`/`breakdel` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakSpec {
    pub kind: BreakKind,
    /// 0 when no line was given (only meaningful for `breakdel`).
    pub lnum: usize,
    /// Name pattern, or the expression for `expr`.
    pub name: String,
}

impl BreakSpec {
    /// Parse `func [lnum] NAME`, `file [lnum] NAME` or `expr EXPR`.
    pub fn parse(arg: &str) -> ScriptResult<Self> {
        let arg = arg.trim();
        let invalid = || ScriptError::InvalidArgument(arg.to_string());
        let (keyword, rest) = match arg.find(char::is_whitespace) {
            Some(i) => (&arg[..i], arg[i..].trim_start()),
            None => (arg, ""),
        };
        let kind = match keyword {
            "func" => BreakKind::Func,
            "file" => BreakKind::File,
            "expr" => BreakKind::Expr,
            _ => return Err(invalid()),
        };

        if kind == BreakKind::Expr {
            if rest.is_empty() {
                return Err(invalid());
            }
            return Ok(Self {
                kind,
                lnum: 0,
                name: rest.to_string(),
            });
        }

        let words = shlex::split(rest).ok_or_else(invalid)?;
        let mut words = words.into_iter().peekable();
        let mut lnum = 0;
        if let Some(first) = words.peek() {
            if !first.is_empty() && first.chars().all(|c| c.is_ascii_digit()) {
                lnum = first.parse().map_err(|_| invalid())?;
                words.next();
            }
        }
        let mut name = words.collect::<Vec<_>>().join(" ");
        if kind == BreakKind::Func {
            if let Some(stripped) = name.strip_prefix("g:") {
                name = stripped.to_string();
            }
            if name.contains("()") {
                return Err(invalid());
            }
        }
        if name.is_empty() {
            return Err(invalid());
        }
        Ok(Self { kind, lnum, name })
    }
}

#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub nr: usize,
    pub kind: BreakKind,
    pub name: String,
    pub lnum: usize,
    regex: Option<Regex>,
    /// Last value of a watch expression; `None` before the first
    /// evaluation and while evaluating fails.
    pub value: Option<Value>,
}

impl Breakpoint {
    pub fn matches_name(&self, name: &str) -> bool {
        self.regex.as_ref().map_or(false, |re| re.is_match(name))
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            BreakKind::Expr => write!(f, "{:3}  expr {}", self.nr, self.name),
            kind => write!(
                f,
                "{:3}  {} {}  line {}",
                self.nr,
                kind.keyword(),
                self.name,
                self.lnum
            ),
        }
    }
}

/// All user breakpoints, in the order they were added.
#[derive(Debug, Default)]
pub struct BreakpointRegistry {
    points: Vec<Breakpoint>,
    last_nr: usize,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a breakpoint; watch expressions get their first value from the caller.
    pub fn add(&mut self, spec: BreakSpec, value: Option<Value>) -> ScriptResult<&Breakpoint> {
        let regex = match spec.kind {
            BreakKind::Expr => None,
            _ => Some(
                Regex::new(&glob_to_regex(&spec.name))
                    .map_err(|_| ScriptError::InvalidArgument(spec.name.clone()))?,
            ),
        };
        self.last_nr += 1;
        self.points.push(Breakpoint {
            nr: self.last_nr,
            kind: spec.kind,
            lnum: if spec.kind == BreakKind::Expr {
                0
            } else {
                spec.lnum.max(1)
            },
            name: spec.name,
            regex,
            value,
        });
        let idx = self.points.len() - 1;
        Ok(&self.points[idx])
    }

    pub fn remove_nr(&mut self, nr: usize) -> Option<Breakpoint> {
        let idx = self.points.iter().position(|bp| bp.nr == nr)?;
        Some(self.points.remove(idx))
    }

    /// Remove the breakpoint matching `spec`; with line 0 the one with the
    /// smallest line is taken.
    pub fn remove_spec(&mut self, spec: &BreakSpec) -> Option<Breakpoint> {
        let idx = self
            .points
            .iter()
            .enumerate()
            .filter(|(_, bp)| {
                bp.kind == spec.kind
                    && bp.name == spec.name
                    && (spec.lnum == 0 || spec.kind == BreakKind::Expr || bp.lnum == spec.lnum)
            })
            .min_by_key(|(_, bp)| bp.lnum)
            .map(|(idx, _)| idx)?;
        Some(self.points.remove(idx))
    }

    pub fn contains(&self, nr: usize) -> bool {
        self.points.iter().any(|bp| bp.nr == nr)
    }

    pub fn clear(&mut self) -> usize {
        let n = self.points.len();
        self.points.clear();
        n
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn has_watch(&self) -> bool {
        self.points.iter().any(|bp| bp.kind == BreakKind::Expr)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.points.iter()
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Breakpoint> {
        self.points.get_mut(idx)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Smallest line of a `func`/`file` breakpoint matching `name` after
    /// line `after`; 0 when there is none.
    pub fn next_line(&self, file: bool, name: &str, after: usize) -> usize {
        let wanted = if file { BreakKind::File } else { BreakKind::Func };
        // A file pattern may also name just the last path component.
        let short = if file {
            Path::new(name).file_name().and_then(|n| n.to_str())
        } else {
            None
        };
        self.points
            .iter()
            .filter(|bp| bp.kind == wanted && bp.lnum > after)
            .filter(|bp| bp.matches_name(name) || short.map_or(false, |s| bp.matches_name(s)))
            .map(|bp| bp.lnum)
            .min()
            .unwrap_or(0)
    }

    /// Lines for `breaklist`.
    pub fn listing(&self) -> Vec<String> {
        if self.points.is_empty() {
            return vec!["No breakpoints defined".to_string()];
        }
        self.points.iter().map(|bp| bp.to_string()).collect()
    }
}
