//! Expression syntax.
//!
//! Parsing and evaluation are separate: commands that are skipped still
//! parse their expression to find where the next command starts.

use crate::error::{ScriptError, ScriptResult};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Concat,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Match,
    NoMatch,
    Is,
    IsNot,
}

/// `{args -> expr}`
#[derive(Debug)]
pub struct Lambda {
    pub params: Vec<String>,
    pub varargs: bool,
    pub body: Expr,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Number(i64),
    Str(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Var(String),
    Lambda(Rc<Lambda>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Plus(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// The case flag is `None` without a `#` or `?` suffix.
    Compare(CmpOp, Option<bool>, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
    /// `base.name`: a Dictionary member, or concatenation with the
    /// variable `name` when `base` is not a Dictionary.
    Member(Box<Expr>, String),
    Call(Box<Expr>, Vec<Expr>),
}

/// Accessor in an assignment target.
#[derive(Debug, Clone)]
pub enum Accessor {
    Index(Expr),
    Key(String),
}

/// Left-hand side of `:let`, `:for` and `:unlet`.
#[derive(Debug, Clone)]
pub enum LetTarget {
    Var { name: String, path: Vec<Accessor> },
    Unpack {
        targets: Vec<LetTarget>,
        rest: Option<Box<LetTarget>>,
    },
}

/// Parse one expression from the start of `src`.  Returns it with the
/// number of bytes used, including trailing white space.
pub fn parse_expr(src: &str) -> ScriptResult<(Expr, usize)> {
    let mut p = Parser::new(src);
    p.skip_ws();
    let expr = p.expr1()?;
    p.skip_ws();
    Ok((expr, p.pos))
}

/// Parse an assignment target.
pub fn parse_lvalue(src: &str) -> ScriptResult<(LetTarget, usize)> {
    let mut p = Parser::new(src);
    p.skip_ws();
    let target = if p.eat("[") {
        p.unpack_target()?
    } else {
        p.var_target()?
    };
    p.skip_ws();
    Ok((target, p.pos))
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '#'
}

fn is_scope(c: char) -> bool {
    matches!(c, 'g' | 's' | 'l' | 'a' | 'v' | 'b' | 'w' | 't')
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn invalid(&self) -> ScriptError {
        ScriptError::InvalidExpression(self.src.trim().to_string())
    }

    // expr1: ternary
    fn expr1(&mut self) -> ScriptResult<Expr> {
        let cond = self.expr2()?;
        self.skip_ws();
        if !self.eat("?") {
            return Ok(cond);
        }
        self.skip_ws();
        let then = self.expr1()?;
        self.skip_ws();
        if !self.eat(":") {
            return Err(self.invalid());
        }
        self.skip_ws();
        let otherwise = self.expr1()?;
        Ok(Expr::Ternary(Box::new(cond), Box::new(then), Box::new(otherwise)))
    }

    // expr2: ||
    fn expr2(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.expr3()?;
        loop {
            self.skip_ws();
            if !self.eat("||") {
                return Ok(lhs);
            }
            self.skip_ws();
            let rhs = self.expr3()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
    }

    // expr3: &&
    fn expr3(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.expr4()?;
        loop {
            self.skip_ws();
            if !self.eat("&&") {
                return Ok(lhs);
            }
            self.skip_ws();
            let rhs = self.expr4()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
    }

    fn comparison(&mut self) -> Option<CmpOp> {
        const SYMBOLS: &[(&str, CmpOp)] = &[
            ("==", CmpOp::Equal),
            ("!=", CmpOp::NotEqual),
            (">=", CmpOp::GreaterEqual),
            ("<=", CmpOp::LessEqual),
            ("=~", CmpOp::Match),
            ("!~", CmpOp::NoMatch),
            (">", CmpOp::Greater),
            ("<", CmpOp::Less),
        ];
        for (sym, op) in SYMBOLS {
            if self.eat(sym) {
                return Some(*op);
            }
        }
        for (word, op) in [("isnot", CmpOp::IsNot), ("is", CmpOp::Is)] {
            let rest = self.rest();
            if rest.starts_with(word)
                && !rest[word.len()..].starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
            {
                self.pos += word.len();
                return Some(op);
            }
        }
        None
    }

    // expr4: comparison, not associative
    fn expr4(&mut self) -> ScriptResult<Expr> {
        let lhs = self.expr5()?;
        self.skip_ws();
        let Some(op) = self.comparison() else {
            return Ok(lhs);
        };
        let ic = if self.eat("?") {
            Some(true)
        } else if self.eat("#") {
            Some(false)
        } else {
            None
        };
        self.skip_ws();
        let rhs = self.expr5()?;
        Ok(Expr::Compare(op, ic, Box::new(lhs), Box::new(rhs)))
    }

    // expr5: + - . ..
    fn expr5(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.expr6()?;
        loop {
            self.skip_ws();
            let op = if self.eat("..") || self.eat(".") {
                BinOp::Concat
            } else if self.eat("+") {
                BinOp::Add
            } else if self.peek() == Some('-') && self.peek_nth(1) != Some('>') {
                self.pos += 1;
                BinOp::Sub
            } else {
                return Ok(lhs);
            };
            self.skip_ws();
            let rhs = self.expr6()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // expr6: * / %
    fn expr6(&mut self) -> ScriptResult<Expr> {
        let mut lhs = self.expr7()?;
        loop {
            self.skip_ws();
            let op = match self.peek() {
                Some('*') => BinOp::Mul,
                Some('/') => BinOp::Div,
                Some('%') => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            self.skip_ws();
            let rhs = self.expr7()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // expr7: unary
    fn expr7(&mut self) -> ScriptResult<Expr> {
        self.skip_ws();
        if self.eat("!") {
            return Ok(Expr::Not(Box::new(self.expr7()?)));
        }
        if self.eat("-") {
            return Ok(Expr::Negate(Box::new(self.expr7()?)));
        }
        if self.eat("+") {
            return Ok(Expr::Plus(Box::new(self.expr7()?)));
        }
        self.expr8()
    }

    // expr8: subscripts, members and calls, no white space before them
    fn expr8(&mut self) -> ScriptResult<Expr> {
        let mut base = self.expr9()?;
        loop {
            match self.peek() {
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    let start = if self.peek() == Some(':') {
                        None
                    } else {
                        Some(Box::new(self.expr1()?))
                    };
                    self.skip_ws();
                    if self.eat(":") {
                        self.skip_ws();
                        let end = if self.peek() == Some(']') {
                            None
                        } else {
                            Some(Box::new(self.expr1()?))
                        };
                        self.skip_ws();
                        if !self.eat("]") {
                            return Err(ScriptError::MissingBracket);
                        }
                        base = Expr::Slice(Box::new(base), start, end);
                    } else {
                        self.skip_ws();
                        if !self.eat("]") {
                            return Err(ScriptError::MissingBracket);
                        }
                        let index = start.ok_or_else(|| self.invalid())?;
                        base = Expr::Index(Box::new(base), index);
                    }
                }
                Some('.')
                    if !matches!(base, Expr::Number(_) | Expr::Str(_))
                        && self
                            .peek_nth(1)
                            .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_') =>
                {
                    self.pos += 1;
                    let key = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                    base = Expr::Member(Box::new(base), key.to_string());
                }
                Some('(') => {
                    self.pos += 1;
                    let args = self.call_args(&base)?;
                    base = Expr::Call(Box::new(base), args);
                }
                _ => return Ok(base),
            }
        }
    }

    fn call_args(&mut self, callee: &Expr) -> ScriptResult<Vec<Expr>> {
        let name = match callee {
            Expr::Var(name) => name.clone(),
            _ => String::new(),
        };
        let mut args = Vec::new();
        loop {
            self.skip_ws();
            if self.eat(")") {
                return Ok(args);
            }
            if self.rest().is_empty() {
                return Err(ScriptError::InvalidFunctionArgs(name));
            }
            args.push(self.expr1()?);
            self.skip_ws();
            if self.eat(",") {
                continue;
            }
            if self.eat(")") {
                return Ok(args);
            }
            return Err(ScriptError::InvalidFunctionArgs(name));
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let end = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }

    // expr9: literals, variables, nesting
    fn expr9(&mut self) -> ScriptResult<Expr> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c.is_ascii_digit() => Ok(Expr::Number(self.number())),
            Some('"') => self.double_quoted(),
            Some('\'') => self.single_quoted(),
            Some('[') => {
                self.pos += 1;
                self.list()
            }
            Some('#') if self.peek_nth(1) == Some('{') => {
                self.pos += 2;
                self.dict(true)
            }
            Some('{') => match self.lambda()? {
                Some(lambda) => Ok(lambda),
                None => {
                    self.pos += 1;
                    self.dict(false)
                }
            },
            Some('(') => {
                self.pos += 1;
                self.skip_ws();
                let inner = self.expr1()?;
                self.skip_ws();
                if !self.eat(")") {
                    return Err(ScriptError::MissingParen);
                }
                Ok(inner)
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '<' => {
                let name = self.var_name();
                if name.is_empty() {
                    Err(self.invalid())
                } else {
                    Ok(Expr::Var(name))
                }
            }
            _ => Err(self.invalid()),
        }
    }

    fn number(&mut self) -> i64 {
        let rest = self.rest();
        let (radix, skip) = if rest.starts_with("0x") || rest.starts_with("0X") {
            (16, 2)
        } else if rest.starts_with("0b") || rest.starts_with("0B") {
            (2, 2)
        } else {
            (10, 0)
        };
        let digits = &rest[skip..];
        let len = digits.find(|c: char| !c.is_digit(radix)).unwrap_or(digits.len());
        if len == 0 {
            // "0x" alone is the number 0 followed by "x".
            self.pos += 1;
            return 0;
        }
        self.pos += skip + len;
        digits[..len].chars().fold(0i64, |acc, c| {
            let d = c.to_digit(radix).unwrap_or(0) as i64;
            acc.saturating_mul(radix as i64).saturating_add(d)
        })
    }

    fn double_quoted(&mut self) -> ScriptResult<Expr> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    self.pos += i + 1;
                    return Ok(Expr::Str(out));
                }
                '\\' => {
                    let Some((_, esc)) = chars.next() else { break };
                    match esc {
                        'n' => out.push('\n'),
                        't' => out.push('\t'),
                        'r' => out.push('\r'),
                        'e' => out.push('\x1b'),
                        'b' => out.push('\x08'),
                        'f' => out.push('\x0c'),
                        'x' | 'X' | 'u' | 'U' => {
                            let max = match esc {
                                'x' | 'X' => 2,
                                'u' => 4,
                                _ => 8,
                            };
                            let mut code = 0u32;
                            let mut n = 0;
                            while n < max {
                                match chars.clone().next() {
                                    Some((_, h)) if h.is_ascii_hexdigit() => {
                                        code = code * 16 + h.to_digit(16).unwrap_or(0);
                                        chars.next();
                                        n += 1;
                                    }
                                    _ => break,
                                }
                            }
                            if n == 0 {
                                out.push(esc);
                            } else if let Some(ch) = char::from_u32(code) {
                                out.push(ch);
                            }
                        }
                        '0'..='7' => {
                            let mut code = esc.to_digit(8).unwrap_or(0);
                            for _ in 0..2 {
                                match chars.clone().next() {
                                    Some((_, o)) if ('0'..='7').contains(&o) => {
                                        code = code * 8 + o.to_digit(8).unwrap_or(0);
                                        chars.next();
                                    }
                                    _ => break,
                                }
                            }
                            if let Some(ch) = char::from_u32(code) {
                                out.push(ch);
                            }
                        }
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
        Err(ScriptError::MissingDoubleQuote(self.src[start..].to_string()))
    }

    fn single_quoted(&mut self) -> ScriptResult<Expr> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let rest = self.rest();
            let Some(i) = rest.find('\'') else {
                return Err(ScriptError::MissingSingleQuote(self.src[start..].to_string()));
            };
            out.push_str(&rest[..i]);
            self.pos += i + 1;
            if self.peek() == Some('\'') {
                out.push('\'');
                self.pos += 1;
            } else {
                return Ok(Expr::Str(out));
            }
        }
    }

    fn list(&mut self) -> ScriptResult<Expr> {
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            if self.eat("]") {
                return Ok(Expr::List(items));
            }
            if self.rest().is_empty() {
                return Err(ScriptError::MissingListEnd(self.src.to_string()));
            }
            items.push(self.expr1()?);
            self.skip_ws();
            if self.eat(",") {
                continue;
            }
            if self.eat("]") {
                return Ok(Expr::List(items));
            }
            return Err(if self.rest().is_empty() {
                ScriptError::MissingListEnd(self.src.to_string())
            } else {
                ScriptError::MissingListComma(self.rest().to_string())
            });
        }
    }

    fn dict(&mut self, literal_keys: bool) -> ScriptResult<Expr> {
        let mut entries = Vec::new();
        loop {
            self.skip_ws();
            if self.eat("}") {
                return Ok(Expr::Dict(entries));
            }
            if self.rest().is_empty() {
                return Err(ScriptError::MissingDictEnd(self.src.to_string()));
            }
            let key = if literal_keys {
                let key = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
                if key.is_empty() {
                    return Err(self.invalid());
                }
                Expr::Str(key.to_string())
            } else {
                self.expr1()?
            };
            self.skip_ws();
            if !self.eat(":") {
                return Err(ScriptError::MissingDictColon(self.rest().to_string()));
            }
            self.skip_ws();
            let value = self.expr1()?;
            entries.push((key, value));
            self.skip_ws();
            if self.eat(",") {
                continue;
            }
            if self.eat("}") {
                return Ok(Expr::Dict(entries));
            }
            return Err(if self.rest().is_empty() {
                ScriptError::MissingDictEnd(self.src.to_string())
            } else {
                ScriptError::MissingDictComma(self.rest().to_string())
            });
        }
    }

    /// `{a, b -> expr}`; `None` when the braces hold a dictionary.
    fn lambda(&mut self) -> ScriptResult<Option<Expr>> {
        let save = self.pos;
        self.pos += 1;
        let mut params: Vec<String> = Vec::new();
        let mut varargs = false;
        loop {
            self.skip_ws();
            if self.eat("->") {
                break;
            }
            if !varargs && self.eat("...") {
                varargs = true;
                continue;
            }
            let name = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
            if varargs || name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
                self.pos = save;
                return Ok(None);
            }
            if params.iter().any(|p| p == name) {
                return Err(ScriptError::DuplicateArgument(name.to_string()));
            }
            params.push(name.to_string());
            self.skip_ws();
            if !self.eat(",") && !self.rest().starts_with("->") {
                self.pos = save;
                return Ok(None);
            }
        }
        self.skip_ws();
        let body = self.expr1()?;
        self.skip_ws();
        if !self.eat("}") {
            return Err(ScriptError::MissingLambdaEnd(self.rest().to_string()));
        }
        Ok(Some(Expr::Lambda(Rc::new(Lambda {
            params,
            varargs,
            body,
        }))))
    }

    /// Variable or function name, with scope prefix or `<SNR>`/`<SID>`.
    fn var_name(&mut self) -> String {
        let rest = self.rest();
        for special in ["<SNR>", "<SID>", "<lambda>"] {
            if rest.starts_with(special) {
                self.pos += special.len();
                let tail = self.take_while(is_name_char);
                return format!("{}{}", special, tail);
            }
        }
        if rest.starts_with('<') {
            return String::new();
        }
        let mut chars = rest.chars();
        if let (Some(scope), Some(':')) = (chars.next(), chars.next()) {
            if is_scope(scope) {
                self.pos += 2;
                let tail = self.take_while(is_name_char);
                return format!("{}:{}", scope, tail);
            }
        }
        self.take_while(is_name_char).to_string()
    }

    fn var_target(&mut self) -> ScriptResult<LetTarget> {
        self.skip_ws();
        let name = match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.var_name(),
            _ => String::new(),
        };
        if name.is_empty() || name.starts_with('<') {
            return Err(ScriptError::InvalidArgument(self.src.trim().to_string()));
        }
        let mut path = Vec::new();
        loop {
            match self.peek() {
                Some('[') => {
                    self.pos += 1;
                    self.skip_ws();
                    let index = self.expr1()?;
                    self.skip_ws();
                    if !self.eat("]") {
                        return Err(ScriptError::MissingBracket);
                    }
                    path.push(Accessor::Index(index));
                }
                Some('.')
                    if self
                        .peek_nth(1)
                        .map_or(false, |c| c.is_ascii_alphanumeric() || c == '_') =>
                {
                    self.pos += 1;
                    let key = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                    path.push(Accessor::Key(key.to_string()));
                }
                _ => return Ok(LetTarget::Var { name, path }),
            }
        }
    }

    fn unpack_target(&mut self) -> ScriptResult<LetTarget> {
        let mut targets = Vec::new();
        let mut rest = None;
        loop {
            self.skip_ws();
            if self.eat(";") {
                rest = Some(Box::new(self.var_target()?));
                self.skip_ws();
                if !self.eat("]") {
                    return Err(ScriptError::MissingBracket);
                }
                break;
            }
            targets.push(self.var_target()?);
            self.skip_ws();
            if self.eat(",") {
                continue;
            }
            if self.eat("]") {
                break;
            }
            if self.peek() == Some(';') {
                continue;
            }
            return Err(ScriptError::InvalidArgument(self.src.trim().to_string()));
        }
        Ok(LetTarget::Unpack { targets, rest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expr {
        parse_expr(src).unwrap().0
    }

    #[test]
    fn test_precedence() {
        match parse("1 + 2 * 3") {
            Expr::Binary(BinOp::Add, _, rhs) => {
                assert!(matches!(*rhs, Expr::Binary(BinOp::Mul, _, _)))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse("a || b && c"), Expr::Or(_, _)));
        assert!(matches!(parse("x ? 1 : 2"), Expr::Ternary(_, _, _)));
    }

    #[test]
    fn test_comparison_case_suffix() {
        match parse("a ==? 'B'") {
            Expr::Compare(CmpOp::Equal, Some(true), _, _) => {}
            other => panic!("unexpected {:?}", other),
        }
        match parse("a isnot b") {
            Expr::Compare(CmpOp::IsNot, None, _, _) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_stops_at_bar() {
        let src = "x + 1 | echo 2";
        let (_, used) = parse_expr(src).unwrap();
        assert_eq!(&src[used..], "| echo 2");
    }

    #[test]
    fn test_strings() {
        match parse(r#""a\tb\x41\"""#) {
            Expr::Str(s) => assert_eq!(s, "a\tbA\""),
            other => panic!("unexpected {:?}", other),
        }
        match parse("'it''s'") {
            Expr::Str(s) => assert_eq!(s, "it's"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_expr("\"open"),
            Err(ScriptError::MissingDoubleQuote(_))
        ));
    }

    #[test]
    fn test_lambda_and_dict() {
        match parse("{a, b -> a + b}") {
            Expr::Lambda(l) => assert_eq!(l.params, vec!["a", "b"]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(parse("{-> 1}"), Expr::Lambda(_)));
        assert!(matches!(parse("{'a': 1}"), Expr::Dict(_)));
        assert!(matches!(parse("#{one: 1, two-2: 2}"), Expr::Dict(ref e) if e.len() == 2));
        assert!(matches!(
            parse_expr("{'a' 1}"),
            Err(ScriptError::MissingDictColon(_))
        ));
    }

    #[test]
    fn test_subscripts_and_calls() {
        assert!(matches!(parse("d.key"), Expr::Member(_, ref k) if k == "key"));
        assert!(matches!(parse("'a'.'b'"), Expr::Binary(BinOp::Concat, _, _)));
        assert!(matches!(parse("l[1:]"), Expr::Slice(_, Some(_), None)));
        assert!(matches!(parse("s:Foo(1, 2)"), Expr::Call(_, ref a) if a.len() == 2));
        assert!(matches!(parse("<SNR>3_Foo()"), Expr::Call(ref f, _) if matches!(**f, Expr::Var(ref n) if n == "<SNR>3_Foo")));
        assert!(matches!(parse("a:000"), Expr::Var(ref n) if n == "a:000"));
        assert!(matches!(
            parse_expr("F(1"),
            Err(ScriptError::InvalidFunctionArgs(_))
        ));
    }

    #[test]
    fn test_numbers() {
        assert!(matches!(parse("0x1F"), Expr::Number(31)));
        assert!(matches!(parse("0b101"), Expr::Number(5)));
        assert!(matches!(parse("42"), Expr::Number(42)));
    }

    #[test]
    fn test_lvalues() {
        let (target, used) = parse_lvalue("d.k[0] = 1").unwrap();
        assert_eq!(used, 7);
        match target {
            LetTarget::Var { name, path } => {
                assert_eq!(name, "d");
                assert_eq!(path.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        match parse_lvalue("[a, b; rest] = l").unwrap().0 {
            LetTarget::Unpack { targets, rest } => {
                assert_eq!(targets.len(), 2);
                assert!(rest.is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_lvalue("1x = 2").is_err());
    }
}
