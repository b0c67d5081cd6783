//! Syntax validation for collection access rules.
//!
//! Rules are persisted verbatim and evaluated elsewhere; this module only
//! checks that a rule is well-formed:
//!
//! ```text
//! Expr    := Or
//! Or      := And ("||" And)*
//! And     := Cmp ("&&" Cmp)*
//! Cmp     := Operand OP Operand | "(" Expr ")"
//! Operand := Path | String | Number | true | false | null
//! Path    := Ident ("." Ident)* (":" Modifier)?
//! ```
//!
//! An empty (or comment-only) rule is valid and means "any authenticated
//! caller".

use crate::error::{CoreError, CoreResult};

const OPERATORS: &[&str] = &[
    "?!=", "?>=", "?<=", "?!~", "!=", "?=", ">=", "<=", "!~", "?>", "?<", "?~", "=", ">", "<",
    "~",
];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path,
    Str,
    Num,
    Op,
    And,
    Or,
    LParen,
    RParen,
}

#[derive(Debug)]
struct Spanned {
    token: Token,
    offset: usize,
}

/// Validate `rule` against the rule grammar.
///
/// `name` is the rule key (`listRule`, ...) used in the error message.
pub fn validate_rule(name: &str, rule: &str) -> CoreResult<()> {
    let tokens = tokenize(rule).map_err(|(offset, message)| syntax(name, offset, message))?;
    if tokens.is_empty() {
        return Ok(());
    }
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        end: rule.len(),
    };
    parser
        .expr()
        .and_then(|()| match parser.peek() {
            None => Ok(()),
            Some(t) => Err((t.offset, "unexpected trailing input".to_string())),
        })
        .map_err(|(offset, message)| syntax(name, offset, message))
}

fn syntax(rule: &str, offset: usize, message: String) -> CoreError {
    CoreError::RuleSyntax {
        rule: rule.to_string(),
        offset,
        message,
    }
}

type Step<T> = Result<T, (usize, String)>;

fn tokenize(src: &str) -> Step<Vec<Spanned>> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if src[i..].starts_with("//") {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }

        let token = match c {
            b'(' => {
                i += 1;
                Token::LParen
            }
            b')' => {
                i += 1;
                Token::RParen
            }
            b'&' if src[i..].starts_with("&&") => {
                i += 2;
                Token::And
            }
            b'|' if src[i..].starts_with("||") => {
                i += 2;
                Token::Or
            }
            b'\'' | b'"' => {
                i = scan_string(bytes, i)?;
                Token::Str
            }
            b'0'..=b'9' => {
                i = scan_number(bytes, i);
                Token::Num
            }
            b'-' if bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i = scan_number(bytes, i + 1);
                Token::Num
            }
            b'@' | b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                i = scan_path(src, i)?;
                Token::Path
            }
            _ => match OPERATORS.iter().find(|op| src[i..].starts_with(**op)) {
                Some(op) => {
                    i += op.len();
                    Token::Op
                }
                None => {
                    let ch = src[i..].chars().next().unwrap_or('?');
                    return Err((i, format!("unexpected character '{ch}'")));
                }
            },
        };
        out.push(Spanned {
            token,
            offset: start,
        });
    }
    Ok(out)
}

fn scan_string(bytes: &[u8], start: usize) -> Step<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Ok(i + 1),
            _ => i += 1,
        }
    }
    Err((start, "unterminated string literal".to_string()))
}

fn scan_number(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit() {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
    }
    i
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// `@request.auth.id`, `uid`, `divisions:length`, `@collection.users.id`.
fn scan_path(src: &str, start: usize) -> Step<usize> {
    let bytes = src.as_bytes();
    let mut i = start;
    if bytes[i] == b'@' {
        i += 1;
    }
    let segment = |mut j: usize| {
        let from = j;
        while j < bytes.len() && is_ident_byte(bytes[j]) {
            j += 1;
        }
        (j > from).then_some(j)
    };

    i = segment(i).ok_or((start, "expected identifier after '@'".to_string()))?;
    while i < bytes.len() && bytes[i] == b'.' {
        i = segment(i + 1).ok_or((i, "expected identifier after '.'".to_string()))?;
    }
    if i < bytes.len() && bytes[i] == b':' {
        i = segment(i + 1).ok_or((i, "expected modifier after ':'".to_string()))?;
    }
    Ok(i)
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    end: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn eat(&mut self, token: Token) -> bool {
        if self.peek().is_some_and(|t| t.token == token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn here(&self) -> usize {
        self.peek().map_or(self.end, |t| t.offset)
    }

    fn expr(&mut self) -> Step<()> {
        self.and()?;
        while self.eat(Token::Or) {
            self.and()?;
        }
        Ok(())
    }

    fn and(&mut self) -> Step<()> {
        self.cmp()?;
        while self.eat(Token::And) {
            self.cmp()?;
        }
        Ok(())
    }

    fn cmp(&mut self) -> Step<()> {
        if self.eat(Token::LParen) {
            self.expr()?;
            if !self.eat(Token::RParen) {
                return Err((self.here(), "expected ')'".to_string()));
            }
            return Ok(());
        }
        self.operand()?;
        if !self.eat(Token::Op) {
            return Err((self.here(), "expected comparison operator".to_string()));
        }
        self.operand()
    }

    fn operand(&mut self) -> Step<()> {
        match self.peek().map(|t| &t.token) {
            Some(Token::Path | Token::Str | Token::Num) => {
                self.pos += 1;
                Ok(())
            }
            _ => Err((self.here(), "expected operand".to_string())),
        }
    }
}

#[cfg(test)]
#[path = "access_rule_test.rs"]
mod tests;
