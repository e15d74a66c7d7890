//! Tokenizer for the restricted expression grammar (spec §4.1).
//!
//! The grammar is a small Python-flavored sub-language: arithmetic,
//! comparisons, boolean `and/or/not`, a ternary `a if c else b`,
//! membership `in`/`not in`, `is`/`is not None`, attribute access,
//! indexing/slicing on strings, function calls, and f-strings. There is
//! no statement form — a formula is always a single expression.

use std::fmt;

/// A lexical token plus its byte span in the source, for error reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    Str(String),
    /// An f-string's raw body (not yet split into literal/expr parts;
    /// the parser re-tokenizes each `{...}` segment).
    FString(String),
    Ident(String),
    True,
    False,
    None,
    And,
    Or,
    Not,
    In,
    Is,
    If,
    Else,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tokenizer error at {}: {}", self.pos, self.message)
    }
}
impl std::error::Error for TokenizerError {}

pub struct Tokenizer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizerError> {
        let mut out = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            if self.pos >= self.src.len() {
                out.push(Token {
                    kind: TokenKind::Eof,
                    start,
                    end: start,
                });
                break;
            }
            let c = self.src[self.pos];
            let kind = match c {
                b'0'..=b'9' => self.number()?,
                b'.' if self.peek(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                b'"' | b'\'' => self.string(c)?,
                b'f' | b'F'
                    if matches!(self.peek(1), Some(b'"') | Some(b'\'')) =>
                {
                    self.pos += 1;
                    let quote = self.src[self.pos];
                    let body = self.raw_string(quote)?;
                    TokenKind::FString(body)
                }
                b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.ident_or_keyword(),
                b'+' => self.advance1(TokenKind::Plus),
                b'-' => self.advance1(TokenKind::Minus),
                b'*' => {
                    if self.peek(1) == Some(b'*') {
                        self.advance2(TokenKind::DoubleStar)
                    } else {
                        self.advance1(TokenKind::Star)
                    }
                }
                b'/' => {
                    if self.peek(1) == Some(b'/') {
                        self.advance2(TokenKind::DoubleSlash)
                    } else {
                        self.advance1(TokenKind::Slash)
                    }
                }
                b'%' => self.advance1(TokenKind::Percent),
                b'=' => {
                    if self.peek(1) == Some(b'=') {
                        self.advance2(TokenKind::Eq)
                    } else {
                        return Err(self.err("unexpected '='; did you mean '=='?"));
                    }
                }
                b'!' => {
                    if self.peek(1) == Some(b'=') {
                        self.advance2(TokenKind::NotEq)
                    } else {
                        return Err(self.err("unexpected '!'"));
                    }
                }
                b'<' => {
                    if self.peek(1) == Some(b'=') {
                        self.advance2(TokenKind::LtEq)
                    } else {
                        self.advance1(TokenKind::Lt)
                    }
                }
                b'>' => {
                    if self.peek(1) == Some(b'=') {
                        self.advance2(TokenKind::GtEq)
                    } else {
                        self.advance1(TokenKind::Gt)
                    }
                }
                b'(' => self.advance1(TokenKind::LParen),
                b')' => self.advance1(TokenKind::RParen),
                b'[' => self.advance1(TokenKind::LBracket),
                b']' => self.advance1(TokenKind::RBracket),
                b',' => self.advance1(TokenKind::Comma),
                b'.' => self.advance1(TokenKind::Dot),
                b':' => self.advance1(TokenKind::Colon),
                other => {
                    return Err(self.err(format!("unexpected character '{}'", other as char)));
                }
            };
            out.push(Token {
                kind,
                start,
                end: self.pos,
            });
        }
        Ok(out)
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    fn advance1(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }
    fn advance2(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 2;
        kind
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.src.get(self.pos) {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn err(&self, message: impl Into<String>) -> TokenizerError {
        TokenizerError {
            message: message.into(),
            pos: self.pos,
        }
    }

    fn number(&mut self) -> Result<TokenKind, TokenizerError> {
        let start = self.pos;
        let mut is_float = false;
        while let Some(c) = self.src.get(self.pos) {
            match c {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !is_float => {
                    is_float = true;
                    self.pos += 1;
                }
                b'e' | b'E' => {
                    is_float = true;
                    self.pos += 1;
                    if matches!(self.src.get(self.pos), Some(b'+') | Some(b'-')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        if is_float {
            text.parse::<f64>()
                .map(TokenKind::Float)
                .map_err(|_| self.err(format!("invalid float literal '{text}'")))
        } else {
            text.parse::<i64>()
                .map(TokenKind::Int)
                .map_err(|_| self.err(format!("invalid integer literal '{text}'")))
        }
    }

    fn raw_string(&mut self, quote: u8) -> Result<String, TokenizerError> {
        self.pos += 1; // opening quote
        let start = self.pos;
        while let Some(c) = self.src.get(self.pos).copied() {
            if c == quote {
                let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap().to_string();
                self.pos += 1;
                return Ok(text);
            }
            if c == b'\\' {
                self.pos += 2;
            } else {
                self.pos += 1;
            }
        }
        Err(self.err("unterminated string literal"))
    }

    fn string(&mut self, quote: u8) -> Result<TokenKind, TokenizerError> {
        let raw = self.raw_string(quote)?;
        Ok(TokenKind::Str(unescape(&raw)))
    }

    fn ident_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while let Some(c) = self.src.get(self.pos) {
            if c.is_ascii_alphanumeric() || *c == b'_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap();
        match text {
            "True" | "true" => TokenKind::True,
            "False" | "false" => TokenKind::False,
            "None" | "none" => TokenKind::None,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "in" => TokenKind::In,
            "is" => TokenKind::Is,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            _ => TokenKind::Ident(text.to_string()),
        }
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                Option::None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Tokenizer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenizes_arithmetic() {
        assert_eq!(
            kinds("p * r / 1000"),
            vec![
                TokenKind::Ident("p".into()),
                TokenKind::Star,
                TokenKind::Ident("r".into()),
                TokenKind::Slash,
                TokenKind::Int(1000),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn tokenizes_ternary_and_is_none() {
        let k = kinds("a if last_valid_changed is not None else b");
        assert!(k.contains(&TokenKind::If));
        assert!(k.contains(&TokenKind::Is));
        assert!(k.contains(&TokenKind::Not));
        assert!(k.contains(&TokenKind::None));
    }

    #[test]
    fn tokenizes_fstring() {
        let k = kinds(r#"f"value={x}""#);
        assert!(matches!(k[0], TokenKind::FString(_)));
    }

    #[test]
    fn rejects_single_equals() {
        assert!(Tokenizer::new("a = b").tokenize().is_err());
    }
}
