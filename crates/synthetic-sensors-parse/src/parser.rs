//! Recursive-descent parser, one precedence level per function, lowest
//! (ternary) at the top. Forbidden per spec §4.1: imports, lambdas,
//! comprehensions, assignment/augmented-assignment, `exec`/`eval`.
//! Nothing in this grammar can express any of those, so there is no
//! explicit reject list to maintain — the grammar itself is the
//! sandbox.

use std::fmt;

use synthetic_sensors_common::Value;

use crate::ast::{BinaryOp, BoolOp, CompareOp, Expr, FStringPart, UnaryOp};
use crate::tokenizer::{Token, TokenKind, Tokenizer};

#[derive(Debug, Clone, PartialEq)]
pub struct ParsingError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parse error at {}: {}", self.pos, self.message)
    }
}
impl std::error::Error for ParsingError {}

pub fn parse(src: &str) -> Result<Expr, ParsingError> {
    let tokens = Tokenizer::new(src)
        .tokenize()
        .map_err(|e| ParsingError {
            message: e.message,
            pos: e.pos,
        })?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.ternary()?;
    parser.expect_eof()?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn at_pos(&self) -> usize {
        self.tokens[self.pos].start
    }

    fn advance(&mut self) -> TokenKind {
        let k = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        k
    }

    fn err(&self, message: impl Into<String>) -> ParsingError {
        ParsingError {
            message: message.into(),
            pos: self.at_pos(),
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParsingError> {
        if std::mem::discriminant(self.peek()) == std::mem::discriminant(kind) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {kind}, found {}", self.peek())))
        }
    }

    fn expect_eof(&mut self) -> Result<(), ParsingError> {
        if matches!(self.peek(), TokenKind::Eof) {
            Ok(())
        } else {
            Err(self.err(format!("unexpected trailing token {}", self.peek())))
        }
    }

    /* ----------------------------- ternary ----------------------------- */
    fn ternary(&mut self) -> Result<Expr, ParsingError> {
        let body = self.or_expr()?;
        if matches!(self.peek(), TokenKind::If) {
            self.advance();
            let cond = self.or_expr()?;
            self.expect(&TokenKind::Else)?;
            let orelse = self.ternary()?;
            Ok(Expr::Ternary {
                cond: Box::new(cond),
                body: Box::new(body),
                orelse: Box::new(orelse),
            })
        } else {
            Ok(body)
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParsingError> {
        let mut values = vec![self.and_expr()?];
        while matches!(self.peek(), TokenKind::Or) {
            self.advance();
            values.push(self.and_expr()?);
        }
        Ok(if values.len() == 1 {
            values.pop().unwrap()
        } else {
            Expr::BoolOp {
                op: BoolOp::Or,
                values,
            }
        })
    }

    fn and_expr(&mut self) -> Result<Expr, ParsingError> {
        let mut values = vec![self.not_expr()?];
        while matches!(self.peek(), TokenKind::And) {
            self.advance();
            values.push(self.not_expr()?);
        }
        Ok(if values.len() == 1 {
            values.pop().unwrap()
        } else {
            Expr::BoolOp {
                op: BoolOp::And,
                values,
            }
        })
    }

    fn not_expr(&mut self) -> Result<Expr, ParsingError> {
        if matches!(self.peek(), TokenKind::Not) {
            self.advance();
            Ok(Expr::Not(Box::new(self.not_expr()?)))
        } else {
            self.comparison()
        }
    }

    fn comparison(&mut self) -> Result<Expr, ParsingError> {
        let left = self.additive()?;

        // `is [not] None`
        if matches!(self.peek(), TokenKind::Is) {
            self.advance();
            let negated = if matches!(self.peek(), TokenKind::Not) {
                self.advance();
                true
            } else {
                false
            };
            self.expect(&TokenKind::None)?;
            return Ok(Expr::IsNone {
                expr: Box::new(left),
                negated,
            });
        }

        // `[not] in`
        if matches!(self.peek(), TokenKind::Not) {
            // lookahead for `not in`
            let save = self.pos;
            self.advance();
            if matches!(self.peek(), TokenKind::In) {
                self.advance();
                let right = self.additive()?;
                return Ok(Expr::In {
                    left: Box::new(left),
                    right: Box::new(right),
                    negated: true,
                });
            }
            self.pos = save;
        }
        if matches!(self.peek(), TokenKind::In) {
            self.advance();
            let right = self.additive()?;
            return Ok(Expr::In {
                left: Box::new(left),
                right: Box::new(right),
                negated: false,
            });
        }

        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        loop {
            let op = match self.peek() {
                TokenKind::Eq => CompareOp::Eq,
                TokenKind::NotEq => CompareOp::NotEq,
                TokenKind::Lt => CompareOp::Lt,
                TokenKind::LtEq => CompareOp::LtEq,
                TokenKind::Gt => CompareOp::Gt,
                TokenKind::GtEq => CompareOp::GtEq,
                _ => break,
            };
            self.advance();
            ops.push(op);
            comparators.push(self.additive()?);
        }
        if ops.is_empty() {
            Ok(left)
        } else {
            Ok(Expr::Compare {
                left: Box::new(left),
                ops,
                comparators,
            })
        }
    }

    fn additive(&mut self) -> Result<Expr, ParsingError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ParsingError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::DoubleSlash => BinaryOp::FloorDiv,
                TokenKind::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ParsingError> {
        match self.peek() {
            TokenKind::Minus => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(self.unary()?),
                })
            }
            TokenKind::Plus => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Pos,
                    expr: Box::new(self.unary()?),
                })
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ParsingError> {
        let base = self.postfix()?;
        if matches!(self.peek(), TokenKind::DoubleStar) {
            self.advance();
            // right-associative, binds tighter than unary minus on the RHS
            let exp = self.unary()?;
            Ok(Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exp),
            })
        } else {
            Ok(base)
        }
    }

    fn postfix(&mut self) -> Result<Expr, ParsingError> {
        let mut expr = self.atom()?;
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    let attr = match self.advance() {
                        TokenKind::Ident(name) => name,
                        other => return Err(self.err(format!("expected attribute name, found {other}"))),
                    };
                    expr = Expr::Attribute {
                        base: Box::new(expr),
                        attr,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    expr = self.subscript(expr)?;
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn subscript(&mut self, base: Expr) -> Result<Expr, ParsingError> {
        // either `[expr]` or a slice `[start?:stop?]`
        if matches!(self.peek(), TokenKind::Colon) {
            self.advance();
            let stop = if matches!(self.peek(), TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.ternary()?))
            };
            self.expect(&TokenKind::RBracket)?;
            return Ok(Expr::Slice {
                base: Box::new(base),
                start: None,
                stop,
            });
        }
        let first = self.ternary()?;
        if matches!(self.peek(), TokenKind::Colon) {
            self.advance();
            let stop = if matches!(self.peek(), TokenKind::RBracket) {
                None
            } else {
                Some(Box::new(self.ternary()?))
            };
            self.expect(&TokenKind::RBracket)?;
            Ok(Expr::Slice {
                base: Box::new(base),
                start: Some(Box::new(first)),
                stop,
            })
        } else {
            self.expect(&TokenKind::RBracket)?;
            Ok(Expr::Index {
                base: Box::new(base),
                index: Box::new(first),
            })
        }
    }

    fn atom(&mut self) -> Result<Expr, ParsingError> {
        match self.advance() {
            TokenKind::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            TokenKind::Float(f) => Ok(Expr::Literal(Value::Number(f))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Text(s))),
            TokenKind::FString(body) => self.parse_fstring(&body),
            TokenKind::True => Ok(Expr::Literal(Value::Boolean(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Boolean(false))),
            TokenKind::None => Ok(Expr::Literal(Value::None)),
            TokenKind::Ident(name) => {
                if matches!(self.peek(), TokenKind::LParen) {
                    self.advance();
                    let args = self.call_args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Identifier(name))
                }
            }
            TokenKind::LParen => {
                let inner = self.ternary()?;
                self.expect(&TokenKind::RParen)?;
                Ok(inner)
            }
            other => Err(self.err(format!("unexpected token {other}"))),
        }
    }

    fn call_args(&mut self) -> Result<Vec<Expr>, ParsingError> {
        let mut args = Vec::new();
        if matches!(self.peek(), TokenKind::RParen) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.ternary()?);
            match self.peek() {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::RParen => {
                    self.advance();
                    break;
                }
                other => return Err(self.err(format!("expected ',' or ')', found {other}"))),
            }
        }
        Ok(args)
    }

    /// f-strings split on `{` / `}`; everything outside braces is a text
    /// literal, everything inside is re-tokenized as a full expression.
    fn parse_fstring(&self, body: &str) -> Result<Expr, ParsingError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut chars = body.char_indices().peekable();
        while let Some((_, c)) = chars.next() {
            if c == '{' {
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }
                let mut depth = 1;
                let mut expr_src = String::new();
                for (_, c2) in chars.by_ref() {
                    if c2 == '{' {
                        depth += 1;
                        expr_src.push(c2);
                    } else if c2 == '}' {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                        expr_src.push(c2);
                    } else {
                        expr_src.push(c2);
                    }
                }
                if depth != 0 {
                    return Err(ParsingError {
                        message: "unterminated f-string expression".into(),
                        pos: 0,
                    });
                }
                let inner = parse(&expr_src)?;
                parts.push(FStringPart::Expr(inner));
            } else {
                literal.push(c);
            }
        }
        if !literal.is_empty() {
            parts.push(FStringPart::Literal(literal));
        }
        Ok(Expr::FString(parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_arithmetic() {
        let e = parse("p * r / 1000").unwrap();
        assert!(matches!(e, Expr::Binary { op: BinaryOp::Div, .. }));
    }

    #[test]
    fn parses_ternary_and_boolop() {
        let e = parse(
            "last_valid_changed is not None and minutes_between(last_valid_changed, now()) < 30",
        )
        .unwrap();
        assert!(matches!(e, Expr::BoolOp { op: BoolOp::And, .. }));
    }

    #[test]
    fn parses_chained_comparison() {
        let e = parse("0 <= x < 10").unwrap();
        match e {
            Expr::Compare { ops, comparators, .. } => {
                assert_eq!(ops.len(), 2);
                assert_eq!(comparators.len(), 2);
            }
            _ => panic!("expected Compare"),
        }
    }

    #[test]
    fn parses_membership_and_slicing() {
        let e = parse("name[1:] in allowed").unwrap();
        assert!(matches!(e, Expr::In { .. }));
    }

    #[test]
    fn parses_call_with_metadata() {
        let e = parse("metadata(state,'last_changed')").unwrap();
        match e {
            Expr::Call { name, args } => {
                assert_eq!(name, "metadata");
                assert_eq!(args.len(), 2);
            }
            _ => panic!("expected Call"),
        }
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("1 + 1 2").is_err());
    }
}
