//! Turns a token stream into term trees.
//!
//! Binary operators are parsed by precedence climbing over
//! [`BinaryOp::precedence`]; `**` and the ternary are handled in their own
//! rules since both associate to the right.

use crate::config::Configuration;
use crate::errors::SyntaxError;
use crate::term::{BinaryOp, Call, Literal, PathStart, Segment, Term, UnaryOp};
use crate::tokenizer::{tokenize, Token, TokenKind};

/// Parses a comma separated list of expressions.
///
/// Function calls are checked against `config`'s registry here, so an
/// unknown name or a bad argument count is a [`SyntaxError`].
pub fn parse(source: &str, config: &Configuration) -> Result<Vec<Term>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut spaced = Vec::new();
    let mut after_ws = false;
    for token in tokenize(source)? {
        if token.kind == TokenKind::Whitespace {
            after_ws = true;
            continue;
        }
        tokens.push(token);
        spaced.push(after_ws);
        after_ws = false;
    }
    if tokens.is_empty() {
        return Err(SyntaxError::new("empty expression", source, 0));
    }
    let mut parser = Parser {
        source,
        tokens,
        spaced,
        pos: 0,
        config,
    };
    let terms = parser.parse_list()?;
    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(parser.error_at(
            token.offset,
            format!("expected end of expression, found {}", token.kind),
        ));
    }
    Ok(terms)
}

struct Parser<'s, 'c> {
    source: &'s str,
    tokens: Vec<Token<'s>>,
    /// Whether whitespace preceded the token at the same position.
    spaced: Vec<bool>,
    pos: usize,
    config: &'c Configuration,
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Or => BinaryOp::Or,
        TokenKind::And => BinaryOp::And,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::Ne => BinaryOp::Ne,
        TokenKind::EEq => BinaryOp::EEq,
        TokenKind::NEe => BinaryOp::NEe,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::BitOr => BinaryOp::BitOr,
        TokenKind::Caret => BinaryOp::BitXor,
        TokenKind::BitAnd => BinaryOp::BitAnd,
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Percent => BinaryOp::Mod,
        _ => return None,
    })
}

fn context_path(segments: Vec<Segment>) -> Term {
    Term::Path {
        start: PathStart::Context,
        segments,
    }
}

impl<'s, 'c> Parser<'s, 'c> {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn peek_nth(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.len(), |t| t.offset)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(message, self.source, offset)
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        let found = match self.peek() {
            Some(kind) => kind.to_string(),
            None => "end of expression".to_string(),
        };
        self.error_at(self.offset(), format!("expected {expected}, found {found}"))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), SyntaxError> {
        if self.eat(&kind) {
            Ok(())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    /// True when the next token touches the previous one.
    fn attached(&self) -> bool {
        self.pos < self.tokens.len() && !self.spaced[self.pos]
    }

    fn parse_list(&mut self) -> Result<Vec<Term>, SyntaxError> {
        let mut terms = vec![self.parse_expr()?];
        while self.eat(&TokenKind::Comma) {
            terms.push(self.parse_expr()?);
        }
        Ok(terms)
    }

    fn parse_expr(&mut self) -> Result<Term, SyntaxError> {
        let test = self.parse_binary(1)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let then = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        let otherwise = self.parse_expr()?;
        Ok(Term::Ternary {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Term, SyntaxError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.peek().and_then(binary_op) {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            self.pos += 1;
            let rhs = self.parse_binary(prec + 1)?;
            lhs = Term::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Term, SyntaxError> {
        let op = match self.peek() {
            Some(TokenKind::Bang) => UnaryOp::Not,
            Some(TokenKind::Minus) => UnaryOp::Neg,
            _ => return self.parse_power(),
        };
        self.pos += 1;
        let operand = self.parse_unary()?;
        Ok(match (op, operand) {
            (UnaryOp::Neg, Term::Literal(Literal::Integer(i))) => match i.checked_neg() {
                Some(n) => Term::Literal(Literal::Integer(n)),
                None => Term::Literal(Literal::Real(-(i as f64))),
            },
            (UnaryOp::Neg, Term::Literal(Literal::Real(r))) => Term::Literal(Literal::Real(-r)),
            (op, operand) => Term::Unary {
                op,
                operand: Box::new(operand),
            },
        })
    }

    fn parse_power(&mut self) -> Result<Term, SyntaxError> {
        let base = self.parse_postfix()?;
        if !self.eat(&TokenKind::StarStar) {
            return Ok(base);
        }
        let exponent = self.parse_unary()?;
        Ok(Term::Binary {
            op: BinaryOp::Pow,
            lhs: Box::new(base),
            rhs: Box::new(exponent),
        })
    }

    fn parse_postfix(&mut self) -> Result<Term, SyntaxError> {
        let primary = self.parse_primary()?;
        let mut segments = Vec::new();
        while self.attached() {
            match self.parse_segment()? {
                Some(segment) => segments.push(segment),
                None => break,
            }
        }
        if segments.is_empty() {
            return Ok(primary);
        }
        Ok(match primary {
            Term::Path {
                start,
                segments: mut head,
            } => {
                head.extend(segments);
                Term::Path {
                    start,
                    segments: head,
                }
            }
            other => Term::Path {
                start: PathStart::Term(Box::new(other)),
                segments,
            },
        })
    }

    fn parse_primary(&mut self) -> Result<Term, SyntaxError> {
        let Some(kind) = self.peek().cloned() else {
            return Err(self.unexpected("an expression"));
        };
        let offset = self.offset();
        let term = match kind {
            TokenKind::Str(s) => Term::Literal(Literal::Str(s)),
            TokenKind::Integer(i) => Term::Literal(Literal::Integer(i)),
            TokenKind::Real(r) => Term::Literal(Literal::Real(r)),
            TokenKind::Name(name) => match name.as_str() {
                "true" => Term::Literal(Literal::Bool(true)),
                "false" => Term::Literal(Literal::Bool(false)),
                "null" => Term::Literal(Literal::Null),
                _ => context_path(vec![Segment::Child(name)]),
            },
            TokenKind::Dollar => Term::Path {
                start: PathStart::Root,
                segments: Vec::new(),
            },
            TokenKind::At => Term::Path {
                start: PathStart::Current,
                segments: Vec::new(),
            },
            TokenKind::Star => context_path(vec![Segment::Wildcard]),
            TokenKind::Dot | TokenKind::DotDot | TokenKind::DotDotStar | TokenKind::LBracket => {
                let segment = self
                    .parse_segment()?
                    .ok_or_else(|| self.unexpected("a path"))?;
                return Ok(context_path(vec![segment]));
            }
            TokenKind::Function(name) => {
                self.pos += 1;
                return Ok(Term::Call(self.parse_call(name, offset)?));
            }
            TokenKind::LParen => {
                self.pos += 1;
                let mut terms = self.parse_list()?;
                self.expect(TokenKind::RParen)?;
                return Ok(if terms.len() == 1 {
                    terms.remove(0)
                } else {
                    Term::List(terms)
                });
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.pos += 1;
        Ok(term)
    }

    /// Called with the position just past `name(`.
    fn parse_call(&mut self, name: String, offset: usize) -> Result<Call, SyntaxError> {
        let args = if self.eat(&TokenKind::RParen) {
            Vec::new()
        } else {
            let args = self.parse_list()?;
            self.expect(TokenKind::RParen)?;
            args
        };
        let function = self
            .config
            .functions()
            .get(&name)
            .ok_or_else(|| self.error_at(offset, format!("unknown function `{name}`")))?;
        function
            .verify(&name, &args)
            .map_err(|message| self.error_at(offset, message))?;
        Ok(Call { name, args })
    }

    /// Parses one segment, or returns `None` when the next token cannot
    /// continue a path.
    fn parse_segment(&mut self) -> Result<Option<Segment>, SyntaxError> {
        let segment = match self.peek() {
            Some(TokenKind::Dot) => {
                self.pos += 1;
                self.parse_dotted()?
            }
            Some(TokenKind::DotDot) => {
                self.pos += 1;
                match self.peek() {
                    Some(TokenKind::Star) => {
                        self.pos += 1;
                        Segment::RecursiveWildcard
                    }
                    Some(TokenKind::LBracket) => {
                        self.pos += 1;
                        Segment::Recursive(Box::new(self.parse_bracket()?))
                    }
                    _ => Segment::Recursive(Box::new(self.parse_dotted()?)),
                }
            }
            Some(TokenKind::DotDotStar) => {
                self.pos += 1;
                Segment::RecursiveWildcard
            }
            Some(TokenKind::LBracket) => {
                self.pos += 1;
                self.parse_bracket()?
            }
            _ => return Ok(None),
        };
        Ok(Some(segment))
    }

    /// The selector after `.` or `..`.
    fn parse_dotted(&mut self) -> Result<Segment, SyntaxError> {
        let offset = self.offset();
        match self.peek().cloned() {
            Some(TokenKind::Name(name) | TokenKind::Str(name)) => {
                self.pos += 1;
                Ok(Segment::Child(name))
            }
            Some(TokenKind::Star) => {
                self.pos += 1;
                Ok(Segment::Wildcard)
            }
            Some(TokenKind::Integer(i)) => {
                self.pos += 1;
                Ok(Segment::Index(i))
            }
            Some(TokenKind::Function(name)) => {
                self.pos += 1;
                Ok(Segment::Call(self.parse_call(name, offset)?))
            }
            _ => Err(self.unexpected("a name after `.`")),
        }
    }

    /// The inside of `[...]`, with the opening bracket already consumed.
    fn parse_bracket(&mut self) -> Result<Segment, SyntaxError> {
        let closes = self.peek_nth(1) == Some(&TokenKind::RBracket);
        let segment = match self.peek().cloned() {
            Some(TokenKind::Star) if closes => {
                self.pos += 1;
                Segment::AnyIndex
            }
            Some(TokenKind::Integer(i)) if closes => {
                self.pos += 1;
                Segment::Index(i)
            }
            Some(TokenKind::Str(key)) if closes => {
                self.pos += 1;
                Segment::Child(key)
            }
            Some(TokenKind::Question) => {
                self.pos += 1;
                Segment::Filter(Box::new(self.parse_expr()?))
            }
            _ => match self.try_slice()? {
                Some(slice) => slice,
                None => {
                    let term = self.parse_expr()?;
                    match term {
                        Term::Literal(Literal::Integer(i)) => Segment::Index(i),
                        Term::Literal(Literal::Str(key)) => Segment::Child(key),
                        other => Segment::Predicate(Box::new(other)),
                    }
                }
            },
        };
        self.expect(TokenKind::RBracket)?;
        Ok(segment)
    }

    fn signed_integer(&mut self) -> Option<i64> {
        let (value, width) = match (self.peek(), self.peek_nth(1)) {
            (Some(TokenKind::Integer(i)), _) => (*i, 1),
            (Some(TokenKind::Minus), Some(TokenKind::Integer(i))) => (i.checked_neg()?, 2),
            _ => return None,
        };
        self.pos += width;
        Some(value)
    }

    /// `start? ':' end? (':' step?)?`. Rewinds and returns `None` if the
    /// bracket does not hold a slice.
    fn try_slice(&mut self) -> Result<Option<Segment>, SyntaxError> {
        let mark = self.pos;
        let start = self.signed_integer();
        if !self.eat(&TokenKind::Colon) {
            self.pos = mark;
            return Ok(None);
        }
        let end = self.signed_integer();
        let step = if self.eat(&TokenKind::Colon) {
            self.signed_integer()
        } else {
            None
        };
        if step == Some(0) {
            return Err(self.error_at(self.tokens[mark].offset, "slice step cannot be zero"));
        }
        if self.peek() != Some(&TokenKind::RBracket) {
            return Err(self.unexpected("`]` to close the slice"));
        }
        Ok(Some(Segment::Slice { start, end, step }))
    }
}
