//! Expression parsing: precedence climb
//!
//! One function per precedence tier, loosest first. Everything is
//! left-associative except the false branch of a conditional.

use super::literals::{decode_index, decode_string};
use super::Parser;
use crate::ast::{
    BinaryOp, CompareOp, CompositeLiteral, Expr, Label, LabeledValue, TypeTestOp,
};
use crate::error::ParseResult;
use crate::token::TokenKind;

impl<'a> Parser<'a> {
    /// Parse a full expression (tier 1: conditional)
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expr> {
        let truthy = self.parse_range()?;
        if !self.check(TokenKind::KwIf) {
            return Ok(truthy);
        }
        self.advance()?;
        let condition = self.parse_range()?;
        self.expect(TokenKind::KwElse, "'else'")?;
        // Right-associative in the false branch.
        let falsy = self.parse_expression()?;
        let span = truthy.span().merge(&falsy.span());
        Ok(Expr::Conditional {
            truthy: Box::new(truthy),
            condition: Box::new(condition),
            falsy: Box::new(falsy),
            span,
        })
    }

    /// Tier 2: range `..`
    fn parse_range(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(&[(TokenKind::DotDot, BinaryOp::Range)], Self::parse_concatenate)
    }

    /// Tier 3: concatenate `~`
    fn parse_concatenate(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[(TokenKind::Tilde, BinaryOp::Concatenate)],
            Self::parse_logical_or,
        )
    }

    /// Tier 4: logical `||`, then `^^`, then `&&`
    fn parse_logical_or(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[(TokenKind::PipePipe, BinaryOp::LogicalOr)],
            Self::parse_logical_xor,
        )
    }

    fn parse_logical_xor(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[(TokenKind::CaretCaret, BinaryOp::LogicalXor)],
            Self::parse_logical_and,
        )
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[(TokenKind::AmpAmp, BinaryOp::LogicalAnd)],
            Self::parse_bitwise_or,
        )
    }

    /// Tier 5: bitwise `|`, then `^`, then `&`
    fn parse_bitwise_or(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[(TokenKind::Pipe, BinaryOp::BitOr)],
            Self::parse_bitwise_xor,
        )
    }

    fn parse_bitwise_xor(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[(TokenKind::Caret, BinaryOp::BitXor)],
            Self::parse_bitwise_and,
        )
    }

    fn parse_bitwise_and(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(&[(TokenKind::Amp, BinaryOp::BitAnd)], Self::parse_compare)
    }

    /// Tier 6: comparison chain with an optional trailing type test
    fn parse_compare(&mut self) -> ParseResult<Expr> {
        let first = self.parse_shift()?;
        let mut comparisons = Vec::new();
        loop {
            let token = self.current()?;
            let Some(op) = compare_op(token.kind) else {
                break;
            };
            self.advance()?;
            comparisons.push((op, self.parse_shift()?));
        }
        let mut type_test = None;
        let token = self.current()?;
        if let Some(op) = type_test_op(token.kind) {
            self.advance()?;
            type_test = Some((op, Box::new(self.parse_shift()?)));
        }
        if comparisons.is_empty() && type_test.is_none() {
            return Ok(first);
        }
        let last_span = type_test
            .as_ref()
            .map(|(_, t)| t.span())
            .or_else(|| comparisons.last().map(|(_, e)| e.span()))
            .unwrap_or_else(|| first.span());
        let span = first.span().merge(&last_span);
        Ok(Expr::Compare {
            first: Box::new(first),
            comparisons,
            type_test,
            span,
        })
    }

    /// Tier 7: shift `<< >> >>>`
    fn parse_shift(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[
                (TokenKind::LtLt, BinaryOp::ShiftLeft),
                (TokenKind::GtGt, BinaryOp::ShiftRight),
                (TokenKind::GtGtGt, BinaryOp::ShiftRightUnsigned),
            ],
            Self::parse_add,
        )
    }

    /// Tier 8: add `+ -`
    fn parse_add(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Subtract),
            ],
            Self::parse_multiply,
        )
    }

    /// Tier 9: multiply `* / %`
    fn parse_multiply(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[
                (TokenKind::Star, BinaryOp::Multiply),
                (TokenKind::Slash, BinaryOp::Divide),
                (TokenKind::Percent, BinaryOp::Remainder),
            ],
            Self::parse_infix,
        )
    }

    /// Tier 10: named infix function call `lhs name rhs`
    fn parse_infix(&mut self) -> ParseResult<Expr> {
        let mut lhs = self.parse_exponent()?;
        while self.check(TokenKind::Identifier) {
            let name = self.advance()?;
            let rhs = self.parse_exponent()?;
            let span = lhs.span().merge(&rhs.span());
            lhs = Expr::Infix {
                name: name.text.to_string(),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    /// Tier 11: exponent `**` (left-associative)
    fn parse_exponent(&mut self) -> ParseResult<Expr> {
        self.parse_left_assoc(
            &[(TokenKind::StarStar, BinaryOp::Exponent)],
            Self::parse_unary,
        )
    }

    /// Tier 12: unary `+ - ! ~`
    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let token = self.current()?;
        let make = |operand: Expr| {
            let span = token.span.merge(&operand.span());
            (Box::new(operand), span)
        };
        match token.kind {
            TokenKind::Plus | TokenKind::Minus => {
                self.advance()?;
                let (operand, span) = make(self.parse_unary()?);
                Ok(Expr::Sign {
                    negative: token.kind == TokenKind::Minus,
                    operand,
                    span,
                })
            }
            TokenKind::Bang => {
                self.advance()?;
                let (operand, span) = make(self.parse_unary()?);
                Ok(Expr::LogicalNot { operand, span })
            }
            TokenKind::Tilde => {
                self.advance()?;
                let (operand, span) = make(self.parse_unary()?);
                Ok(Expr::BitwiseNot { operand, span })
            }
            _ => self.parse_access(),
        }
    }

    /// Tier 13: postfix access chain `.name`, `[index]`, `(args)`
    fn parse_access(&mut self) -> ParseResult<Expr> {
        let mut value = self.parse_atom()?;
        loop {
            let token = self.current()?;
            match token.kind {
                TokenKind::Dot => {
                    self.advance()?;
                    let name = self.expect(TokenKind::Identifier, "member name")?;
                    let span = value.span().merge(&name.span);
                    value = Expr::FieldAccess {
                        value: Box::new(value),
                        name: name.text.to_string(),
                        span,
                    };
                }
                TokenKind::LBracket => {
                    self.advance()?;
                    let index = if self.check(TokenKind::RBracket) {
                        None
                    } else {
                        Some(Box::new(self.parse_expression()?))
                    };
                    let close = self.expect(TokenKind::RBracket, "']'")?;
                    let span = value.span().merge(&close.span);
                    value = Expr::IndexAccess {
                        value: Box::new(value),
                        index,
                        span,
                    };
                }
                TokenKind::LParen => {
                    self.advance()?;
                    let mut args = Vec::new();
                    if !self.check(TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expression()?);
                            if self.check(TokenKind::Comma) {
                                self.advance()?;
                            } else {
                                break;
                            }
                        }
                    }
                    let close = self.expect(TokenKind::RParen, "')'")?;
                    let span = value.span().merge(&close.span);
                    value = Expr::Call {
                        value: Box::new(value),
                        args,
                        span,
                    };
                }
                _ => return Ok(value),
            }
        }
    }

    /// Tier 14/15: atoms and composite literals
    fn parse_atom(&mut self) -> ParseResult<Expr> {
        let token = self.current()?;
        match token.kind {
            TokenKind::IntegerLiteral => {
                self.advance()?;
                Ok(Expr::Integer {
                    text: token.text.to_string(),
                    span: token.span,
                })
            }
            TokenKind::FloatLiteral => {
                self.advance()?;
                Ok(Expr::Float {
                    text: token.text.to_string(),
                    span: token.span,
                })
            }
            TokenKind::StringLiteral => {
                self.advance()?;
                let value = decode_string(token.text, token.span.start)?;
                Ok(Expr::Str {
                    value,
                    span: token.span,
                })
            }
            TokenKind::True | TokenKind::False => {
                self.advance()?;
                Ok(Expr::Boolean {
                    value: token.kind == TokenKind::True,
                    span: token.span,
                })
            }
            TokenKind::Null => {
                self.advance()?;
                Ok(Expr::Null { span: token.span })
            }
            TokenKind::Identifier => {
                self.advance()?;
                if self.check(TokenKind::LBrace) {
                    let literal = self.parse_composite()?;
                    let span = token.span.merge(&literal.span);
                    return Ok(Expr::Initializer {
                        type_name: token.text.to_string(),
                        type_span: token.span,
                        literal,
                        span,
                    });
                }
                Ok(Expr::Name {
                    name: token.text.to_string(),
                    span: token.span,
                })
            }
            TokenKind::Dot => {
                self.advance()?;
                let name = self.expect(TokenKind::Identifier, "input field name")?;
                Ok(Expr::ContextField {
                    name: name.text.to_string(),
                    span: token.span.merge(&name.span),
                })
            }
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBrace => Ok(Expr::Composite(self.parse_composite()?)),
            _ => Err(self.unexpected(token, "an expression")),
        }
    }

    /// Parse a `{ ... }` composite literal with optional labels
    fn parse_composite(&mut self) -> ParseResult<CompositeLiteral> {
        let open = self.expect(TokenKind::LBrace, "'{'")?;
        let mut parts = Vec::new();
        if !self.check(TokenKind::RBrace) {
            loop {
                let label = self.try_parse_label()?;
                let value = self.parse_expression()?;
                parts.push(LabeledValue { label, value });
                if self.check(TokenKind::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        let close = self.expect(TokenKind::RBrace, "'}' or ','")?;
        Ok(CompositeLiteral {
            parts,
            span: open.span.merge(&close.span),
        })
    }

    /// Try to parse a `label:` prefix; backtracks when the `:` is absent
    fn try_parse_label(&mut self) -> ParseResult<Option<Label>> {
        let token = self.current()?;
        if !matches!(
            token.kind,
            TokenKind::Identifier | TokenKind::IntegerLiteral
        ) {
            return Ok(None);
        }
        self.tokens.save();
        self.advance()?;
        if !self.check(TokenKind::Colon) {
            self.tokens.restore();
            return Ok(None);
        }
        self.advance()?;
        self.tokens.discard();
        let label = match token.kind {
            TokenKind::Identifier if token.text == "other" => Label::Other { span: token.span },
            TokenKind::Identifier => Label::Name {
                name: token.text.to_string(),
                span: token.span,
            },
            _ => Label::Index {
                index: decode_index(token.text, token.span)?,
                span: token.span,
            },
        };
        Ok(Some(label))
    }

    /// Generic left-associative binary tier
    fn parse_left_assoc(
        &mut self,
        table: &[(TokenKind, BinaryOp)],
        next: fn(&mut Self) -> ParseResult<Expr>,
    ) -> ParseResult<Expr> {
        let mut lhs = next(self)?;
        'outer: loop {
            let token = self.current()?;
            for (kind, op) in table {
                if token.kind == *kind {
                    self.advance()?;
                    let rhs = next(self)?;
                    let span = lhs.span().merge(&rhs.span());
                    lhs = Expr::Binary {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        span,
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }
}

fn compare_op(kind: TokenKind) -> Option<CompareOp> {
    match kind {
        TokenKind::EqEqEq => Some(CompareOp::Identical),
        TokenKind::NotEqEq => Some(CompareOp::NotIdentical),
        TokenKind::EqEq => Some(CompareOp::Equal),
        TokenKind::NotEq => Some(CompareOp::NotEqual),
        TokenKind::Lt => Some(CompareOp::Less),
        TokenKind::Gt => Some(CompareOp::Greater),
        TokenKind::LtEq => Some(CompareOp::LessEqual),
        TokenKind::GtEq => Some(CompareOp::GreaterEqual),
        _ => None,
    }
}

fn type_test_op(kind: TokenKind) -> Option<TypeTestOp> {
    match kind {
        TokenKind::ColonColon => Some(TypeTestOp::Same),
        TokenKind::BangColon => Some(TypeTestOp::NotSame),
        TokenKind::Subtype => Some(TypeTestOp::Subtype),
        TokenKind::Supertype => Some(TypeTestOp::Supertype),
        TokenKind::ProperSubtype => Some(TypeTestOp::ProperSubtype),
        TokenKind::ProperSupertype => Some(TypeTestOp::ProperSupertype),
        TokenKind::TypeRelated => Some(TypeTestOp::Related),
        _ => None,
    }
}
