//! Statement parsing
//!
//! Statement dispatch keys on the leading token. Block headers (`if`,
//! `while`, `func`, `elif`, `else`) end in `:` and are followed by an
//! indented block; `parse_block` in the parser core owns the IndentSpec
//! protocol. The `let`/`var` type-then-name ambiguity and the `Label: while`
//! prefix are resolved with tokenizer save/restore.

use super::{IndentSpec, Parser};
use crate::ast::{BinaryOp, ConditionBlock, DeclKind, Expr, Parameter, Stmt};
use crate::error::{ParseError, ParseResult};
use crate::token::TokenKind;

impl<'a> Parser<'a> {
    /// Parse one statement at the given block depth
    pub(crate) fn parse_statement(&mut self, spec: IndentSpec) -> ParseResult<Stmt> {
        let token = self.current()?;
        match token.kind {
            TokenKind::KwDef => self.parse_type_definition(),
            TokenKind::KwLet => self.parse_variable_declaration(DeclKind::Let),
            TokenKind::KwVar => self.parse_variable_declaration(DeclKind::Var),
            TokenKind::KwIf => self.parse_conditional_statement(spec),
            TokenKind::KwWhile => self.parse_loop(None, spec),
            TokenKind::KwFunc => self.parse_function_definition(spec),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwBreak => {
                self.advance()?;
                let label = self.parse_optional_label()?;
                Ok(Stmt::Break {
                    label,
                    span: token.span,
                })
            }
            TokenKind::KwContinue => {
                self.advance()?;
                let label = self.parse_optional_label()?;
                Ok(Stmt::Continue {
                    label,
                    span: token.span,
                })
            }
            TokenKind::Identifier => {
                if let Some(label) = self.try_parse_loop_label()? {
                    self.parse_loop(Some(label), spec)
                } else {
                    self.parse_expression_statement()
                }
            }
            _ => self.parse_expression_statement(),
        }
    }

    /// `def Name: type`
    fn parse_type_definition(&mut self) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::KwDef, "'def'")?;
        let name = self.expect(TokenKind::Identifier, "type name")?;
        self.expect(TokenKind::Colon, "':'")?;
        let ty = self.parse_expression()?;
        let span = keyword.span.merge(&ty.span());
        Ok(Stmt::TypeDefinition {
            name: name.text.to_string(),
            ty,
            span,
        })
    }

    /// `let`/`var` with the type-then-name backtracking protocol
    fn parse_variable_declaration(&mut self, kind: DeclKind) -> ParseResult<Stmt> {
        let keyword = self.advance()?;

        // Try `Type name`; when the second identifier is absent the first
        // one was the variable name all along.
        self.tokens.save();
        let first = self.expect(TokenKind::Identifier, "variable name")?;
        let (type_name, name) = if self.check(TokenKind::Identifier) {
            self.tokens.discard();
            let name = self.advance()?;
            (Some((first.text.to_string(), first.span)), name)
        } else {
            self.tokens.restore();
            let name = self.expect(TokenKind::Identifier, "variable name")?;
            (None, name)
        };

        let mut span = keyword.span.merge(&name.span);
        let value = if self.check(TokenKind::Eq) {
            self.advance()?;
            let value = self.parse_expression()?;
            span = span.merge(&value.span());
            Some(value)
        } else {
            None
        };

        Ok(Stmt::VariableDeclaration {
            kind,
            type_name,
            name: name.text.to_string(),
            value,
            span,
        })
    }

    /// `if cond:` block, any number of `elif cond:` blocks, optional `else:`
    fn parse_conditional_statement(&mut self, spec: IndentSpec) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::KwIf, "'if'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        let statements = self.parse_block(spec)?;
        let mut span = keyword.span;
        if let Some(last) = statements.last() {
            span = span.merge(&last.span());
        }
        let mut blocks = vec![ConditionBlock {
            condition,
            statements,
            span,
        }];
        let mut false_statements = Vec::new();

        loop {
            // `elif`/`else` must sit at the chain's own indentation; probe
            // with save/restore so a non-matching line is left untouched.
            self.tokens.save();
            let flag_before = self.next_indent_ignored;
            let last_indent = self.skip_layout()?;
            let token = self.current()?;
            let aligned = match last_indent {
                Some(indent) => self.indent_validates(indent, spec)?,
                None => self.next_indent_ignored,
            };

            if aligned && token.kind == TokenKind::KwElif {
                self.tokens.discard();
                self.next_indent_ignored = false;
                let keyword = self.advance()?;
                let condition = self.parse_expression()?;
                self.expect(TokenKind::Colon, "':'")?;
                let statements = self.parse_block(spec)?;
                let mut span = keyword.span;
                if let Some(last) = statements.last() {
                    span = span.merge(&last.span());
                }
                blocks.push(ConditionBlock {
                    condition,
                    statements,
                    span,
                });
            } else if aligned && token.kind == TokenKind::KwElse {
                self.tokens.discard();
                self.next_indent_ignored = false;
                self.advance()?;
                self.expect(TokenKind::Colon, "':'")?;
                false_statements = self.parse_block(spec)?;
                break;
            } else {
                self.tokens.restore();
                self.next_indent_ignored = flag_before;
                break;
            }
        }

        let mut span = keyword.span.merge(&blocks.last().map(|b| b.span).unwrap_or(keyword.span));
        if let Some(last) = false_statements.last() {
            span = span.merge(&last.span());
        }
        Ok(Stmt::Conditional {
            blocks,
            false_statements,
            span,
        })
    }

    /// `while cond:` block, possibly labeled
    fn parse_loop(&mut self, label: Option<String>, spec: IndentSpec) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::KwWhile, "'while'")?;
        let condition = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block(spec)?;
        let mut span = keyword.span;
        if let Some(last) = body.last() {
            span = span.merge(&last.span());
        }
        Ok(Stmt::Loop {
            label,
            condition,
            body,
            span,
        })
    }

    /// `func name(Type a, Type b) [Return]:` block
    fn parse_function_definition(&mut self, spec: IndentSpec) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::KwFunc, "'func'")?;
        let name = self.expect(TokenKind::Identifier, "function name")?;
        self.expect(TokenKind::LParen, "'('")?;

        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                let ty = self.expect(TokenKind::Identifier, "parameter type")?;
                let pname = self.expect(TokenKind::Identifier, "parameter name")?;
                params.push(Parameter {
                    type_name: ty.text.to_string(),
                    type_span: ty.span,
                    name: pname.text.to_string(),
                    span: ty.span.merge(&pname.span),
                });
                if self.check(TokenKind::Comma) {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;

        let return_type = if self.check(TokenKind::Identifier) {
            let ty = self.advance()?;
            Some((ty.text.to_string(), ty.span))
        } else {
            None
        };

        self.expect(TokenKind::Colon, "':'")?;
        let body = self.parse_block(spec)?;
        let mut span = keyword.span;
        if let Some(last) = body.last() {
            span = span.merge(&last.span());
        }
        Ok(Stmt::FunctionDefinition {
            name: name.text.to_string(),
            params,
            return_type,
            body,
            span,
        })
    }

    /// `return [value]`
    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::KwReturn, "'return'")?;
        let token = self.current()?;
        if token.kind.ends_statement() {
            return Ok(Stmt::Return {
                value: None,
                span: keyword.span,
            });
        }
        let value = self.parse_expression()?;
        let span = keyword.span.merge(&value.span());
        Ok(Stmt::Return {
            value: Some(value),
            span,
        })
    }

    /// The optional loop label of `break`/`continue`
    fn parse_optional_label(&mut self) -> ParseResult<Option<String>> {
        if self.check(TokenKind::Identifier) {
            let label = self.advance()?;
            Ok(Some(label.text.to_string()))
        } else {
            Ok(None)
        }
    }

    /// Probe for a `Label: while` prefix; restores on mismatch
    fn try_parse_loop_label(&mut self) -> ParseResult<Option<String>> {
        self.tokens.save();
        let name = self.advance()?;
        if self.check(TokenKind::Colon) {
            self.advance()?;
            if self.check(TokenKind::KwWhile) {
                self.tokens.discard();
                return Ok(Some(name.text.to_string()));
            }
        }
        self.tokens.restore();
        Ok(None)
    }

    /// An assignment or a function call in statement position
    fn parse_expression_statement(&mut self) -> ParseResult<Stmt> {
        let target = self.parse_expression()?;
        let token = self.current()?;

        if token.kind == TokenKind::Eq || token.kind.is_compound_assignment() {
            self.advance()?;
            let value = self.parse_expression()?;
            let span = target.span().merge(&value.span());
            return Ok(Stmt::Assignment {
                target,
                op: compound_op(token.kind).map(|op| (op, token.span)),
                value,
                span,
            });
        }

        if matches!(target, Expr::Call { .. }) {
            let span = target.span();
            return Ok(Stmt::CallStatement { call: target, span });
        }

        Err(ParseError::invalid_syntax(
            "Expected a statement",
            target.span(),
        ))
    }
}

/// Map a compound assignment token to the operator it applies
fn compound_op(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::StarStarEq => Some(BinaryOp::Exponent),
        TokenKind::StarEq => Some(BinaryOp::Multiply),
        TokenKind::SlashEq => Some(BinaryOp::Divide),
        TokenKind::PercentEq => Some(BinaryOp::Remainder),
        TokenKind::PlusEq => Some(BinaryOp::Add),
        TokenKind::MinusEq => Some(BinaryOp::Subtract),
        TokenKind::LtLtEq => Some(BinaryOp::ShiftLeft),
        TokenKind::GtGtEq => Some(BinaryOp::ShiftRight),
        TokenKind::GtGtGtEq => Some(BinaryOp::ShiftRightUnsigned),
        TokenKind::AmpEq => Some(BinaryOp::BitAnd),
        TokenKind::CaretEq => Some(BinaryOp::BitXor),
        TokenKind::PipeEq => Some(BinaryOp::BitOr),
        TokenKind::AmpAmpEq => Some(BinaryOp::LogicalAnd),
        TokenKind::CaretCaretEq => Some(BinaryOp::LogicalXor),
        TokenKind::PipePipeEq => Some(BinaryOp::LogicalOr),
        TokenKind::TildeEq => Some(BinaryOp::Concatenate),
        _ => None,
    }
}
