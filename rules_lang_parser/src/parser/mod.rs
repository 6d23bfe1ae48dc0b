//! Recursive descent parser for RulesLang
//!
//! Expressions use a precedence climb, one function per tier (see
//! `expressions.rs`). Statements are indentation-sensitive: every block depth
//! has an [`IndentSpec`] — the whitespace character and count each statement
//! at that depth must match exactly. Bounded backtracking goes through the
//! tokenizer's save/discard/restore protocol.

mod expressions;
pub mod literals;
mod statements;

use crate::ast::{Expr, Stmt};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Tokenizer;
use crate::source::SourceText;
use crate::token::{Token, TokenKind};

/// The indentation contract of one block depth
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndentSpec {
    /// The whitespace character every indent at this depth is made of
    pub ch: char,
    /// How many of them
    pub count: usize,
}

impl IndentSpec {
    /// The top level: no indentation
    pub fn none() -> Self {
        Self { ch: ' ', count: 0 }
    }
}

/// RulesLang parser
pub struct Parser<'a> {
    pub(crate) tokens: Tokenizer<'a>,
    /// Set after a terminator so a same-line statement (after `;`) skips
    /// indentation validation once; cleared by the next indentation token
    pub(crate) next_indent_ignored: bool,
}

impl std::fmt::Debug for Parser<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser").finish_non_exhaustive()
    }
}

impl<'a> Parser<'a> {
    /// Create a new parser over a normalized source text
    pub fn new(source: &'a SourceText) -> Self {
        Self {
            tokens: Tokenizer::new(source),
            next_indent_ignored: false,
        }
    }

    /// Parse a whole program (the top level has no indentation)
    pub fn parse_program(mut self) -> ParseResult<Vec<Stmt>> {
        self.parse_statements(IndentSpec::none(), true)
    }

    /// Parse a single expression (the shell's expression mode)
    pub fn parse_expression_input(mut self) -> ParseResult<Expr> {
        self.skip_layout()?;
        let expr = self.parse_expression()?;
        self.skip_layout()?;
        let token = self.current()?;
        if token.kind != TokenKind::Eof {
            return Err(self.unexpected(token, "end of input"));
        }
        Ok(expr)
    }

    // ==================== Token management ====================

    /// Peek at the current token
    pub(crate) fn current(&mut self) -> ParseResult<Token<'a>> {
        self.tokens.head()
    }

    /// Consume and return the current token
    pub(crate) fn advance(&mut self) -> ParseResult<Token<'a>> {
        self.tokens.advance()
    }

    /// Check if the current token matches
    pub(crate) fn check(&mut self, kind: TokenKind) -> bool {
        self.tokens
            .head()
            .map(|t| t.kind == kind)
            .unwrap_or(false)
    }

    /// Consume the current token if it matches, error otherwise
    pub(crate) fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token<'a>> {
        let token = self.current()?;
        if token.kind == kind {
            self.advance()
        } else {
            Err(self.unexpected(token, expected))
        }
    }

    /// Build an unexpected-token error for the given token
    pub(crate) fn unexpected(&self, token: Token<'a>, expected: &str) -> ParseError {
        if token.kind == TokenKind::Eof {
            ParseError::unexpected_eof(expected, token.span)
        } else {
            ParseError::unexpected_token(
                format!("'{}'", token.text),
                expected.to_string(),
                token.span,
            )
        }
    }

    // ==================== Indentation handling ====================

    /// Consume indentation and terminator tokens, returning the last
    /// indentation seen before a real token. A terminator sets
    /// `next_indent_ignored`; an indentation clears it again, so the flag
    /// survives only for a same-line statement after `;`.
    pub(crate) fn skip_layout(&mut self) -> ParseResult<Option<Token<'a>>> {
        let mut last = None;
        loop {
            let token = self.current()?;
            match token.kind {
                TokenKind::Indentation => {
                    last = Some(token);
                    self.next_indent_ignored = false;
                    self.advance()?;
                }
                TokenKind::Terminator => {
                    self.next_indent_ignored = true;
                    self.advance()?;
                }
                _ => return Ok(last),
            }
        }
    }

    /// Check an indentation token against a spec. Uniformity violations are
    /// hard errors; a char or count mismatch is merely "does not validate"
    /// (the block may simply end there).
    pub(crate) fn indent_validates(
        &self,
        token: Token<'a>,
        spec: IndentSpec,
    ) -> ParseResult<bool> {
        if token.text.is_empty() {
            return Ok(spec.count == 0);
        }
        let ch = token.text.chars().next().unwrap_or(' ');
        if !token.text.chars().all(|c| c == ch) {
            return Err(ParseError::MixedIndentation { span: token.span });
        }
        let count = token.text.chars().count();
        Ok(spec.count > 0 && ch == spec.ch && count == spec.count)
    }

    /// Parse the statements of one block depth. `top_level` blocks never
    /// end on an indentation mismatch; they report it.
    pub(crate) fn parse_statements(
        &mut self,
        spec: IndentSpec,
        top_level: bool,
    ) -> ParseResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            self.tokens.save();
            let flag_before = self.next_indent_ignored;
            let last_indent = self.skip_layout()?;
            let token = self.current()?;

            if token.kind == TokenKind::Eof {
                self.tokens.discard();
                break;
            }

            let valid = match last_indent {
                Some(indent) => self.indent_validates(indent, spec)?,
                None => self.next_indent_ignored,
            };

            if valid {
                self.tokens.discard();
                self.next_indent_ignored = false;
                stmts.push(self.parse_statement(spec)?);
                let follower = self.current()?;
                if !follower.kind.ends_statement() {
                    return Err(self.unexpected(follower, "end of statement"));
                }
            } else if !top_level && !stmts.is_empty() {
                self.tokens.restore();
                self.next_indent_ignored = flag_before;
                break;
            } else {
                let (found, span) = match last_indent {
                    Some(indent) => (indent.text.to_string(), indent.span),
                    None => (token.text.to_string(), token.span),
                };
                return Err(ParseError::IndentationMismatch {
                    expected_count: spec.count,
                    expected_char: spec.ch,
                    found,
                    span,
                });
            }
        }
        Ok(stmts)
    }

    /// Compute the `IndentSpec` of a new block from the first non-blank
    /// indentation following its header, without consuming anything.
    pub(crate) fn peek_block_spec(&mut self, outer: IndentSpec) -> ParseResult<IndentSpec> {
        self.tokens.save();
        let result = self.peek_block_spec_inner(outer);
        self.tokens.restore();
        result
    }

    fn peek_block_spec_inner(&mut self, outer: IndentSpec) -> ParseResult<IndentSpec> {
        loop {
            let token = self.current()?;
            match token.kind {
                TokenKind::Terminator => {
                    self.advance()?;
                }
                TokenKind::Indentation => {
                    let indent = self.advance()?;
                    if self.check(TokenKind::Terminator) {
                        // Blank line; keep scanning.
                        continue;
                    }
                    return self.block_spec_from(indent, outer);
                }
                TokenKind::Eof => {
                    return Err(ParseError::NotEnoughIndentation { span: token.span });
                }
                _ => {
                    // A statement on the header's own line after `;`.
                    return Err(ParseError::NotEnoughIndentation { span: token.span });
                }
            }
        }
    }

    fn block_spec_from(&self, indent: Token<'a>, outer: IndentSpec) -> ParseResult<IndentSpec> {
        let Some(ch) = indent.text.chars().next() else {
            return Err(ParseError::NotEnoughIndentation { span: indent.span });
        };
        if !indent.text.chars().all(|c| c == ch) {
            return Err(ParseError::MixedIndentation { span: indent.span });
        }
        if outer.count > 0 && ch != outer.ch {
            return Err(ParseError::MixedIndentation { span: indent.span });
        }
        let count = indent.text.chars().count();
        if count <= outer.count {
            return Err(ParseError::NotEnoughIndentation { span: indent.span });
        }
        Ok(IndentSpec { ch, count })
    }

    /// Parse an indented block after its header's `:` has been consumed
    pub(crate) fn parse_block(&mut self, outer: IndentSpec) -> ParseResult<Vec<Stmt>> {
        let token = self.current()?;
        if token.kind != TokenKind::Terminator {
            return Err(self.unexpected(token, "end of line after ':'"));
        }
        let inner = self.peek_block_spec(outer)?;
        self.parse_statements(inner, false)
    }

}

/// Parse a program from source text
pub fn parse(source: &SourceText) -> ParseResult<Vec<Stmt>> {
    Parser::new(source).parse_program()
}

/// Parse a single expression from source text
pub fn parse_expression(source: &SourceText) -> ParseResult<Expr> {
    Parser::new(source).parse_expression_input()
}
