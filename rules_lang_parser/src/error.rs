//! Parse error types

use crate::span::Span;
use thiserror::Error;

/// Error produced by the tokenizer or parser.
///
/// Every variant carries the span of the offending token; the offender
/// lexeme (when there is one) is exposed through [`ParseError::offender`]
/// for the source-context error printer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Unexpected token
    #[error("Unexpected {found}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: String,
        span: Span,
    },

    /// Unexpected end of input
    #[error("Unexpected end of source, expected {expected}")]
    UnexpectedEof { expected: String, span: Span },

    /// Unterminated string literal
    #[error("Unterminated string literal")]
    UnterminatedString { span: Span },

    /// Unrecognized character sequence
    #[error("Unrecognized token")]
    UnrecognizedToken { found: String, span: Span },

    /// Invalid escape sequence inside a string literal
    #[error("Invalid escape sequence '{sequence}'")]
    InvalidEscape { sequence: String, span: Span },

    /// Invalid numeric literal
    #[error("Invalid number literal '{literal}'")]
    InvalidNumber { literal: String, span: Span },

    /// An indentation run mixes different whitespace characters, or a block
    /// indents with a character differing from its enclosing block's
    #[error("Mixed indentation")]
    MixedIndentation { span: Span },

    /// A block header was not followed by a more-deeply indented line
    #[error("Not enough indentation")]
    NotEnoughIndentation { span: Span },

    /// A statement's indentation does not match its block's IndentSpec
    #[error("Expected {expected_count} of {expected_char:?}")]
    IndentationMismatch {
        expected_count: usize,
        expected_char: char,
        found: String,
        span: Span,
    },

    /// Invalid syntax with a free-form message
    #[error("{message}")]
    InvalidSyntax { message: String, span: Span },
}

impl ParseError {
    /// Get the span of the error
    pub fn span(&self) -> Span {
        match self {
            ParseError::UnexpectedToken { span, .. } => *span,
            ParseError::UnexpectedEof { span, .. } => *span,
            ParseError::UnterminatedString { span } => *span,
            ParseError::UnrecognizedToken { span, .. } => *span,
            ParseError::InvalidEscape { span, .. } => *span,
            ParseError::InvalidNumber { span, .. } => *span,
            ParseError::MixedIndentation { span } => *span,
            ParseError::NotEnoughIndentation { span } => *span,
            ParseError::IndentationMismatch { span, .. } => *span,
            ParseError::InvalidSyntax { span, .. } => *span,
        }
    }

    /// The offending lexeme, when the error has one
    pub fn offender(&self) -> Option<&str> {
        match self {
            ParseError::UnexpectedToken { found, .. } => Some(found),
            ParseError::UnrecognizedToken { found, .. } => Some(found),
            ParseError::InvalidEscape { sequence, .. } => Some(sequence),
            ParseError::InvalidNumber { literal, .. } => Some(literal),
            ParseError::IndentationMismatch { found, .. } => Some(found),
            _ => None,
        }
    }

    /// Create an unexpected token error
    pub fn unexpected_token(
        found: impl Into<String>,
        expected: impl Into<String>,
        span: Span,
    ) -> Self {
        ParseError::UnexpectedToken {
            found: found.into(),
            expected: expected.into(),
            span,
        }
    }

    /// Create an unexpected EOF error
    pub fn unexpected_eof(expected: impl Into<String>, span: Span) -> Self {
        ParseError::UnexpectedEof {
            expected: expected.into(),
            span,
        }
    }

    /// Create an invalid syntax error
    pub fn invalid_syntax(message: impl Into<String>, span: Span) -> Self {
        ParseError::InvalidSyntax {
            message: message.into(),
            span,
        }
    }
}

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_token() {
        let span = Span::new(0, 5);
        let err = ParseError::unexpected_token("'foo'", "identifier", span);

        assert_eq!(err.span(), span);
        assert_eq!(err.offender(), Some("'foo'"));
        assert!(err.to_string().contains("identifier"));
    }

    #[test]
    fn test_indentation_messages() {
        let span = Span::new(0, 2);
        let err = ParseError::IndentationMismatch {
            expected_count: 2,
            expected_char: ' ',
            found: "\t".to_string(),
            span,
        };
        assert_eq!(err.to_string(), "Expected 2 of ' '");

        let err = ParseError::NotEnoughIndentation { span };
        assert_eq!(err.to_string(), "Not enough indentation");
    }
}
