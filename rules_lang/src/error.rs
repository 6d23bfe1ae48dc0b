//! Unified source-position errors and the error printer
//!
//! Every pass reports failures as a [`SourceError`]: a message, an optional
//! offender lexeme, and the span of the offending source. The printer
//! renders:
//!
//! ```text
//! Error: "<msg>" [caused by '<offender>'] at line: <L>, index: <S> [to <E>] in
//! <line-source>
//! <padding>^~~~~
//! ```
//!
//! The padding mirrors the offending line's leading tabs with tabs so the
//! marker lines up under any tab width.

use thiserror::Error;

use rules_lang_parser::error::ParseError;
use rules_lang_parser::source::SourceText;
use rules_lang_parser::span::Span;

/// Which pass produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPhase {
    Parse,
    Semantic,
    Runtime,
}

/// A source-located error from any pass
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct SourceError {
    pub message: String,
    pub offender: Option<String>,
    pub span: Span,
    pub phase: ErrorPhase,
    /// A feature the evaluator does not support yet; the shell reports it
    /// as "value not implemented" instead of failing the session
    pub not_implemented: bool,
}

impl SourceError {
    /// Create a semantic-phase error
    pub fn semantic(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            offender: None,
            span,
            phase: ErrorPhase::Semantic,
            not_implemented: false,
        }
    }

    /// Create a semantic-phase error with an offender lexeme
    pub fn semantic_with_offender(
        message: impl Into<String>,
        offender: impl Into<String>,
        span: Span,
    ) -> Self {
        Self {
            message: message.into(),
            offender: Some(offender.into()),
            span,
            phase: ErrorPhase::Semantic,
            not_implemented: false,
        }
    }

    /// Create a runtime-phase error
    pub fn runtime(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            offender: None,
            span,
            phase: ErrorPhase::Runtime,
            not_implemented: false,
        }
    }

    /// Create a not-implemented runtime error
    pub fn not_implemented(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            offender: None,
            span,
            phase: ErrorPhase::Runtime,
            not_implemented: true,
        }
    }

    /// Render with source context in the error-output format. Spans carry
    /// byte offsets only; the line and column numbers come from the source
    /// text's line table.
    pub fn format_with_source(&self, source: &SourceText) -> String {
        let mut out = format!("Error: \"{}\"", self.message);
        if let Some(offender) = &self.offender {
            out.push_str(&format!(" caused by '{}'", offender));
        }
        let (line, start) = source.line_col(self.span.start);
        let (end_line, end_col) = source.line_col(self.span.end);
        let end = end_col.saturating_sub(1);
        out.push_str(&format!(" at line: {}, index: {}", line, start));
        if end_line == line && end > start {
            out.push_str(&format!(" to {}", end));
        }
        out.push_str(" in\n");

        let Some(line_text) = source.line(line) else {
            return out;
        };
        out.push_str(line_text);
        out.push('\n');

        // Mirror leading tabs with tabs so the caret lines up.
        for c in line_text.chars().take(start - 1) {
            out.push(if c == '\t' { '\t' } else { ' ' });
        }
        out.push('^');
        let line_len = line_text.chars().count();
        let span_len = if end_line == line {
            end_col.saturating_sub(start)
        } else {
            line_len.saturating_sub(start - 1)
        };
        for _ in 1..span_len.clamp(1, line_len.saturating_sub(start - 1).max(1)) {
            out.push('~');
        }
        out
    }
}

impl From<ParseError> for SourceError {
    fn from(e: ParseError) -> Self {
        Self {
            message: e.to_string(),
            offender: e.offender().map(|s| s.to_string()),
            span: e.span(),
            phase: ErrorPhase::Parse,
            not_implemented: false,
        }
    }
}

/// Result alias used across the analyzer and runtime
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_with_source() {
        let source = SourceText::new("let x = y + 1");
        let span = Span::new(8, 9); // 'y'
        let err = SourceError::semantic_with_offender("Unknown name", "y", span);
        let rendered = err.format_with_source(&source);
        assert_eq!(
            rendered,
            "Error: \"Unknown name\" caused by 'y' at line: 1, index: 9 in\nlet x = y + 1\n        ^"
        );
    }

    #[test]
    fn test_format_multichar_span() {
        let source = SourceText::new("a = value + 1");
        let span = Span::new(4, 9); // 'value'
        let err = SourceError::semantic("Unknown name", span);
        let rendered = err.format_with_source(&source);
        assert!(rendered.contains("at line: 1, index: 5 to 9 in"));
        assert!(rendered.ends_with("    ^~~~~"));
    }

    #[test]
    fn test_tab_padding_mirrors_tabs() {
        let source = SourceText::new("while a:\n\tb = c");
        let span = Span::new(14, 15); // 'c'
        let err = SourceError::semantic("Unknown name", span);
        let rendered = err.format_with_source(&source);
        let marker_line = rendered.lines().last().unwrap();
        assert!(marker_line.starts_with('\t'));
        assert!(marker_line.ends_with('^'));
    }

    #[test]
    fn test_parse_error_conversion() {
        let err = ParseError::unexpected_token("'x'", "identifier", Span::new(0, 1));
        let source_err = SourceError::from(err);
        assert_eq!(source_err.phase, ErrorPhase::Parse);
        assert_eq!(source_err.offender.as_deref(), Some("'x'"));
    }
}
