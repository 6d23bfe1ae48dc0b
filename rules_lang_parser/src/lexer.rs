//! Tokenizer for RulesLang source code
//!
//! Wraps the logos-generated lexer with the layout handling the raw lexeme
//! table cannot express: whitespace runs at the start of a logical line
//! become `Indentation` tokens (an empty one is synthesized when a line
//! starts with no whitespace), newlines and `;` become `Terminator`, and a
//! float lexed as `<digits>.` followed by an identifier or another dot is
//! re-split into an integer and re-lexed from the dot.
//!
//! Backtracking: `save` pushes a cursor snapshot, `discard` pops it,
//! `restore` pops and rewinds. Tokens are pulled lazily from the inner
//! lexer into a buffer the cursor indexes, so a snapshot is just an index.

use logos::Logos;

use crate::error::{ParseError, ParseResult};
use crate::source::SourceText;
use crate::span::Span;
use crate::token::{Token, TokenKind};

/// RulesLang tokenizer
pub struct Tokenizer<'a> {
    source: &'a SourceText,
    inner: logos::Lexer<'a, TokenKind>,
    /// Offset of the inner lexer relative to the source (used after restarts)
    offset: usize,
    /// The next whitespace run (or its absence) is a line-start indentation
    pending_indent: bool,
    /// Cooked tokens pulled so far
    buffer: Vec<Token<'a>>,
    /// Index of the current token in `buffer`
    cursor: usize,
    /// Snapshot stack for backtracking
    marks: Vec<usize>,
    /// The inner lexer is exhausted and `Eof` has been buffered
    done: bool,
    /// A tokenize error is sticky; no recovery is attempted
    failed: Option<ParseError>,
}

impl std::fmt::Debug for Tokenizer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("cursor", &self.cursor)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl<'a> Tokenizer<'a> {
    /// Create a new tokenizer over a normalized source text
    pub fn new(source: &'a SourceText) -> Self {
        Self {
            source,
            inner: TokenKind::lexer(source.text()),
            offset: 0,
            pending_indent: true,
            buffer: Vec::new(),
            cursor: 0,
            marks: Vec::new(),
            done: false,
            failed: None,
        }
    }

    /// Peek at the current token without consuming it
    pub fn head(&mut self) -> ParseResult<Token<'a>> {
        while self.cursor >= self.buffer.len() {
            if let Some(err) = &self.failed {
                return Err(err.clone());
            }
            if self.done {
                // Past the buffered Eof; keep returning it.
                return Ok(*self.buffer.last().expect("Eof token buffered"));
            }
            self.fill_one()?;
        }
        Ok(self.buffer[self.cursor])
    }

    /// Consume and return the current token; `Eof` is never consumed
    pub fn advance(&mut self) -> ParseResult<Token<'a>> {
        let token = self.head()?;
        if token.kind != TokenKind::Eof {
            self.cursor += 1;
        }
        Ok(token)
    }

    /// Push a snapshot of the current position
    pub fn save(&mut self) {
        self.marks.push(self.cursor);
    }

    /// Pop the latest snapshot without rewinding
    pub fn discard(&mut self) {
        self.marks.pop();
    }

    /// Pop the latest snapshot and rewind to it
    pub fn restore(&mut self) {
        if let Some(mark) = self.marks.pop() {
            self.cursor = mark;
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        if self.pending_indent && kind != TokenKind::Indentation {
            // Line with no leading whitespace: synthesize an empty run.
            let span = Span::at(start);
            self.buffer.push(Token::new(TokenKind::Indentation, span, ""));
        }
        self.pending_indent = kind == TokenKind::Terminator && self.terminator_is_newline(start);
        let span = Span::new(start, end);
        let text = &self.source.text()[start..end];
        self.buffer.push(Token::new(kind, span, text));
    }

    fn terminator_is_newline(&self, start: usize) -> bool {
        matches!(self.source.head(start), '\n' | '\r')
    }

    /// Restart the inner lexer from a byte position
    fn restart_from(&mut self, pos: usize) {
        self.inner = TokenKind::lexer(&self.source.text()[pos..]);
        self.offset = pos;
    }

    /// Pull raw tokens until at least one cooked token is buffered
    fn fill_one(&mut self) -> ParseResult<()> {
        loop {
            let raw = match self.inner.next() {
                None => {
                    let len = self.source.len();
                    let span = Span::at(len);
                    self.buffer.push(Token::new(TokenKind::Eof, span, ""));
                    self.done = true;
                    return Ok(());
                }
                Some(raw) => raw,
            };
            let start = self.offset + self.inner.span().start;
            let end = self.offset + self.inner.span().end;

            let kind = match raw {
                Err(()) => {
                    let err = if self.source.head(start) == '"' {
                        ParseError::UnterminatedString {
                            span: Span::new(start, end),
                        }
                    } else {
                        ParseError::UnrecognizedToken {
                            found: self.source.text()[start..end].to_string(),
                            span: Span::new(start, end),
                        }
                    };
                    self.failed = Some(err.clone());
                    return Err(err);
                }
                Ok(kind) => kind,
            };

            match kind {
                TokenKind::Whitespace => {
                    if self.pending_indent {
                        self.pending_indent = false;
                        let span = Span::new(start, end);
                        let text = &self.source.text()[start..end];
                        self.buffer.push(Token::new(TokenKind::Indentation, span, text));
                        return Ok(());
                    }
                    // Interior whitespace separates tokens and is dropped.
                }
                TokenKind::Newline | TokenKind::Semicolon => {
                    self.push(TokenKind::Terminator, start, end);
                    return Ok(());
                }
                TokenKind::FloatLiteral if self.needs_resplit(start, end) => {
                    // `<digits>.` before an identifier is an integer field
                    // access, and before another dot a range bound. Emit the
                    // digits and re-lex from the dot.
                    let dot = end - 1;
                    self.push(TokenKind::IntegerLiteral, start, dot);
                    self.restart_from(dot);
                    return Ok(());
                }
                other => {
                    self.push(other, start, end);
                    return Ok(());
                }
            }
        }
    }

    /// A float token ending in `.` re-splits when an identifier or another
    /// dot follows directly
    fn needs_resplit(&self, start: usize, end: usize) -> bool {
        if !self.source.text()[start..end].ends_with('.') {
            return false;
        }
        matches!(self.source.head(end), 'a'..='z' | 'A'..='Z' | '_' | '.')
    }
}

/// Tokenize source into a vector of tokens (for tests and debugging)
pub fn tokenize(source: &SourceText) -> ParseResult<Vec<Token<'_>>> {
    let mut tokenizer = Tokenizer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.advance()?;
        let kind = token.kind;
        tokens.push(token);
        if kind == TokenKind::Eof {
            return Ok(tokens);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let source = SourceText::new(input);
        tokenize(&source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_statement() {
        assert_eq!(
            kinds("let a = 1"),
            vec![
                TokenKind::Indentation,
                TokenKind::KwLet,
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::IntegerLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_indentation_and_terminators() {
        assert_eq!(
            kinds("if a:\n  b = 1; c = 2\n"),
            vec![
                TokenKind::Indentation, // ""
                TokenKind::KwIf,
                TokenKind::Identifier,
                TokenKind::Colon,
                TokenKind::Terminator, // newline
                TokenKind::Indentation, // "  "
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::IntegerLiteral,
                TokenKind::Terminator, // ;
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::IntegerLiteral,
                TokenKind::Terminator, // newline
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_crlf_terminator() {
        assert_eq!(
            kinds("a = 1\r\nb = 2"),
            vec![
                TokenKind::Indentation,
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::IntegerLiteral,
                TokenKind::Terminator,
                TokenKind::Indentation,
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::IntegerLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_integer_dot_identifier_resplit() {
        // `1.max` is an integer field access, not a float
        assert_eq!(
            kinds("1.max"),
            vec![
                TokenKind::Indentation,
                TokenKind::IntegerLiteral,
                TokenKind::Dot,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_integer_range_resplit() {
        // `1..5` is a range between two integers
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Indentation,
                TokenKind::IntegerLiteral,
                TokenKind::DotDot,
                TokenKind::IntegerLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_trailing_dot_float_survives() {
        // `1.` followed by nothing identifier-like stays a float
        assert_eq!(
            kinds("1. + 2.5"),
            vec![
                TokenKind::Indentation,
                TokenKind::FloatLiteral,
                TokenKind::Plus,
                TokenKind::FloatLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_dropped() {
        assert_eq!(
            kinds("a = 1 # trailing\n# whole line\nb = 2"),
            vec![
                TokenKind::Indentation,
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::IntegerLiteral,
                TokenKind::Terminator,
                TokenKind::Indentation,
                TokenKind::Terminator,
                TokenKind::Indentation,
                TokenKind::Identifier,
                TokenKind::Eq,
                TokenKind::IntegerLiteral,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_save_restore() {
        let source = SourceText::new("a b c");
        let mut tokenizer = Tokenizer::new(&source);

        tokenizer.advance().unwrap(); // indentation
        tokenizer.save();
        assert_eq!(tokenizer.advance().unwrap().text, "a");
        assert_eq!(tokenizer.advance().unwrap().text, "b");
        tokenizer.restore();
        assert_eq!(tokenizer.advance().unwrap().text, "a");

        tokenizer.save();
        assert_eq!(tokenizer.advance().unwrap().text, "b");
        tokenizer.discard();
        assert_eq!(tokenizer.advance().unwrap().text, "c");
    }

    #[test]
    fn test_spans_slice_source() {
        let source = SourceText::new("let x = 12 + 3");
        for token in tokenize(&source).unwrap() {
            assert_eq!(&source.text()[token.span.start..token.span.end], token.text);
        }
    }

    #[test]
    fn test_unterminated_string() {
        let source = SourceText::new("let s = \"abc");
        let result = tokenize(&source);
        assert!(matches!(
            result,
            Err(ParseError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn test_eof_is_sticky() {
        let source = SourceText::new("x");
        let mut tokenizer = Tokenizer::new(&source);
        tokenizer.advance().unwrap(); // indentation
        tokenizer.advance().unwrap(); // x
        assert_eq!(tokenizer.advance().unwrap().kind, TokenKind::Eof);
        assert_eq!(tokenizer.advance().unwrap().kind, TokenKind::Eof);
        let eof = tokenizer.head().unwrap();
        assert_eq!(eof.span.start, eof.span.end);
        assert_eq!(eof.text, "");
    }
}
