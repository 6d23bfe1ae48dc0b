//! Source reader: normalization and offset tracking
//!
//! Raw input bytes are NFC-normalized once, up front. Every span produced by
//! the tokenizer and parser indexes the normalized text, which is therefore
//! the source of truth for diagnostics. The reader also owns the line table
//! that turns a byte offset back into the 1-indexed line and column the
//! error printer reports.

use unicode_normalization::{is_nfc, UnicodeNormalization};

/// End-of-text sentinel returned when reading past the end of the source.
pub const EOT: char = '\u{0004}';

/// A normalized source text with its line table.
#[derive(Debug, Clone)]
pub struct SourceText {
    text: String,
    /// Byte offset where each line begins; `line_starts[0]` is 0
    line_starts: Vec<usize>,
}

impl SourceText {
    /// Normalize raw input and index its line starts.
    pub fn new(raw: &str) -> Self {
        let text: String = if is_nfc(raw) {
            raw.to_string()
        } else {
            raw.nfc().collect()
        };
        let mut line_starts = vec![0];
        line_starts.extend(memchr::memchr_iter(b'\n', text.as_bytes()).map(|pos| pos + 1));
        Self { text, line_starts }
    }

    /// The normalized text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the normalized text in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if the source is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The code point at a byte offset, or the EOT sentinel past the end.
    pub fn head(&self, offset: usize) -> char {
        self.text
            .get(offset..)
            .and_then(|rest| rest.chars().next())
            .unwrap_or(EOT)
    }

    /// The 1-indexed line and byte column of an offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        (line, offset - line_start + 1)
    }

    /// The text of a 1-indexed line, without its terminator.
    pub fn line(&self, line: usize) -> Option<&str> {
        let start = *self.line_starts.get(line.checked_sub(1)?)?;
        let end = self
            .line_starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        let text = &self.text[start..end];
        // A CR before the LF belongs to the terminator too.
        Some(text.strip_suffix('\r').unwrap_or(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nfc_normalization() {
        // U+0065 U+0301 (e + combining acute) normalizes to U+00E9
        let src = SourceText::new("let e\u{301} = 1");
        assert!(src.text().contains('\u{e9}'));
    }

    #[test]
    fn test_head_past_end() {
        let src = SourceText::new("x");
        assert_eq!(src.head(0), 'x');
        assert_eq!(src.head(1), EOT);
        assert_eq!(src.head(100), EOT);
    }

    #[test]
    fn test_line_col() {
        let src = SourceText::new("ab\ncde\n");
        assert_eq!(src.line_col(0), (1, 1)); // 'a'
        assert_eq!(src.line_col(2), (1, 3)); // the newline itself
        assert_eq!(src.line_col(3), (2, 1)); // 'c'
        assert_eq!(src.line_col(5), (2, 3)); // 'e'
        assert_eq!(src.line_col(7), (3, 1)); // end of source
    }

    #[test]
    fn test_line_lookup() {
        let src = SourceText::new("a = 1\r\nb = 2\n");
        assert_eq!(src.line(1), Some("a = 1"));
        assert_eq!(src.line(2), Some("b = 2"));
        assert_eq!(src.line(9), None);
    }
}
