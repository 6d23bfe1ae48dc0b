//! Literal decoding
//!
//! The tokenizer hands literal lexemes through unchanged; the functions here
//! turn them into values. Numeric decoding is shared with the semantic
//! analyzer, which re-checks ranges against the target type.

use crate::error::{ParseError, ParseResult};
use crate::span::Span;

/// Decode an integer lexeme (decimal, `0x` hex, or `0b` binary, with
/// underscore separators). Returns `None` on overflow past `u64::MAX`.
pub fn decode_integer(text: &str) -> Option<u64> {
    let (digits, radix) = match text.get(..2) {
        Some("0x") | Some("0X") => (&text[2..], 16),
        Some("0b") | Some("0B") => (&text[2..], 2),
        _ => (text, 10),
    };
    let mut value: u64 = 0;
    let mut any = false;
    for c in digits.chars() {
        if c == '_' {
            continue;
        }
        let digit = c.to_digit(radix)?;
        value = value
            .checked_mul(radix as u64)?
            .checked_add(digit as u64)?;
        any = true;
    }
    any.then_some(value)
}

/// Decode a float lexeme. Underscore separators are dropped. Returns `None`
/// if the lexeme is malformed; range checking is the analyzer's business.
pub fn decode_float(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != '_').collect();
    // `1.` and `.5` are valid lexemes and valid for str::parse as well.
    cleaned.parse::<f64>().ok()
}

/// Decode a string literal lexeme (quotes included) into its value.
///
/// Escapes: `\n \r \t \0 \\ \" \'` and `\uHHHH`. `span_start` is the byte
/// offset of the opening quote, used to pin escape errors to the offending
/// sequence.
pub fn decode_string(text: &str, span_start: usize) -> ParseResult<String> {
    let body = &text[1..text.len() - 1];
    let mut value = String::with_capacity(body.len());
    let mut chars = body.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        let escape_start = span_start + 1 + i;
        let Some((_, escaped)) = chars.next() else {
            return Err(invalid_escape("\\", escape_start, escape_start + 1));
        };
        match escaped {
            'n' => value.push('\n'),
            'r' => value.push('\r'),
            't' => value.push('\t'),
            '0' => value.push('\0'),
            '\\' => value.push('\\'),
            '"' => value.push('"'),
            '\'' => value.push('\''),
            'u' => {
                let mut code = 0u32;
                for _ in 0..4 {
                    let digit = chars
                        .next()
                        .and_then(|(_, c)| c.to_digit(16))
                        .ok_or_else(|| {
                            invalid_escape("\\u", escape_start, escape_start + 2)
                        })?;
                    code = code * 16 + digit;
                }
                let c = char::from_u32(code).ok_or_else(|| {
                    invalid_escape("\\u", escape_start, escape_start + 6)
                })?;
                value.push(c);
            }
            other => {
                let end = escape_start + 1 + other.len_utf8();
                return Err(invalid_escape(&format!("\\{}", other), escape_start, end));
            }
        }
    }
    Ok(value)
}

fn invalid_escape(sequence: &str, start: usize, end: usize) -> ParseError {
    ParseError::InvalidEscape {
        sequence: sequence.to_string(),
        span: Span::new(start, end),
    }
}

/// Decode an integer label (array index) inside a composite literal
pub fn decode_index(text: &str, span: Span) -> ParseResult<u64> {
    decode_integer(text).ok_or_else(|| ParseError::InvalidNumber {
        literal: text.to_string(),
        span,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_integer() {
        assert_eq!(decode_integer("12"), Some(12));
        assert_eq!(decode_integer("1_000"), Some(1000));
        assert_eq!(decode_integer("0xFF"), Some(255));
        assert_eq!(decode_integer("0b10_1"), Some(5));
        assert_eq!(decode_integer("18446744073709551615"), Some(u64::MAX));
        assert_eq!(decode_integer("18446744073709551616"), None);
    }

    #[test]
    fn test_decode_float() {
        assert_eq!(decode_float("1.5"), Some(1.5));
        assert_eq!(decode_float("1."), Some(1.0));
        assert_eq!(decode_float(".5"), Some(0.5));
        assert_eq!(decode_float("1_0.5e-1"), Some(1.05));
    }

    #[test]
    fn test_decode_string() {
        let value = decode_string("\"a\\n\\u0041\"", 0).unwrap();
        assert_eq!(value, "a\nA");
    }

    #[test]
    fn test_invalid_escape() {
        let err = decode_string("\"\\q\"", 0).unwrap_err();
        assert!(matches!(err, ParseError::InvalidEscape { .. }));
        // The span pins the escape, one past the opening quote
        assert_eq!(err.span(), Span::new(1, 3));
    }
}
