//! Token definitions for the RulesLang tokenizer
//!
//! The raw lexeme table is derived with logos; maximal munch over the fixed
//! operator table falls out of logos' longest-match rule. `Whitespace` and
//! `Newline` never escape the tokenizer wrapper: it re-tags them as
//! `Indentation` and `Terminator` (see `lexer.rs`).

use logos::Logos;

use crate::span::Span;

/// RulesLang token kinds
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"#[^\r\n]*")] // Line comments
pub enum TokenKind {
    // ==================== Keywords ====================
    #[token("def")]
    KwDef,
    #[token("let")]
    KwLet,
    #[token("var")]
    KwVar,
    #[token("if")]
    KwIf,
    #[token("elif")]
    KwElif,
    #[token("else")]
    KwElse,
    #[token("while")]
    KwWhile,
    #[token("func")]
    KwFunc,
    #[token("return")]
    KwReturn,
    #[token("break")]
    KwBreak,
    #[token("continue")]
    KwContinue,
    #[token("null")]
    Null,

    // ==================== Literals ====================
    #[token("true")]
    True,
    #[token("false")]
    False,
    /// Decimal, hex, or binary integer literal
    #[regex(r"[0-9][0-9_]*|0[xX][0-9A-Fa-f_]+|0[bB][01_]+")]
    IntegerLiteral,
    /// Float literal; a trailing-dot match ("1.") may be re-split by the
    /// tokenizer wrapper when followed by an identifier or another dot
    #[regex(r"[0-9][0-9_]*\.([0-9][0-9_]*)?([eE][+-]?[0-9][0-9_]*)?")]
    #[regex(r"\.[0-9][0-9_]*([eE][+-]?[0-9][0-9_]*)?")]
    FloatLiteral,
    /// Double-quoted string; escapes are decoded by the parser
    #[regex(r#""([^"\\\r\n]|\\[^\r\n])*""#)]
    StringLiteral,

    // ==================== Identifiers ====================
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    // ==================== Arithmetic ====================
    #[token("**")]
    StarStar,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,

    // ==================== Shift ====================
    #[token("<<")]
    LtLt,
    #[token(">>")]
    GtGt,
    #[token(">>>")]
    GtGtGt,

    // ==================== Comparison ====================
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,

    // ==================== Type comparison ====================
    #[token("::")]
    ColonColon,
    #[token("!:")]
    BangColon,
    #[token("<:")]
    Subtype,
    #[token(">:")]
    Supertype,
    #[token("<<:")]
    ProperSubtype,
    #[token(">>:")]
    ProperSupertype,
    #[token("<:>")]
    TypeRelated,

    // ==================== Bitwise / logical ====================
    #[token("&")]
    Amp,
    #[token("^")]
    Caret,
    #[token("|")]
    Pipe,
    #[token("&&")]
    AmpAmp,
    #[token("^^")]
    CaretCaret,
    #[token("||")]
    PipePipe,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,

    // ==================== Range ====================
    #[token("..")]
    DotDot,

    // ==================== Assignment ====================
    #[token("=")]
    Eq,
    #[token("**=")]
    StarStarEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("<<=")]
    LtLtEq,
    #[token(">>=")]
    GtGtEq,
    #[token(">>>=")]
    GtGtGtEq,
    #[token("&=")]
    AmpEq,
    #[token("^=")]
    CaretEq,
    #[token("|=")]
    PipeEq,
    #[token("&&=")]
    AmpAmpEq,
    #[token("^^=")]
    CaretCaretEq,
    #[token("||=")]
    PipePipeEq,
    #[token("~=")]
    TildeEq,

    // ==================== Punctuation ====================
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token(";")]
    Semicolon,

    // ==================== Raw layout tokens ====================
    // Re-tagged by the tokenizer wrapper.
    #[regex(r"[ \t\f]+")]
    Whitespace,
    #[regex(r"\r\n|\r|\n")]
    Newline,

    // ==================== Synthesized ====================
    /// Run of identical whitespace characters at the start of a logical line
    Indentation,
    /// `;` or a newline
    Terminator,
    /// End of source
    Eof,
}

impl TokenKind {
    /// Check if this token is a comparison operator (value comparison)
    pub fn is_compare_op(self) -> bool {
        matches!(
            self,
            TokenKind::EqEqEq
                | TokenKind::NotEqEq
                | TokenKind::EqEq
                | TokenKind::NotEq
                | TokenKind::Lt
                | TokenKind::Gt
                | TokenKind::LtEq
                | TokenKind::GtEq
        )
    }

    /// Check if this token is a type-comparison operator
    pub fn is_type_compare_op(self) -> bool {
        matches!(
            self,
            TokenKind::ColonColon
                | TokenKind::BangColon
                | TokenKind::Subtype
                | TokenKind::Supertype
                | TokenKind::ProperSubtype
                | TokenKind::ProperSupertype
                | TokenKind::TypeRelated
        )
    }

    /// Check if this token is a compound assignment operator (`op=`)
    pub fn is_compound_assignment(self) -> bool {
        matches!(
            self,
            TokenKind::StarStarEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::LtLtEq
                | TokenKind::GtGtEq
                | TokenKind::GtGtGtEq
                | TokenKind::AmpEq
                | TokenKind::CaretEq
                | TokenKind::PipeEq
                | TokenKind::AmpAmpEq
                | TokenKind::CaretCaretEq
                | TokenKind::PipePipeEq
                | TokenKind::TildeEq
        )
    }

    /// Check if this token can begin a statement-terminating position
    pub fn ends_statement(self) -> bool {
        matches!(
            self,
            TokenKind::Terminator | TokenKind::Indentation | TokenKind::Eof
        )
    }

    /// Human-readable description for error messages
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::KwDef => "'def'",
            TokenKind::KwLet => "'let'",
            TokenKind::KwVar => "'var'",
            TokenKind::KwIf => "'if'",
            TokenKind::KwElif => "'elif'",
            TokenKind::KwElse => "'else'",
            TokenKind::KwWhile => "'while'",
            TokenKind::KwFunc => "'func'",
            TokenKind::KwReturn => "'return'",
            TokenKind::KwBreak => "'break'",
            TokenKind::KwContinue => "'continue'",
            TokenKind::Null => "'null'",
            TokenKind::True | TokenKind::False => "boolean literal",
            TokenKind::IntegerLiteral => "integer literal",
            TokenKind::FloatLiteral => "float literal",
            TokenKind::StringLiteral => "string literal",
            TokenKind::Identifier => "identifier",
            TokenKind::Indentation => "indentation",
            TokenKind::Terminator => "end of statement",
            TokenKind::Eof => "end of source",
            _ => "symbol",
        }
    }
}

/// A token with its span and source text
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub span: Span,
    pub text: &'a str,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, span: Span, text: &'a str) -> Self {
        Self { kind, span, text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maximal_munch() {
        let mut lex = TokenKind::lexer(">>>= <<: <:> .. ** ^^");
        let kinds: Vec<_> = lex.by_ref().filter_map(|r| r.ok()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::GtGtGtEq,
                TokenKind::Whitespace,
                TokenKind::ProperSubtype,
                TokenKind::Whitespace,
                TokenKind::TypeRelated,
                TokenKind::Whitespace,
                TokenKind::DotDot,
                TokenKind::Whitespace,
                TokenKind::StarStar,
                TokenKind::Whitespace,
                TokenKind::CaretCaret,
            ]
        );
    }

    #[test]
    fn test_keywords_vs_identifiers() {
        let kinds: Vec<_> = TokenKind::lexer("let lettuce iffy if")
            .filter_map(|r| r.ok())
            .filter(|k| *k != TokenKind::Whitespace)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwLet,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::KwIf,
            ]
        );
    }

    #[test]
    fn test_numeric_literals() {
        let kinds: Vec<_> = TokenKind::lexer("12 0xFF 0b10_1 1.5 .5 1.5e-3")
            .filter_map(|r| r.ok())
            .filter(|k| *k != TokenKind::Whitespace)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::IntegerLiteral,
                TokenKind::IntegerLiteral,
                TokenKind::IntegerLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
                TokenKind::FloatLiteral,
            ]
        );
    }
}
