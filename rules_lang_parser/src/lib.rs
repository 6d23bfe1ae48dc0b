//! Tokenizer and parser for RulesLang
//!
//! This crate owns the front half of the RulesLang pipeline: normalized
//! source text, the token stream, the syntactic tree, and the operator
//! expander. Semantic analysis and evaluation live in the `rules_lang`
//! crate.
//!
//! # Example
//!
//! ```
//! use rules_lang_parser::source::SourceText;
//! use rules_lang_parser::parser::parse;
//!
//! let source = SourceText::new("let Test t = 1 + 1");
//! let program = parse(&source).unwrap();
//! assert_eq!(program.len(), 1);
//! ```

pub mod ast;
pub mod error;
pub mod expand;
pub mod lexer;
pub mod parser;
pub mod source;
pub mod span;
pub mod token;

pub use ast::{Expr, Stmt};
pub use error::{ParseError, ParseResult};
pub use expand::expand_operators;
pub use parser::{parse, parse_expression, Parser};
pub use source::SourceText;
pub use span::Span;
