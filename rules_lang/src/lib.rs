//! RulesLang: a statically typed embeddable rule language
//!
//! Programs compile from source text and evaluate against a JSON-like input
//! to a JSON-like output, or to "not applicable". This crate owns the back
//! half of the pipeline — the type lattice, the semantic analyzer, and the
//! tree-walking evaluator — plus the rule interface and the interactive
//! shell. Tokenizing and parsing live in `rules_lang_parser`.
//!
//! # Example
//!
//! ```
//! use rules_lang::rule::Rule;
//! use serde_json::json;
//!
//! let rule = Rule::compile("def Input: {a: sint32, b: sint32}\nreturn .a + .b").unwrap();
//! let output = rule.run(&json!({"a": 2, "b": 3})).unwrap();
//! assert_eq!(output, Some(json!(5)));
//! ```

pub mod error;
pub mod ir;
pub mod lowering;
pub mod pipeline;
pub mod repl;
pub mod rule;
pub mod types;
pub mod vm;

pub use error::{ErrorPhase, SourceError, SourceResult};
pub use rule::Rule;
pub use types::RuleType;
