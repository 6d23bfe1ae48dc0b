//! Compilation pipeline
//!
//! Source text flows through the fixed pass order: parse, operator
//! expansion, semantic analysis. Each entry point reports the first failure
//! as a [`SourceError`].

use crate::error::{SourceError, SourceResult};
use crate::ir::core::Program;
use crate::lowering::Lowering;
use rules_lang_parser::ast::Stmt;
use rules_lang_parser::expand::expand_operators;
use rules_lang_parser::parser;
use rules_lang_parser::source::SourceText;

/// Parse and operator-expand source into a syntactic tree
pub fn parse_and_expand(source: &SourceText) -> SourceResult<Vec<Stmt>> {
    let stmts = parser::parse(source).map_err(SourceError::from)?;
    Ok(expand_operators(stmts))
}

/// Compile source text into an analyzed program
pub fn compile(source: &SourceText) -> SourceResult<Program> {
    let stmts = parse_and_expand(source)?;
    Lowering::lower_program(&stmts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorPhase;

    #[test]
    fn test_compile_reports_parse_phase() {
        let source = SourceText::new("let = 1");
        let err = compile(&source).unwrap_err();
        assert_eq!(err.phase, ErrorPhase::Parse);
    }

    #[test]
    fn test_compile_reports_semantic_phase() {
        let source = SourceText::new("let x = y");
        let err = compile(&source).unwrap_err();
        assert_eq!(err.phase, ErrorPhase::Semantic);
    }

    #[test]
    fn test_compile_whole_program() {
        let source = SourceText::new("def Input: {a: sint32}\nreturn .a * 2");
        let program = compile(&source).unwrap();
        assert_eq!(program.main.len(), 1);
    }
}
