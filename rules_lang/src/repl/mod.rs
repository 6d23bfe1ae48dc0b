//! Interactive shell session
//!
//! The session owns a persistent analyzer context and evaluator, so
//! definitions and variables survive across submissions. Each submission
//! runs the full pipeline (parse, operator-expand, analyze, evaluate) and
//! reports the stack used-size; in expression mode it reports the value's
//! type and rendering instead. The editor loop around the session lives in
//! the `rules` binary.

use crate::error::SourceError;
use crate::ir::core::Program;
use crate::lowering::Lowering;
use crate::pipeline;
use crate::vm::flow::Flow;
use crate::vm::format::format_value;
use crate::vm::Vm;
use rules_lang_parser::parser;
use rules_lang_parser::source::SourceText;

/// The control character that toggles expression mode
pub const MODE_TOGGLE: char = '\u{0001}';

/// A persistent shell session
#[derive(Debug)]
pub struct Session {
    lowering: Lowering,
    vm: Vm,
    expression_mode: bool,
    /// Last compiled submission, kept so a `Rerun` flow can repeat it
    last_program: Option<Program>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            lowering: Lowering::new_shell(),
            vm: Vm::new(),
            expression_mode: false,
            last_program: None,
        }
    }

    /// Check which prompt the session wants
    pub fn expression_mode(&self) -> bool {
        self.expression_mode
    }

    /// Process one submission and render its report. Errors are rendered
    /// with source context and do not end the session.
    pub fn submit(&mut self, input: &str) -> String {
        if input.starts_with(MODE_TOGGLE) {
            self.expression_mode = !self.expression_mode;
            return String::new();
        }
        let source = SourceText::new(input);
        let result = if self.expression_mode {
            self.eval_expression(&source)
        } else {
            self.eval_statements(&source)
        };
        match result {
            Ok(report) => report,
            Err(error) if error.not_implemented => "value not implemented".to_string(),
            Err(error) => error.format_with_source(&source),
        }
    }

    fn eval_expression(&mut self, source: &SourceText) -> Result<String, SourceError> {
        let ast = parser::parse_expression(source).map_err(SourceError::from)?;
        let typed = self.lowering.lower_shell_expression(&ast)?;
        let program = self.lowering.snapshot_program(Vec::new());
        self.vm.eval(&program, &typed)?;
        let bits = self.vm.stack.pop_scalar(&typed.ty);
        Ok(format!(
            "type: {}\nvalue: {}",
            typed.ty,
            format_value(&self.vm, &typed.ty, bits)
        ))
    }

    fn eval_statements(&mut self, source: &SourceText) -> Result<String, SourceError> {
        let stmts = pipeline::parse_and_expand(source)?;
        let typed = self.lowering.lower_shell_input(&stmts)?;
        let program = self.lowering.snapshot_program(typed);
        loop {
            match self.vm.run_main(&program)? {
                Flow::Rerun => continue,
                _ => break,
            }
        }
        self.last_program = Some(program);
        Ok(format!("stack used-size: {}", self.vm.stack.used_size()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expression_mode_prints_type_and_value() {
        let mut session = Session::new();
        assert_eq!(session.submit("\u{0001}"), "");
        assert!(session.expression_mode());
        assert_eq!(session.submit("1 + 2"), "type: sint64\nvalue: 3");
    }

    #[test]
    fn test_statement_mode_prints_used_size() {
        let mut session = Session::new();
        assert_eq!(session.submit("let a = 1"), "stack used-size: 0");
    }

    #[test]
    fn test_state_persists_across_submissions() {
        let mut session = Session::new();
        session.submit("var x = 40");
        session.submit("x = x + 2");
        session.submit("\u{0001}");
        assert_eq!(session.submit("x"), "type: sint64\nvalue: 42");
    }

    #[test]
    fn test_functions_persist() {
        let mut session = Session::new();
        session.submit("func double(sint64 n) sint64:\n  return n * 2\n");
        session.submit("\u{0001}");
        assert_eq!(session.submit("double(21)"), "type: sint64\nvalue: 42");
    }

    #[test]
    fn test_errors_do_not_end_the_session() {
        let mut session = Session::new();
        let report = session.submit("let x = nosuch");
        assert!(report.starts_with("Error: "), "{}", report);
        assert_eq!(session.submit("let x = 5"), "stack used-size: 0");
    }

    #[test]
    fn test_not_implemented_report() {
        let mut session = Session::new();
        session.submit("def T: {a: sint64}");
        session.submit("\u{0001}");
        assert_eq!(session.submit("T.size"), "value not implemented");
    }

    #[test]
    fn test_top_level_return_leaves_value_on_stack() {
        let mut session = Session::new();
        let report = session.submit("return 300");
        assert_eq!(report, "stack used-size: 8");
    }
}
