use pretty_assertions::assert_eq;

use super::Lowering;
use crate::error::SourceError;
use crate::ir::core::{ExprKind, Program, TypedStmt};
use crate::types::RuleType;
use rules_lang_parser::expand::expand_operators;
use rules_lang_parser::parser::parse;
use rules_lang_parser::source::SourceText;

fn lower_ok(input: &str) -> Program {
    let source = SourceText::new(input);
    let stmts = expand_operators(parse(&source).expect("parse"));
    match Lowering::lower_program(&stmts) {
        Ok(program) => program,
        Err(e) => panic!("lowering failed for {:?}: {}", input, e.message),
    }
}

fn lower_err(input: &str) -> SourceError {
    let source = SourceText::new(input);
    let stmts = expand_operators(parse(&source).expect("parse"));
    match Lowering::lower_program(&stmts) {
        Ok(program) => panic!("expected error for {:?}, got {:?}", input, program),
        Err(e) => e,
    }
}

fn declared_type(program: &Program, index: usize) -> &RuleType {
    match &program.main[index] {
        TypedStmt::Declare { ty, .. } => ty,
        other => panic!("expected declaration, got {:?}", other),
    }
}

#[test]
fn test_let_keeps_literal_type() {
    let program = lower_ok("let x = 1 + 1");
    assert_eq!(declared_type(&program, 0), &RuleType::SintLit(2));
}

#[test]
fn test_var_lifts_literal_type() {
    let program = lower_ok("var x = 1 + 1");
    assert_eq!(declared_type(&program, 0), &RuleType::Sint64);
}

#[test]
fn test_declared_type_accepts_fitting_literal() {
    let program = lower_ok("def Small: sint8\nlet Small x = 100");
    assert_eq!(declared_type(&program, 0), &RuleType::Sint8);
}

#[test]
fn test_declared_type_rejects_overflowing_literal() {
    let err = lower_err("def Small: sint8\nlet Small x = 200");
    assert!(err.message.contains("Cannot convert"), "{}", err.message);
}

#[test]
fn test_literal_reduction_folds_pure_subtrees() {
    let program = lower_ok("let x = 2 * 3 + 4");
    let TypedStmt::Declare { value: Some(value), .. } = &program.main[0] else {
        panic!("expected declaration");
    };
    assert_eq!(value.kind, ExprKind::Sint(10));
    assert_eq!(value.ty, RuleType::SintLit(10));
}

#[test]
fn test_literal_overflow_is_a_semantic_error() {
    let err = lower_err("let x = 9223372036854775807 + 9223372036854775807");
    assert!(err.message.contains("overflow"), "{}", err.message);
}

#[test]
fn test_boundary_negative_literal() {
    let program = lower_ok("let x = -9223372036854775808");
    assert_eq!(declared_type(&program, 0), &RuleType::SintLit(i64::MIN));
}

#[test]
fn test_boundary_unsigned_literal() {
    let program = lower_ok("let x = 9223372036854775808");
    assert_eq!(
        declared_type(&program, 0),
        &RuleType::UintLit(9223372036854775808)
    );
}

#[test]
fn test_unknown_name_reports_offender() {
    let err = lower_err("let x = y");
    assert_eq!(err.offender.as_deref(), Some("y"));
}

#[test]
fn test_same_block_collision() {
    let err = lower_err("let x = 1\nlet x = 2");
    assert!(err.message.contains("already defined"), "{}", err.message);
}

#[test]
fn test_inner_block_shadowing_is_allowed() {
    lower_ok("let x = 1\nif true:\n  let x = 2\n  x = 3");
}

#[test]
fn test_assignment_type_check() {
    let err = lower_err("def Small: sint8\nvar Small x = 1\nx = 300");
    assert!(err.message.contains("Cannot convert"), "{}", err.message);
}

#[test]
fn test_assignment_target_must_be_assignable() {
    let err = lower_err("1 + 2 = 3");
    assert!(err.message.contains("not assignable"), "{}", err.message);
}

#[test]
fn test_context_field_is_read_only() {
    let err = lower_err("def Input: {a: sint32}\n.a = 1");
    assert!(err.message.contains("read-only"), "{}", err.message);
}

#[test]
fn test_condition_must_be_bool() {
    let err = lower_err("if 1:\n  let x = 1");
    assert!(err.message.contains("bool"), "{}", err.message);
}

#[test]
fn test_break_outside_loop() {
    let err = lower_err("break");
    assert!(err.message.contains("outside a loop"), "{}", err.message);
}

#[test]
fn test_labeled_break_resolves() {
    lower_ok("outer: while true:\n  while true:\n    break outer");
    let err = lower_err("outer: while true:\n  break inner");
    assert!(err.message.contains("inner"), "{}", err.message);
}

#[test]
fn test_function_must_return_on_every_path() {
    let err = lower_err(
        "func f(sint32 a) sint32:\n  if a > 0:\n    return 1",
    );
    assert!(err.message.contains("returns"), "{}", err.message);

    lower_ok("func f(sint32 a) sint32:\n  if a > 0:\n    return 1\n  else:\n    return 2");
}

#[test]
fn test_overload_resolution_prefers_specific() {
    let program = lower_ok(
        "func f(sint8 a) sint32:\n  return 1\nfunc f(sint64 a) sint32:\n  return 2\nlet r = f(5)",
    );
    let TypedStmt::Declare { value: Some(value), .. } = &program.main[0] else {
        panic!("expected declaration");
    };
    let ExprKind::Call { function, .. } = &value.kind else {
        panic!("expected call, got {:?}", value.kind);
    };
    // The sint8 overload is more specific and 5 fits it
    assert_eq!(*function, 0);
}

#[test]
fn test_no_matching_overload() {
    let err = lower_err("func f(bool a) bool:\n  return a\nlet r = f(1)");
    assert!(err.message.contains("No overload"), "{}", err.message);
}

#[test]
fn test_duplicate_signature_rejected() {
    let err = lower_err(
        "func f(sint32 a) sint32:\n  return a\nfunc f(sint32 b) sint32:\n  return b",
    );
    assert!(err.message.contains("already defined"), "{}", err.message);
}

#[test]
fn test_infix_resolves_two_argument_function() {
    let program = lower_ok(
        "func min(sint64 a, sint64 b) sint64:\n  return a if a < b else b\nlet r = 3 min 4",
    );
    let TypedStmt::Declare { value: Some(value), .. } = &program.main[0] else {
        panic!("expected declaration");
    };
    assert!(matches!(value.kind, ExprKind::Call { .. }));
}

#[test]
fn test_cyclic_type_reference_rejected() {
    let err = lower_err("def A: {next: A}");
    assert!(err.message.contains("Cyclic"), "{}", err.message);
}

#[test]
fn test_type_test_folds_to_constant() {
    let program = lower_ok("let t = 1 + 2 :: sint64");
    assert_eq!(declared_type(&program, 0), &RuleType::BoolLit(true));
    let program = lower_ok("def Arr: sint32[]\nvar Arr a = {1, 2}\nlet t = a <: any");
    assert_eq!(declared_type(&program, 1), &RuleType::BoolLit(true));
}

#[test]
fn test_compare_chain_folds_with_and() {
    let program = lower_ok("var lo = 0\nlet t = lo <= 5 < 10");
    let TypedStmt::Declare { value: Some(value), .. } = &program.main[1] else {
        panic!("expected declaration");
    };
    assert!(matches!(
        value.kind,
        ExprKind::Logical {
            op: crate::ir::core::LogicalOp::And,
            ..
        }
    ));
}

#[test]
fn test_input_type_and_context_fields() {
    let program = lower_ok("def Input: {a: sint32, b: sint32}\nreturn .a + .b");
    assert_eq!(
        program.input_type,
        RuleType::Structure {
            members: vec![
                ("a".to_string(), RuleType::Sint32),
                ("b".to_string(), RuleType::Sint32),
            ]
        }
    );
    assert_eq!(program.output_type, Some(RuleType::Sint32));
}

#[test]
fn test_unknown_context_field() {
    let err = lower_err("def Input: {a: sint32}\nreturn .b");
    assert!(err.message.contains("no member 'b'"), "{}", err.message);
}

#[test]
fn test_structure_widening_on_declaration() {
    lower_ok(
        "def Wide: {a: sint8, b: bool}\ndef Narrow: {a: sint32}\n\
         var Wide w = {a: 1, b: true}\nlet Narrow n = w",
    );
}

#[test]
fn test_composite_literal_against_array_type() {
    let program = lower_ok("def Row: sint64[4]\nlet Row r = {1, 2, other: 9}");
    let TypedStmt::Declare { value: Some(value), .. } = &program.main[0] else {
        panic!("expected declaration");
    };
    let ExprKind::ArrayLiteral { values, other } = &value.kind else {
        panic!("expected array literal, got {:?}", value.kind);
    };
    assert_eq!(values.len(), 4);
    assert!(values[0].is_some() && values[1].is_some());
    assert!(values[2].is_none() && values[3].is_none());
    assert!(other.is_some());
}

#[test]
fn test_mixed_int_float_atomic_has_no_common_type() {
    let err = lower_err("var a = 1\nvar b = 1.5\nlet c = a + b");
    assert!(err.message.contains("No common type"), "{}", err.message);
}

#[test]
fn test_static_field_access_is_preserved_unimplemented() {
    let program = lower_ok("def T: {a: sint32}\nlet x = T.size");
    let TypedStmt::Declare { value: Some(value), .. } = &program.main[0] else {
        panic!("expected declaration");
    };
    assert!(matches!(value.kind, ExprKind::StaticField { .. }));
}
