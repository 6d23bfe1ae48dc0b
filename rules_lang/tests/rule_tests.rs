//! End-to-end rule tests
//!
//! Whole programs through the full pipeline: parse, operator expansion,
//! analysis, evaluation, and JSON marshalling both ways.

use pretty_assertions::assert_eq;
use serde_json::json;

use rules_lang::error::ErrorPhase;
use rules_lang::lowering::{reduce, Lowering};
use rules_lang::rule::Rule;
use rules_lang_parser::expand::expand_operators;
use rules_lang_parser::parser::parse;
use rules_lang_parser::source::SourceText;

#[test]
fn test_sum_rule() {
    let rule = Rule::compile("def Input: {a: sint32, b: sint32}\nreturn .a + .b").unwrap();
    assert_eq!(
        rule.run(&json!({"a": 2, "b": 3})).unwrap(),
        Some(json!(5))
    );
}

#[test]
fn test_rule_with_helper_function_and_loop() {
    let rule = Rule::compile(
        "def Input: {limit: sint64}\n\
         func square(sint64 n) sint64:\n\
         \x20 return n * n\n\
         var i = 0\n\
         var total = 0\n\
         while i < .limit:\n\
         \x20 total += square(i)\n\
         \x20 i += 1\n\
         return total",
    )
    .unwrap();
    // 0 + 1 + 4 + 9 + 16 = 30
    assert_eq!(rule.run(&json!({"limit": 5})).unwrap(), Some(json!(30)));
}

#[test]
fn test_not_applicable_rule() {
    let rule = Rule::compile(
        "def Input: {age: sint32}\n\
         if .age >= 18:\n\
         \x20 return true",
    )
    .unwrap();
    assert_eq!(rule.run(&json!({"age": 30})).unwrap(), Some(json!(true)));
    assert_eq!(rule.run(&json!({"age": 12})).unwrap(), None);
}

#[test]
fn test_structured_output() {
    let rule = Rule::compile(
        "def Input: {price: sint64, quantity: sint64}\n\
         def Line: {net: sint64, taxed: sint64}\n\
         let net = .price * .quantity\n\
         return Line {net: net, taxed: net + net / 5}",
    )
    .unwrap();
    assert_eq!(
        rule.run(&json!({"price": 100, "quantity": 3})).unwrap(),
        Some(json!({"net": 300, "taxed": 360}))
    );
}

#[test]
fn test_nested_input_structures() {
    let rule = Rule::compile(
        "def Point: {x: sint64, y: sint64}\n\
         def Input: {from: Point, to: Point}\n\
         return (.to.x - .from.x) * (.to.y - .from.y)",
    )
    .unwrap();
    assert_eq!(
        rule.run(&json!({"from": {"x": 1, "y": 2}, "to": {"x": 4, "y": 6}}))
            .unwrap(),
        Some(json!(12))
    );
}

#[test]
fn test_array_input_and_output() {
    let rule = Rule::compile(
        "def Input: {xs: sint64[4]}\n\
         def Out: sint64[4]\n\
         return Out {0: .xs[3], 1: .xs[2], 2: .xs[1], 3: .xs[0]}",
    )
    .unwrap();
    assert_eq!(
        rule.run(&json!({"xs": [1, 2, 3, 4]})).unwrap(),
        Some(json!([4, 3, 2, 1]))
    );
}

#[test]
fn test_runtime_error_carries_source_position() {
    let rule = Rule::compile(
        "def Input: {d: sint64}\n\
         return 100 / .d",
    )
    .unwrap();
    let err = rule.run(&json!({"d": 0})).unwrap_err();
    assert_eq!(err.phase, ErrorPhase::Runtime);
    assert_eq!(err.message, "Division by zero");
    assert_eq!(rule.source().line_col(err.span.start).0, 2);

    let rendered = err.format_with_source(rule.source());
    assert!(rendered.starts_with("Error: \"Division by zero\" at line: 2"));
    assert!(rendered.contains("100 / .d"));
}

#[test]
fn test_input_descriptor_shapes() {
    let rule = Rule::compile(
        "def Point: {x: fp64, y: fp64}\n\
         def Input: {name: bool, at: Point, row: sint32[]}\n\
         return .name",
    )
    .unwrap();
    assert_eq!(
        rule.input_descriptor(),
        r#"{"name":"bool","at":{"x":"fp64","y":"fp64"},"row":"sint32[]"}"#
    );
}

#[test]
fn test_reduce_pass_is_idempotent_on_lowered_programs() {
    let source = SourceText::new(
        "def Input: {a: sint64}\n\
         var x = 2 + 3 * 4\n\
         if .a > x:\n\
         \x20 x = .a - 1\n\
         return x",
    );
    let stmts = expand_operators(parse(&source).unwrap());
    let program = Lowering::lower_program(&stmts).unwrap();

    let once = reduce::reduce_statements(program.main.clone()).unwrap();
    assert_eq!(once, program.main, "lowering already reduces");
    let twice = reduce::reduce_statements(once.clone()).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_rule_runs_are_independent() {
    // Each run starts with a fresh heap; results never leak across runs.
    let rule = Rule::compile(
        "def Input: {n: sint64}\n\
         def R: sint64[3]\n\
         var R r = {other: .n}\n\
         return r[0] + r[1] + r[2]",
    )
    .unwrap();
    assert_eq!(rule.run(&json!({"n": 2})).unwrap(), Some(json!(6)));
    assert_eq!(rule.run(&json!({"n": 5})).unwrap(), Some(json!(15)));
}
