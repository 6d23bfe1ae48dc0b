//! Parser integration tests
//!
//! The end-to-end parse scenarios, the indentation grammar, backtracking,
//! and the formatter round-trip property.

use pretty_assertions::assert_eq;
use rules_lang_parser::ast::{
    format_program, BinaryOp, CompareOp, DeclKind, Expr, Label, Stmt, TypeTestOp,
};
use rules_lang_parser::error::ParseError;
use rules_lang_parser::expand::expand_operators;
use rules_lang_parser::parser::{parse, parse_expression};
use rules_lang_parser::source::SourceText;

fn parse_ok(input: &str) -> Vec<Stmt> {
    let source = SourceText::new(input);
    match parse(&source) {
        Ok(stmts) => stmts,
        Err(e) => panic!("parse failed for {:?}: {}", input, e),
    }
}

fn parse_err(input: &str) -> ParseError {
    let source = SourceText::new(input);
    match parse(&source) {
        Ok(stmts) => panic!("expected parse error for {:?}, got {:?}", input, stmts),
        Err(e) => e,
    }
}

#[test]
fn test_typed_let_declaration() {
    // Scenario: let Test t = 1 + 1
    let stmts = parse_ok("let Test t = 1 + 1");
    assert_eq!(stmts.len(), 1);
    let Stmt::VariableDeclaration {
        kind,
        type_name,
        name,
        value,
        ..
    } = &stmts[0]
    else {
        panic!("expected declaration, got {:?}", stmts[0]);
    };
    assert_eq!(*kind, DeclKind::Let);
    assert_eq!(type_name.as_ref().map(|(n, _)| n.as_str()), Some("Test"));
    assert_eq!(name, "t");
    let Some(Expr::Binary { op, lhs, rhs, .. }) = value else {
        panic!("expected binary value, got {:?}", value);
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(&**lhs, Expr::Integer { text, .. } if text == "1"));
    assert!(matches!(&**rhs, Expr::Integer { text, .. } if text == "1"));
}

#[test]
fn test_untyped_let_backtracks() {
    let stmts = parse_ok("let t = 1");
    let Stmt::VariableDeclaration {
        type_name, name, ..
    } = &stmts[0]
    else {
        panic!("expected declaration, got {:?}", stmts[0]);
    };
    assert_eq!(*type_name, None);
    assert_eq!(name, "t");
}

#[test]
fn test_if_else_chain() {
    // Scenario: if a == 0 with an else branch
    let stmts = parse_ok("if a == 0:\n  let b = 12\nelse:\n  d = 1");
    assert_eq!(stmts.len(), 1);
    let Stmt::Conditional {
        blocks,
        false_statements,
        ..
    } = &stmts[0]
    else {
        panic!("expected conditional, got {:?}", stmts[0]);
    };
    assert_eq!(blocks.len(), 1);
    let Expr::Compare {
        first, comparisons, ..
    } = &blocks[0].condition
    else {
        panic!("expected comparison, got {:?}", blocks[0].condition);
    };
    assert!(matches!(&**first, Expr::Name { name, .. } if name == "a"));
    assert_eq!(comparisons.len(), 1);
    assert_eq!(comparisons[0].0, CompareOp::Equal);

    assert!(matches!(
        &blocks[0].statements[..],
        [Stmt::VariableDeclaration { name, .. }] if name == "b"
    ));
    assert!(matches!(
        &false_statements[..],
        [Stmt::Assignment { .. }]
    ));
}

#[test]
fn test_elif_chain() {
    let stmts = parse_ok("if a:\n  b = 1\nelif c:\n  b = 2\nelif d:\n  b = 3\nelse:\n  b = 4");
    let Stmt::Conditional {
        blocks,
        false_statements,
        ..
    } = &stmts[0]
    else {
        panic!("expected conditional, got {:?}", stmts[0]);
    };
    assert_eq!(blocks.len(), 3);
    assert_eq!(false_statements.len(), 1);
}

#[test]
fn test_not_enough_indentation() {
    // Scenario: the inner while dedents below its enclosing block
    let err = parse_err("func test():\n while true:\n  let a = 1\n  while false:\n let b = 1");
    assert!(
        matches!(err, ParseError::NotEnoughIndentation { .. }),
        "got {:?}",
        err
    );
}

#[test]
fn test_indentation_mismatch_reports_expectation() {
    let err = parse_err("  a = 1");
    match err {
        ParseError::IndentationMismatch {
            expected_count,
            expected_char,
            ..
        } => {
            assert_eq!(expected_count, 0);
            assert_eq!(expected_char, ' ');
        }
        other => panic!("expected indentation mismatch, got {:?}", other),
    }
}

#[test]
fn test_mixed_indentation_rejected() {
    let err = parse_err("while true:\n \ta = 1");
    assert!(
        matches!(err, ParseError::MixedIndentation { .. }),
        "got {:?}",
        err
    );
}

#[test]
fn test_tab_indentation_accepted() {
    let stmts = parse_ok("while true:\n\ta = 1\n\tb = 2");
    let Stmt::Loop { body, .. } = &stmts[0] else {
        panic!("expected loop, got {:?}", stmts[0]);
    };
    assert_eq!(body.len(), 2);
}

#[test]
fn test_block_char_must_match_outer() {
    // Outer block indents with spaces, inner with tabs
    let err = parse_err("func f():\n  while true:\n\t\t\ta = 1");
    assert!(
        matches!(err, ParseError::MixedIndentation { .. }),
        "got {:?}",
        err
    );
}

#[test]
fn test_semicolon_separates_statements_on_one_line() {
    let stmts = parse_ok("a = 1; b = 2; c = 3");
    assert_eq!(stmts.len(), 3);
}

#[test]
fn test_semicolon_inside_block() {
    let stmts = parse_ok("while x:\n  a = 1; b = 2\n  c = 3");
    let Stmt::Loop { body, .. } = &stmts[0] else {
        panic!("expected loop, got {:?}", stmts[0]);
    };
    assert_eq!(body.len(), 3);
}

#[test]
fn test_nested_blocks() {
    let stmts = parse_ok("while a:\n  while b:\n    c = 1\n  d = 2\ne = 3");
    assert_eq!(stmts.len(), 2);
    let Stmt::Loop { body, .. } = &stmts[0] else {
        panic!("expected loop, got {:?}", stmts[0]);
    };
    assert_eq!(body.len(), 2);
    assert!(matches!(&body[0], Stmt::Loop { body, .. } if body.len() == 1));
}

#[test]
fn test_labeled_loop_and_break() {
    let stmts = parse_ok("outer: while a:\n  while b:\n    break outer\n    continue");
    let Stmt::Loop { label, body, .. } = &stmts[0] else {
        panic!("expected loop, got {:?}", stmts[0]);
    };
    assert_eq!(label.as_deref(), Some("outer"));
    let Stmt::Loop { body: inner, .. } = &body[0] else {
        panic!("expected inner loop, got {:?}", body[0]);
    };
    assert!(
        matches!(&inner[0], Stmt::Break { label: Some(l), .. } if l == "outer")
    );
    assert!(matches!(&inner[1], Stmt::Continue { label: None, .. }));
}

#[test]
fn test_function_definition() {
    let stmts = parse_ok("func add(sint32 a, sint32 b) sint32:\n  return a + b");
    let Stmt::FunctionDefinition {
        name,
        params,
        return_type,
        body,
        ..
    } = &stmts[0]
    else {
        panic!("expected function, got {:?}", stmts[0]);
    };
    assert_eq!(name, "add");
    assert_eq!(params.len(), 2);
    assert_eq!(params[0].type_name, "sint32");
    assert_eq!(params[0].name, "a");
    assert_eq!(return_type.as_ref().map(|(n, _)| n.as_str()), Some("sint32"));
    assert!(matches!(&body[..], [Stmt::Return { value: Some(_), .. }]));
}

#[test]
fn test_type_definition_with_structure() {
    let stmts = parse_ok("def Input: {a: sint32, b: sint32}");
    let Stmt::TypeDefinition { name, ty, .. } = &stmts[0] else {
        panic!("expected type definition, got {:?}", stmts[0]);
    };
    assert_eq!(name, "Input");
    let Expr::Composite(lit) = ty else {
        panic!("expected composite type, got {:?}", ty);
    };
    assert_eq!(lit.parts.len(), 2);
    assert!(matches!(
        &lit.parts[0].label,
        Some(Label::Name { name, .. }) if name == "a"
    ));
}

#[test]
fn test_array_type_definition() {
    let stmts = parse_ok("def Row: sint32[4]\ndef Open: sint32[]");
    let Stmt::TypeDefinition { ty, .. } = &stmts[0] else {
        panic!("expected type definition");
    };
    assert!(matches!(ty, Expr::IndexAccess { index: Some(_), .. }));
    let Stmt::TypeDefinition { ty, .. } = &stmts[1] else {
        panic!("expected type definition");
    };
    assert!(matches!(ty, Expr::IndexAccess { index: None, .. }));
}

#[test]
fn test_context_field_access() {
    let source = SourceText::new(".a + .b");
    let expr = parse_expression(&source).unwrap();
    let Expr::Binary { op, lhs, rhs, .. } = expr else {
        panic!("expected binary");
    };
    assert_eq!(op, BinaryOp::Add);
    assert!(matches!(&*lhs, Expr::ContextField { name, .. } if name == "a"));
    assert!(matches!(&*rhs, Expr::ContextField { name, .. } if name == "b"));
}

#[test]
fn test_composite_with_other_label() {
    let source = SourceText::new("{1, 2, other: 9}");
    let expr = parse_expression(&source).unwrap();
    let Expr::Composite(lit) = expr else {
        panic!("expected composite");
    };
    assert_eq!(lit.parts.len(), 3);
    assert!(lit.parts[0].label.is_none());
    assert!(matches!(&lit.parts[2].label, Some(Label::Other { .. })));
}

#[test]
fn test_composite_with_index_labels() {
    let source = SourceText::new("{0: 10, 3: 40}");
    let expr = parse_expression(&source).unwrap();
    let Expr::Composite(lit) = expr else {
        panic!("expected composite");
    };
    assert!(matches!(
        &lit.parts[1].label,
        Some(Label::Index { index: 3, .. })
    ));
}

#[test]
fn test_initializer() {
    let source = SourceText::new("Point {x: 1, y: 2}");
    let expr = parse_expression(&source).unwrap();
    let Expr::Initializer {
        type_name, literal, ..
    } = expr
    else {
        panic!("expected initializer");
    };
    assert_eq!(type_name, "Point");
    assert_eq!(literal.parts.len(), 2);
}

#[test]
fn test_precedence() {
    let source = SourceText::new("1 + 2 * 3 ** 2");
    let expr = parse_expression(&source).unwrap();
    assert_eq!(expr.to_string(), "1 + (2 * (3 ** 2))");
}

#[test]
fn test_exponent_left_associative() {
    let source = SourceText::new("2 ** 3 ** 2");
    let expr = parse_expression(&source).unwrap();
    assert_eq!(expr.to_string(), "(2 ** 3) ** 2");
}

#[test]
fn test_compare_chain_with_type_test() {
    let source = SourceText::new("0 <= x < 10 :: sint64");
    let expr = parse_expression(&source).unwrap();
    let Expr::Compare {
        comparisons,
        type_test,
        ..
    } = expr
    else {
        panic!("expected comparison");
    };
    assert_eq!(comparisons.len(), 2);
    assert_eq!(type_test.as_ref().map(|(op, _)| *op), Some(TypeTestOp::Same));
}

#[test]
fn test_conditional_expression() {
    let source = SourceText::new("1 if a else 2 if b else 3");
    let expr = parse_expression(&source).unwrap();
    // Right-associative in the false branch
    assert_eq!(expr.to_string(), "1 if a else (2 if b else 3)");
}

#[test]
fn test_infix_function_call() {
    let source = SourceText::new("a min b min c");
    let expr = parse_expression(&source).unwrap();
    assert_eq!(expr.to_string(), "(a min b) min c");
}

#[test]
fn test_integer_dot_field_access() {
    // The `<digits>.` quirk: not a float when an identifier follows
    let source = SourceText::new("127.max");
    let expr = parse_expression(&source).unwrap();
    let Expr::FieldAccess { value, name, .. } = expr else {
        panic!("expected field access");
    };
    assert!(matches!(&*value, Expr::Integer { text, .. } if text == "127"));
    assert_eq!(name, "max");
}

#[test]
fn test_integer_range() {
    let source = SourceText::new("1..5");
    let expr = parse_expression(&source).unwrap();
    let Expr::Binary { op, .. } = expr else {
        panic!("expected binary");
    };
    assert_eq!(op, BinaryOp::Range);
}

#[test]
fn test_string_escapes() {
    let source = SourceText::new("\"a\\u0041\\n\"");
    let expr = parse_expression(&source).unwrap();
    assert!(matches!(expr, Expr::Str { ref value, .. } if value == "aA\n"));
}

#[test]
fn test_no_parse_recovery() {
    // The first error aborts the parse
    let err = parse_err("let = 1\nlet ok = 2");
    assert!(matches!(err, ParseError::UnexpectedToken { .. }));
}

#[test]
fn test_unexpected_token_has_span() {
    let input = "let x = )";
    let err = parse_err(input);
    let span = err.span();
    // The span pins the ')' token
    assert_eq!(&input[span.start..span.end], ")");
    let source = SourceText::new(input);
    assert_eq!(source.line_col(span.start), (1, 9));
}

// ==================== Round-trip property ====================

fn assert_round_trip(input: &str) {
    let source = SourceText::new(input);
    let first = parse(&source).expect("initial parse");
    let formatted = format_program(&first);

    let reparsed_source = SourceText::new(&formatted);
    let reparsed = parse(&reparsed_source).expect("reparse of formatted output");
    let reformatted = format_program(&reparsed);

    assert_eq!(formatted, reformatted, "formatter not stable for {:?}", input);
}

#[test]
fn test_format_round_trip() {
    for program in [
        "let Test t = 1 + 1",
        "var x = 2 * 3 + 4",
        "if a == 0:\n  let b = 12\nelse:\n  d = 1",
        "if a:\n  b = 1\nelif c:\n  b = 2\nelse:\n  b = 3",
        "outer: while i < 10:\n  i += 1\n  break outer",
        "func add(sint32 a, sint32 b) sint32:\n  return a + b",
        "def Input: {a: sint32, b: sint32}\nreturn .a + .b",
        "let xs = {1, 2, other: 9}",
        "let s = \"a\\nb\"\nlet t = s ~ \"c\"",
        "let r = 1 .. 10",
        "let p = Point {x: 1, y: 2}",
        "let c = 1 if a < b else 2",
        "let m = a min b",
        "x = -1 + +2\ny = !true\nz = ~0xFF",
    ] {
        assert_round_trip(program);
    }
}

#[test]
fn test_expand_operators_round_trip() {
    let source = SourceText::new("a += 1\nb ~= \"x\"");
    let once = expand_operators(parse(&source).unwrap());
    let twice = expand_operators(once.clone());
    assert_eq!(once, twice);
}
