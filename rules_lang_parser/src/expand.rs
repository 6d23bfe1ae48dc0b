//! Operator expander
//!
//! Rewrites every compound assignment `a op= b` into `a = a op b` on the
//! syntactic tree, before semantic analysis. The rewrite recurses into all
//! nested blocks and is idempotent: an already-expanded tree has no compound
//! assignments left to rewrite.

use crate::ast::{Expr, Stmt};

/// Expand compound assignments in a whole program
pub fn expand_operators(stmts: Vec<Stmt>) -> Vec<Stmt> {
    stmts.into_iter().map(expand_statement).collect()
}

fn expand_statement(stmt: Stmt) -> Stmt {
    match stmt {
        Stmt::Assignment {
            target,
            op: Some((op, op_span)),
            value,
            span,
        } => {
            // The rewritten binary node adopts the assignment operator's
            // start offset.
            let value_span = op_span.merge(&value.span());
            let value = Expr::Binary {
                op,
                lhs: Box::new(target.clone()),
                rhs: Box::new(value),
                span: value_span,
            };
            Stmt::Assignment {
                target,
                op: None,
                value,
                span,
            }
        }
        Stmt::Conditional {
            blocks,
            false_statements,
            span,
        } => Stmt::Conditional {
            blocks: blocks
                .into_iter()
                .map(|mut block| {
                    block.statements = expand_operators(block.statements);
                    block
                })
                .collect(),
            false_statements: expand_operators(false_statements),
            span,
        },
        Stmt::Loop {
            label,
            condition,
            body,
            span,
        } => Stmt::Loop {
            label,
            condition,
            body: expand_operators(body),
            span,
        },
        Stmt::FunctionDefinition {
            name,
            params,
            return_type,
            body,
            span,
        } => Stmt::FunctionDefinition {
            name,
            params,
            return_type,
            body: expand_operators(body),
            span,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::source::SourceText;
    use pretty_assertions::assert_eq;

    fn parse_and_expand(input: &str) -> Vec<Stmt> {
        let source = SourceText::new(input);
        expand_operators(parse(&source).unwrap())
    }

    #[test]
    fn test_expands_compound_assignment() {
        let stmts = parse_and_expand("a += 1");
        let Stmt::Assignment { op, value, .. } = &stmts[0] else {
            panic!("expected assignment, got {:?}", stmts[0]);
        };
        assert_eq!(*op, None);
        assert!(matches!(
            value,
            Expr::Binary {
                op: crate::ast::BinaryOp::Add,
                ..
            }
        ));
    }

    #[test]
    fn test_rewritten_node_starts_at_the_operator() {
        // "a += 1": the new binary node's span begins at the `+=` token,
        // not at the assignment target.
        let stmts = parse_and_expand("a += 1");
        let Stmt::Assignment { value, .. } = &stmts[0] else {
            panic!("expected assignment, got {:?}", stmts[0]);
        };
        assert_eq!(value.span().start, 2);
        assert_eq!(value.span().end, 6);
    }

    #[test]
    fn test_expands_inside_blocks() {
        let stmts = parse_and_expand("while true:\n  a ~= b\n");
        let Stmt::Loop { body, .. } = &stmts[0] else {
            panic!("expected loop, got {:?}", stmts[0]);
        };
        let Stmt::Assignment { op, value, .. } = &body[0] else {
            panic!("expected assignment, got {:?}", body[0]);
        };
        assert_eq!(*op, None);
        assert!(matches!(
            value,
            Expr::Binary {
                op: crate::ast::BinaryOp::Concatenate,
                ..
            }
        ));
    }

    #[test]
    fn test_idempotent() {
        let once = parse_and_expand("a **= 2; b = 1");
        let twice = expand_operators(once.clone());
        assert_eq!(once, twice);
    }
}
