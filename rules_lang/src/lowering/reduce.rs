//! Literal reduction
//!
//! Folds pure subtrees whose operands are literal values into literal
//! nodes: booleans, integers (with overflow checking), floats, string
//! concatenation, and literal conversions. The analyzer folds while it
//! builds, so the standalone [`reduce`] pass is a fixpoint: running it over
//! an analyzed tree changes nothing, and running it twice never differs
//! from running it once.
//!
//! Division and remainder by a literal zero are deliberately left unfolded;
//! they are runtime errors, not analysis errors.

use crate::error::{SourceError, SourceResult};
use crate::ir::core::{BinOp, ExprKind, LogicalOp, TypedExpr, TypedStmt, UnaryOp};
use crate::types::RuleType;
use rules_lang_parser::span::Span;

/// Numeric view of a literal node
enum Lit {
    Int(i128, bool),
    Float(f64),
    Bool(bool),
}

fn literal_value(expr: &TypedExpr) -> Option<Lit> {
    if !matches!(
        expr.ty,
        RuleType::SintLit(_)
            | RuleType::UintLit(_)
            | RuleType::FloatLit(_)
            | RuleType::BoolLit(_)
    ) {
        return None;
    }
    match &expr.kind {
        ExprKind::Sint(v) => Some(Lit::Int(*v as i128, false)),
        ExprKind::Uint(v) => Some(Lit::Int(*v as i128, true)),
        ExprKind::Float(v) => Some(Lit::Float(*v)),
        ExprKind::Bool(v) => Some(Lit::Bool(*v)),
        _ => None,
    }
}

/// Wrap an integer result back into a literal node, checking overflow
fn int_literal(value: i128, span: Span) -> SourceResult<TypedExpr> {
    if let Ok(v) = i64::try_from(value) {
        return Ok(TypedExpr {
            ty: RuleType::SintLit(v),
            span,
            kind: ExprKind::Sint(v),
        });
    }
    if let Ok(v) = u64::try_from(value) {
        return Ok(TypedExpr {
            ty: RuleType::UintLit(v),
            span,
            kind: ExprKind::Uint(v),
        });
    }
    Err(SourceError::semantic("Integer overflow", span))
}

fn float_literal(value: f64, span: Span) -> SourceResult<TypedExpr> {
    if !value.is_finite() {
        return Err(SourceError::semantic("Float overflow", span));
    }
    Ok(TypedExpr {
        ty: RuleType::FloatLit(value),
        span,
        kind: ExprKind::Float(value),
    })
}

fn bool_literal(value: bool, span: Span) -> TypedExpr {
    TypedExpr {
        ty: RuleType::BoolLit(value),
        span,
        kind: ExprKind::Bool(value),
    }
}

/// Fold a binary operator over two literal operands. Returns `Ok(None)`
/// when the operands are not both literals, or when folding must be left
/// to the runtime (division by a literal zero).
pub fn try_fold_binary(
    op: BinOp,
    lhs: &TypedExpr,
    rhs: &TypedExpr,
    span: Span,
) -> SourceResult<Option<TypedExpr>> {
    let (Some(a), Some(b)) = (literal_value(lhs), literal_value(rhs)) else {
        return Ok(None);
    };
    match (a, b) {
        (Lit::Int(a, a_unsigned), Lit::Int(b, b_unsigned)) => {
            fold_int_binary(op, a, a_unsigned, b, b_unsigned, span)
        }
        (Lit::Int(a, _), Lit::Float(b)) => fold_float_binary(op, a as f64, b, span),
        (Lit::Float(a), Lit::Int(b, _)) => fold_float_binary(op, a, b as f64, span),
        (Lit::Float(a), Lit::Float(b)) => fold_float_binary(op, a, b, span),
        (Lit::Bool(a), Lit::Bool(b)) => match op {
            BinOp::Eq => Ok(Some(bool_literal(a == b, span))),
            BinOp::Ne => Ok(Some(bool_literal(a != b, span))),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

fn fold_int_binary(
    op: BinOp,
    a: i128,
    a_unsigned: bool,
    b: i128,
    b_unsigned: bool,
    span: Span,
) -> SourceResult<Option<TypedExpr>> {
    let overflow = || SourceError::semantic("Integer overflow", span);
    let bits_a = a as u64;
    let bits_b = b as u64;
    let unsigned = a_unsigned || b_unsigned;
    let from_bits = |bits: u64| {
        if unsigned {
            int_literal(bits as i128, span)
        } else {
            int_literal(bits as i64 as i128, span)
        }
    };

    let result = match op {
        BinOp::Add => int_literal(a.checked_add(b).ok_or_else(overflow)?, span)?,
        BinOp::Sub => int_literal(a.checked_sub(b).ok_or_else(overflow)?, span)?,
        BinOp::Mul => int_literal(a.checked_mul(b).ok_or_else(overflow)?, span)?,
        BinOp::Div | BinOp::Rem if b == 0 => return Ok(None),
        BinOp::Div => int_literal(a.checked_div(b).ok_or_else(overflow)?, span)?,
        BinOp::Rem => int_literal(a.checked_rem(b).ok_or_else(overflow)?, span)?,
        BinOp::Pow => {
            if b < 0 {
                return Err(SourceError::semantic("Negative exponent", span));
            }
            let exp = u32::try_from(b).map_err(|_| overflow())?;
            int_literal(a.checked_pow(exp).ok_or_else(overflow)?, span)?
        }
        BinOp::Shl | BinOp::Shr | BinOp::Ushr => {
            if !(0..64).contains(&b) {
                return Err(SourceError::semantic("Invalid shift amount", span));
            }
            let shifted = match op {
                BinOp::Shl => bits_a << b,
                BinOp::Ushr => bits_a >> b,
                _ => ((a as i64) >> b) as u64,
            };
            from_bits(shifted)?
        }
        BinOp::BitAnd => from_bits(bits_a & bits_b)?,
        BinOp::BitOr => from_bits(bits_a | bits_b)?,
        BinOp::BitXor => from_bits(bits_a ^ bits_b)?,
        BinOp::Eq => bool_literal(a == b, span),
        BinOp::Ne => bool_literal(a != b, span),
        BinOp::Lt => bool_literal(a < b, span),
        BinOp::Le => bool_literal(a <= b, span),
        BinOp::Gt => bool_literal(a > b, span),
        BinOp::Ge => bool_literal(a >= b, span),
        BinOp::AddrEq | BinOp::AddrNe => return Ok(None),
    };
    Ok(Some(result))
}

fn fold_float_binary(op: BinOp, a: f64, b: f64, span: Span) -> SourceResult<Option<TypedExpr>> {
    let result = match op {
        BinOp::Add => float_literal(a + b, span)?,
        BinOp::Sub => float_literal(a - b, span)?,
        BinOp::Mul => float_literal(a * b, span)?,
        BinOp::Div if b == 0.0 => return Ok(None),
        BinOp::Div => float_literal(a / b, span)?,
        BinOp::Rem if b == 0.0 => return Ok(None),
        BinOp::Rem => float_literal(a % b, span)?,
        BinOp::Pow => float_literal(a.powf(b), span)?,
        BinOp::Eq => bool_literal(a == b, span),
        BinOp::Ne => bool_literal(a != b, span),
        BinOp::Lt => bool_literal(a < b, span),
        BinOp::Le => bool_literal(a <= b, span),
        BinOp::Gt => bool_literal(a > b, span),
        BinOp::Ge => bool_literal(a >= b, span),
        _ => return Ok(None),
    };
    Ok(Some(result))
}

/// Fold the top node of an expression whose children are already reduced
pub fn fold_shallow(expr: TypedExpr) -> SourceResult<TypedExpr> {
    let span = expr.span;
    match expr.kind {
        ExprKind::Unary { op, operand } => {
            let Some(value) = literal_value(&operand) else {
                return Ok(TypedExpr {
                    ty: expr.ty,
                    span,
                    kind: ExprKind::Unary { op, operand },
                });
            };
            let folded = match (op, value) {
                (UnaryOp::Negate, Lit::Int(v, _)) => Some(int_literal(-v, span)?),
                (UnaryOp::Negate, Lit::Float(v)) => Some(float_literal(-v, span)?),
                (UnaryOp::Not, Lit::Bool(v)) => Some(bool_literal(!v, span)),
                (UnaryOp::BitNot, Lit::Int(v, unsigned)) => Some(if unsigned {
                    int_literal((!(v as u64)) as i128, span)?
                } else {
                    int_literal(!(v as i64) as i128, span)?
                }),
                _ => None,
            };
            Ok(match folded {
                Some(folded) => folded,
                None => TypedExpr {
                    ty: expr.ty,
                    span,
                    kind: ExprKind::Unary { op, operand },
                },
            })
        }
        ExprKind::Binary { op, lhs, rhs } => {
            if let Some(folded) = try_fold_binary(op, &lhs, &rhs, span)? {
                return Ok(folded);
            }
            Ok(TypedExpr {
                ty: expr.ty,
                span,
                kind: ExprKind::Binary { op, lhs, rhs },
            })
        }
        ExprKind::Logical { op, lhs, rhs } => {
            if let (Some(Lit::Bool(a)), Some(Lit::Bool(b))) =
                (literal_value(&lhs), literal_value(&rhs))
            {
                let value = match op {
                    LogicalOp::And => a && b,
                    LogicalOp::Or => a || b,
                    LogicalOp::Xor => a != b,
                };
                return Ok(bool_literal(value, span));
            }
            Ok(TypedExpr {
                ty: expr.ty,
                span,
                kind: ExprKind::Logical { op, lhs, rhs },
            })
        }
        ExprKind::Concat { lhs, rhs } => {
            if let (
                RuleType::StrLit {
                    encoding, value: a, ..
                },
                RuleType::StrLit { value: b, .. },
            ) = (&lhs.ty, &rhs.ty)
            {
                if matches!(lhs.kind, ExprKind::Str { .. })
                    && matches!(rhs.kind, ExprKind::Str { .. })
                {
                    let encoding = *encoding;
                    let value = format!("{}{}", a, b);
                    return Ok(TypedExpr {
                        ty: RuleType::StrLit {
                            encoding,
                            value: value.clone(),
                        },
                        span,
                        kind: ExprKind::Str { encoding, value },
                    });
                }
            }
            Ok(TypedExpr {
                ty: expr.ty,
                span,
                kind: ExprKind::Concat { lhs, rhs },
            })
        }
        ExprKind::Convert { value } => fold_convert(expr.ty, value, span),
        ExprKind::Conditional {
            condition,
            truthy,
            falsy,
        } => {
            if let ExprKind::Bool(c) = condition.kind {
                return Ok(if c { *truthy } else { *falsy });
            }
            Ok(TypedExpr {
                ty: expr.ty,
                span,
                kind: ExprKind::Conditional {
                    condition,
                    truthy,
                    falsy,
                },
            })
        }
        kind => Ok(TypedExpr {
            ty: expr.ty,
            span,
            kind,
        }),
    }
}

/// Fold a conversion of a literal into a retyped literal. Conversions that
/// need the heap (string to array, composite widening) stay as nodes.
fn fold_convert(target: RuleType, value: Box<TypedExpr>, span: Span) -> SourceResult<TypedExpr> {
    let folded = match (&target, &value.kind) {
        (t, ExprKind::Sint(v)) if t.is_signed_int() || matches!(t, RuleType::SintLit(_)) => {
            Some(ExprKind::Sint(*v))
        }
        (t, ExprKind::Sint(v)) if t.is_unsigned_int() => Some(ExprKind::Uint(*v as u64)),
        (t, ExprKind::Uint(v)) if t.is_unsigned_int() || matches!(t, RuleType::UintLit(_)) => {
            Some(ExprKind::Uint(*v))
        }
        (t, ExprKind::Uint(v)) if t.is_signed_int() => Some(ExprKind::Sint(*v as i64)),
        (t, ExprKind::Sint(v)) if t.is_float() => Some(ExprKind::Float(*v as f64)),
        (t, ExprKind::Uint(v)) if t.is_float() => Some(ExprKind::Float(*v as f64)),
        (t, ExprKind::Float(v)) if t.is_float() || matches!(t, RuleType::FloatLit(_)) => {
            Some(ExprKind::Float(*v))
        }
        (RuleType::Bool, ExprKind::Bool(v)) => Some(ExprKind::Bool(*v)),
        // Re-encoding a string literal keeps its value.
        (RuleType::StrLit { encoding, .. }, ExprKind::Str { value: v, .. }) => {
            Some(ExprKind::Str {
                encoding: *encoding,
                value: v.clone(),
            })
        }
        _ => None,
    };
    Ok(match folded {
        Some(kind) => TypedExpr {
            ty: target,
            span,
            kind,
        },
        None => TypedExpr {
            ty: target,
            span,
            kind: ExprKind::Convert { value },
        },
    })
}

/// Deep bottom-up reduction of an expression
pub fn reduce(expr: TypedExpr) -> SourceResult<TypedExpr> {
    let span = expr.span;
    let ty = expr.ty;
    let kind = match expr.kind {
        ExprKind::Unary { op, operand } => ExprKind::Unary {
            op,
            operand: Box::new(reduce(*operand)?),
        },
        ExprKind::Binary { op, lhs, rhs } => ExprKind::Binary {
            op,
            lhs: Box::new(reduce(*lhs)?),
            rhs: Box::new(reduce(*rhs)?),
        },
        ExprKind::Logical { op, lhs, rhs } => ExprKind::Logical {
            op,
            lhs: Box::new(reduce(*lhs)?),
            rhs: Box::new(reduce(*rhs)?),
        },
        ExprKind::Concat { lhs, rhs } => ExprKind::Concat {
            lhs: Box::new(reduce(*lhs)?),
            rhs: Box::new(reduce(*rhs)?),
        },
        ExprKind::Convert { value } => ExprKind::Convert {
            value: Box::new(reduce(*value)?),
        },
        ExprKind::Conditional {
            condition,
            truthy,
            falsy,
        } => ExprKind::Conditional {
            condition: Box::new(reduce(*condition)?),
            truthy: Box::new(reduce(*truthy)?),
            falsy: Box::new(reduce(*falsy)?),
        },
        ExprKind::FieldAccess { value, name, index } => ExprKind::FieldAccess {
            value: Box::new(reduce(*value)?),
            name,
            index,
        },
        ExprKind::IndexAccess { value, index } => ExprKind::IndexAccess {
            value: Box::new(reduce(*value)?),
            index: Box::new(reduce(*index)?),
        },
        ExprKind::Call { function, args } => ExprKind::Call {
            function,
            args: args.into_iter().map(reduce).collect::<SourceResult<_>>()?,
        },
        ExprKind::TupleLiteral { values } => ExprKind::TupleLiteral {
            values: reduce_optional(values)?,
        },
        ExprKind::StructLiteral { values } => ExprKind::StructLiteral {
            values: reduce_optional(values)?,
        },
        ExprKind::ArrayLiteral { values, other } => ExprKind::ArrayLiteral {
            values: reduce_optional(values)?,
            other: match other {
                Some(other) => Some(Box::new(reduce(*other)?)),
                None => None,
            },
        },
        ExprKind::RangeArray { lo, hi } => ExprKind::RangeArray {
            lo: Box::new(reduce(*lo)?),
            hi: Box::new(reduce(*hi)?),
        },
        leaf => leaf,
    };
    fold_shallow(TypedExpr { ty, span, kind })
}

fn reduce_optional(values: Vec<Option<TypedExpr>>) -> SourceResult<Vec<Option<TypedExpr>>> {
    values
        .into_iter()
        .map(|v| v.map(reduce).transpose())
        .collect()
}

/// Reduce every expression in a statement list (the standalone pass form)
pub fn reduce_statements(stmts: Vec<TypedStmt>) -> SourceResult<Vec<TypedStmt>> {
    stmts.into_iter().map(reduce_statement).collect()
}

fn reduce_statement(stmt: TypedStmt) -> SourceResult<TypedStmt> {
    Ok(match stmt {
        TypedStmt::Declare {
            slot,
            ty,
            value,
            span,
        } => TypedStmt::Declare {
            slot,
            ty,
            value: value.map(reduce).transpose()?,
            span,
        },
        TypedStmt::AssignLocal { slot, value, span } => TypedStmt::AssignLocal {
            slot,
            value: reduce(value)?,
            span,
        },
        TypedStmt::AssignMember {
            object,
            name,
            index,
            value,
            span,
        } => TypedStmt::AssignMember {
            object: reduce(object)?,
            name,
            index,
            value: reduce(value)?,
            span,
        },
        TypedStmt::AssignElement {
            object,
            index,
            value,
            span,
        } => TypedStmt::AssignElement {
            object: reduce(object)?,
            index: reduce(index)?,
            value: reduce(value)?,
            span,
        },
        TypedStmt::Call { call, span } => TypedStmt::Call {
            call: reduce(call)?,
            span,
        },
        TypedStmt::If { arms, falsy, span } => TypedStmt::If {
            arms: arms
                .into_iter()
                .map(|(cond, body)| Ok((reduce(cond)?, reduce_statements(body)?)))
                .collect::<SourceResult<_>>()?,
            falsy: reduce_statements(falsy)?,
            span,
        },
        TypedStmt::While {
            label,
            condition,
            body,
            span,
        } => TypedStmt::While {
            label,
            condition: reduce(condition)?,
            body: reduce_statements(body)?,
            span,
        },
        TypedStmt::Return { value, span } => TypedStmt::Return {
            value: value.map(reduce).transpose()?,
            span,
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sint(v: i64) -> TypedExpr {
        TypedExpr {
            ty: RuleType::SintLit(v),
            span: Span::empty(),
            kind: ExprKind::Sint(v),
        }
    }

    #[test]
    fn test_fold_addition() {
        let folded = try_fold_binary(BinOp::Add, &sint(1), &sint(1), Span::empty())
            .unwrap()
            .unwrap();
        assert_eq!(folded.ty, RuleType::SintLit(2));
        assert_eq!(folded.kind, ExprKind::Sint(2));
    }

    #[test]
    fn test_fold_overflow_is_an_error() {
        let err = try_fold_binary(BinOp::Add, &sint(i64::MAX), &sint(1), Span::empty());
        // i64::MAX + 1 still fits u64, so it widens rather than failing
        assert_eq!(
            err.unwrap().unwrap().ty,
            RuleType::UintLit(i64::MAX as u64 + 1)
        );
        let uint_max = TypedExpr {
            ty: RuleType::UintLit(u64::MAX),
            span: Span::empty(),
            kind: ExprKind::Uint(u64::MAX),
        };
        let err = try_fold_binary(BinOp::Add, &uint_max, &sint(1), Span::empty());
        assert!(err.is_err());
    }

    #[test]
    fn test_division_by_literal_zero_is_left_for_runtime() {
        let folded = try_fold_binary(BinOp::Div, &sint(1), &sint(0), Span::empty()).unwrap();
        assert!(folded.is_none());
    }

    #[test]
    fn test_fold_negate_at_boundary() {
        // -(2^63) folds to i64::MIN through the unsigned literal
        let big = TypedExpr {
            ty: RuleType::UintLit(1 << 63),
            span: Span::empty(),
            kind: ExprKind::Uint(1 << 63),
        };
        let negated = fold_shallow(TypedExpr {
            ty: big.ty.clone(),
            span: Span::empty(),
            kind: ExprKind::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(big),
            },
        })
        .unwrap();
        assert_eq!(negated.ty, RuleType::SintLit(i64::MIN));
    }

    #[test]
    fn test_fold_compare_chain_parts() {
        let folded = try_fold_binary(BinOp::Lt, &sint(1), &sint(2), Span::empty())
            .unwrap()
            .unwrap();
        assert_eq!(folded.ty, RuleType::BoolLit(true));
    }

    #[test]
    fn test_reduce_is_idempotent() {
        let tree = TypedExpr {
            ty: RuleType::SintLit(0),
            span: Span::empty(),
            kind: ExprKind::Binary {
                op: BinOp::Mul,
                lhs: Box::new(sint(6)),
                rhs: Box::new(TypedExpr {
                    ty: RuleType::SintLit(0),
                    span: Span::empty(),
                    kind: ExprKind::Binary {
                        op: BinOp::Add,
                        lhs: Box::new(sint(3)),
                        rhs: Box::new(sint(4)),
                    },
                }),
            },
        };
        let once = reduce(tree).unwrap();
        assert_eq!(once.ty, RuleType::SintLit(42));
        let twice = reduce(once.clone()).unwrap();
        assert_eq!(once, twice);
    }
}
