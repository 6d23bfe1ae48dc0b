//! Expression analysis
//!
//! Types every expression, narrows integer literals against atomic
//! operands, inserts explicit conversion nodes, folds literal subtrees as
//! they are built, resolves overloads by specificity, and decomposes
//! composite literals into the layout order of their target type.

use super::reduce;
use super::Lowering;
use crate::error::{SourceError, SourceResult};
use crate::ir::core::{BinOp, ExprKind, LogicalOp, TypedExpr, UnaryOp};
use crate::types::{RuleType, StrEncoding};
use rules_lang_parser::ast::{
    BinaryOp, CompareOp, CompositeLiteral, Expr, Label, TypeTestOp,
};
use rules_lang_parser::parser::literals::{decode_float, decode_integer};
use rules_lang_parser::span::Span;

impl Lowering {
    /// Analyze an expression with no target type
    pub(crate) fn lower_expr(&mut self, expr: &Expr) -> SourceResult<TypedExpr> {
        match expr {
            Expr::Integer { text, span } => {
                let value = decode_integer(text).ok_or_else(|| {
                    SourceError::semantic_with_offender("Integer literal overflows", text, *span)
                })?;
                Ok(if value <= i64::MAX as u64 {
                    TypedExpr {
                        ty: RuleType::SintLit(value as i64),
                        span: *span,
                        kind: ExprKind::Sint(value as i64),
                    }
                } else {
                    TypedExpr {
                        ty: RuleType::UintLit(value),
                        span: *span,
                        kind: ExprKind::Uint(value),
                    }
                })
            }
            Expr::Float { text, span } => {
                let value = decode_float(text).filter(|v| v.is_finite()).ok_or_else(|| {
                    SourceError::semantic_with_offender("Float literal overflows", text, *span)
                })?;
                Ok(TypedExpr {
                    ty: RuleType::FloatLit(value),
                    span: *span,
                    kind: ExprKind::Float(value),
                })
            }
            Expr::Str { value, span } => Ok(TypedExpr {
                ty: RuleType::StrLit {
                    encoding: StrEncoding::Utf8,
                    value: value.clone(),
                },
                span: *span,
                kind: ExprKind::Str {
                    encoding: StrEncoding::Utf8,
                    value: value.clone(),
                },
            }),
            Expr::Boolean { value, span } => Ok(TypedExpr {
                ty: RuleType::BoolLit(*value),
                span: *span,
                kind: ExprKind::Bool(*value),
            }),
            Expr::Null { span } => Ok(TypedExpr {
                ty: RuleType::NullLit,
                span: *span,
                kind: ExprKind::Null,
            }),
            Expr::Name { name, span } => self.lower_name(name, *span),
            Expr::ContextField { name, span } => self.lower_context_field(name, *span),
            Expr::FieldAccess { value, name, span } => self.lower_field_access(value, name, *span),
            Expr::IndexAccess { value, index, span } => {
                self.lower_index_access(value, index.as_deref(), *span)
            }
            Expr::Call { value, args, span } => self.lower_call(value, args, *span, false),
            Expr::Sign {
                negative,
                operand,
                span,
            } => self.lower_sign(*negative, operand, *span),
            Expr::LogicalNot { operand, span } => self.lower_logical_not(operand, *span),
            Expr::BitwiseNot { operand, span } => self.lower_bitwise_not(operand, *span),
            Expr::Binary { op, lhs, rhs, span } => self.lower_binary(*op, lhs, rhs, *span),
            Expr::Compare {
                first,
                comparisons,
                type_test,
                span,
            } => self.lower_compare(first, comparisons, type_test.as_ref(), *span),
            Expr::Infix {
                name,
                lhs,
                rhs,
                span,
            } => {
                let args = vec![self.lower_expr(lhs)?, self.lower_expr(rhs)?];
                self.resolve_call(name, *span, args, *span, false)
            }
            Expr::Conditional {
                truthy,
                condition,
                falsy,
                span,
            } => self.lower_conditional(truthy, condition, falsy, *span),
            Expr::Composite(lit) => self.lower_composite(lit, None),
            Expr::Initializer {
                type_name,
                type_span,
                literal,
                span,
            } => {
                let ty = self
                    .context
                    .lookup_type(type_name)
                    .cloned()
                    .ok_or_else(|| {
                        SourceError::semantic_with_offender(
                            format!("Unknown type '{}'", type_name),
                            type_name,
                            *type_span,
                        )
                    })?;
                let mut lowered = self.lower_composite(literal, Some(&ty))?;
                lowered.span = *span;
                Ok(lowered)
            }
        }
    }

    /// Analyze an expression toward a target type, inserting the conversion
    pub(crate) fn lower_expr_with_target(
        &mut self,
        expr: &Expr,
        target: &RuleType,
    ) -> SourceResult<TypedExpr> {
        match expr {
            Expr::Composite(lit) => self.lower_composite(lit, Some(target)),
            _ => {
                let lowered = self.lower_expr(expr)?;
                self.convert(lowered, target)
            }
        }
    }

    /// Insert an explicit conversion to `target`, folding literal retypes
    pub(crate) fn convert(&self, expr: TypedExpr, target: &RuleType) -> SourceResult<TypedExpr> {
        if expr.ty == *target {
            return Ok(expr);
        }
        if !expr.ty.convertible_to(target) {
            return Err(SourceError::semantic(
                format!("Cannot convert {} to {}", expr.ty, target),
                expr.span,
            ));
        }
        let span = expr.span;
        reduce::fold_shallow(TypedExpr {
            ty: target.clone(),
            span,
            kind: ExprKind::Convert {
                value: Box::new(expr),
            },
        })
    }

    fn lower_name(&mut self, name: &str, span: Span) -> SourceResult<TypedExpr> {
        if let Some(variable) = self.context.variable(name) {
            return Ok(TypedExpr {
                ty: variable.ty.clone(),
                span,
                kind: ExprKind::ReadLocal {
                    slot: variable.slot,
                },
            });
        }
        if self.context.lookup_type(name).is_some() {
            return Err(SourceError::semantic_with_offender(
                format!("'{}' is a type, not a value", name),
                name,
                span,
            ));
        }
        Err(SourceError::semantic_with_offender(
            format!("Unknown name '{}'", name),
            name,
            span,
        ))
    }

    fn lower_context_field(&mut self, name: &str, span: Span) -> SourceResult<TypedExpr> {
        let RuleType::Structure { members } = &self.input_type else {
            return Err(SourceError::semantic("The rule input is not a structure", span));
        };
        let Some(index) = members.iter().position(|(n, _)| n == name) else {
            return Err(SourceError::semantic_with_offender(
                format!("The rule input has no member '{}'", name),
                name,
                span,
            ));
        };
        Ok(TypedExpr {
            ty: members[index].1.clone(),
            span,
            kind: ExprKind::ContextField {
                name: name.to_string(),
                index,
            },
        })
    }

    fn lower_field_access(
        &mut self,
        value: &Expr,
        name: &str,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        // A field access over a bare type name is static member lookup,
        // which evaluation leaves unimplemented.
        if let Expr::Name {
            name: base_name, ..
        } = value
        {
            if self.context.variable(base_name).is_none()
                && self.context.lookup_type(base_name).is_some()
            {
                return Ok(TypedExpr {
                    ty: RuleType::Any,
                    span,
                    kind: ExprKind::StaticField {
                        type_name: base_name.clone(),
                        name: name.to_string(),
                    },
                });
            }
        }

        let object = self.lower_expr(value)?;
        match &object.ty {
            RuleType::Structure { members } => {
                let Some(index) = members.iter().position(|(n, _)| n == name) else {
                    return Err(SourceError::semantic_with_offender(
                        format!("{} has no member '{}'", object.ty, name),
                        name,
                        span,
                    ));
                };
                Ok(TypedExpr {
                    ty: members[index].1.clone(),
                    span,
                    kind: ExprKind::FieldAccess {
                        value: Box::new(object),
                        name: name.to_string(),
                        index,
                    },
                })
            }
            RuleType::Tuple(_) => Err(SourceError::semantic(
                "Tuple members are accessed by index",
                span,
            )),
            other => Err(SourceError::semantic(
                format!("{} has no members", other),
                span,
            )),
        }
    }

    fn lower_index_access(
        &mut self,
        value: &Expr,
        index: Option<&Expr>,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        let Some(index) = index else {
            return Err(SourceError::semantic("Expected an index", span));
        };
        let object = self.lower_expr(value)?;
        match object.ty.clone() {
            RuleType::Array { component, .. } => {
                let index = self.lower_array_index(index)?;
                Ok(TypedExpr {
                    ty: *component,
                    span,
                    kind: ExprKind::IndexAccess {
                        value: Box::new(object),
                        index: Box::new(index),
                    },
                })
            }
            RuleType::StrLit { encoding, .. } => {
                let index = self.lower_array_index(index)?;
                Ok(TypedExpr {
                    ty: encoding.unit_atomic(),
                    span,
                    kind: ExprKind::IndexAccess {
                        value: Box::new(object),
                        index: Box::new(index),
                    },
                })
            }
            RuleType::Tuple(members) => {
                let position = constant_index(index, members.len(), span)?;
                Ok(TypedExpr {
                    ty: members[position].clone(),
                    span,
                    kind: ExprKind::FieldAccess {
                        value: Box::new(object),
                        name: String::new(),
                        index: position,
                    },
                })
            }
            RuleType::Structure { members } => {
                let position = constant_index(index, members.len(), span)?;
                let (name, ty) = members[position].clone();
                Ok(TypedExpr {
                    ty,
                    span,
                    kind: ExprKind::FieldAccess {
                        value: Box::new(object),
                        name,
                        index: position,
                    },
                })
            }
            other => Err(SourceError::semantic(
                format!("{} cannot be indexed", other),
                span,
            )),
        }
    }

    pub(crate) fn lower_array_index(&mut self, index: &Expr) -> SourceResult<TypedExpr> {
        let lowered = self.lower_expr(index)?;
        let narrowed = lowered.ty.narrow_against(&RuleType::Sint64);
        if !narrowed.is_integer() && !narrowed.is_integer_literal() {
            return Err(SourceError::semantic(
                format!("Array indices are integers, found {}", lowered.ty),
                lowered.span,
            ));
        }
        if narrowed == lowered.ty {
            Ok(lowered)
        } else {
            self.convert(lowered, &narrowed)
        }
    }

    fn lower_call(
        &mut self,
        value: &Expr,
        args: &[Expr],
        span: Span,
        allow_void: bool,
    ) -> SourceResult<TypedExpr> {
        let Expr::Name { name, span: name_span } = value else {
            return Err(SourceError::semantic(
                "Only named functions can be called",
                value.span(),
            ));
        };
        let args = args
            .iter()
            .map(|arg| self.lower_expr(arg))
            .collect::<SourceResult<Vec<_>>>()?;
        self.resolve_call(name, *name_span, args, span, allow_void)
    }

    /// Overload resolution by pointwise specificity
    pub(crate) fn resolve_call(
        &mut self,
        name: &str,
        name_span: Span,
        args: Vec<TypedExpr>,
        span: Span,
        allow_void: bool,
    ) -> SourceResult<TypedExpr> {
        let overloads = self.context.function_overloads(name);
        if overloads.is_empty() {
            let message = if self.context.variable(name).is_some() {
                format!("'{}' is not a function", name)
            } else {
                format!("Unknown function '{}'", name)
            };
            return Err(SourceError::semantic_with_offender(message, name, name_span));
        }

        let applicable: Vec<usize> = overloads
            .into_iter()
            .filter(|&index| {
                let params = &self.functions[index].params;
                params.len() == args.len()
                    && args
                        .iter()
                        .zip(params)
                        .all(|(arg, param)| arg.ty.convertible_to(&param.ty))
            })
            .collect();

        if applicable.is_empty() {
            let arg_types: Vec<String> = args.iter().map(|a| a.ty.to_string()).collect();
            return Err(SourceError::semantic_with_offender(
                format!("No overload of '{}' accepts ({})", name, arg_types.join(", ")),
                name,
                span,
            ));
        }

        // More specific = every parameter converts into the other's.
        let more_specific = |a: usize, b: usize| {
            self.functions[a]
                .params
                .iter()
                .zip(&self.functions[b].params)
                .all(|(pa, pb)| pa.ty.convertible_to(&pb.ty))
        };
        let minimal: Vec<usize> = applicable
            .iter()
            .copied()
            .filter(|&candidate| {
                !applicable
                    .iter()
                    .any(|&other| {
                        other != candidate
                            && more_specific(other, candidate)
                            && !more_specific(candidate, other)
                    })
            })
            .collect();
        if minimal.len() != 1 {
            return Err(SourceError::semantic_with_offender(
                format!("Ambiguous call to '{}'", name),
                name,
                span,
            ));
        }
        let function = minimal[0];

        let params: Vec<RuleType> = self.functions[function]
            .params
            .iter()
            .map(|p| p.ty.clone())
            .collect();
        let args = args
            .into_iter()
            .zip(&params)
            .map(|(arg, param)| self.convert(arg, param))
            .collect::<SourceResult<Vec<_>>>()?;

        let ty = match &self.functions[function].return_type {
            Some(ty) => ty.clone(),
            None if allow_void => RuleType::NullLit,
            None => {
                return Err(SourceError::semantic_with_offender(
                    format!("Function '{}' returns no value", name),
                    name,
                    span,
                ))
            }
        };
        Ok(TypedExpr {
            ty,
            span,
            kind: ExprKind::Call { function, args },
        })
    }

    fn lower_sign(&mut self, negative: bool, operand: &Expr, span: Span) -> SourceResult<TypedExpr> {
        let operand = self.lower_expr(operand)?;
        let numeric = operand.ty.is_numeric()
            || operand.ty.is_integer_literal()
            || matches!(operand.ty, RuleType::FloatLit(_));
        if !numeric {
            return Err(SourceError::semantic(
                format!("Cannot apply a sign to {}", operand.ty),
                span,
            ));
        }
        if !negative {
            return Ok(operand);
        }
        if operand.ty.is_unsigned_int() {
            return Err(SourceError::semantic(
                format!("Cannot negate {}", operand.ty),
                span,
            ));
        }
        // Singleton literal types carry their value; negation flips it even
        // when the operand is a variable read rather than a literal node.
        let ty = match operand.ty {
            RuleType::SintLit(v) => negated_int_literal(v as i128, span)?,
            RuleType::UintLit(v) => negated_int_literal(v as i128, span)?,
            RuleType::FloatLit(v) => RuleType::FloatLit(-v),
            ref other => other.clone(),
        };
        reduce::fold_shallow(TypedExpr {
            ty,
            span,
            kind: ExprKind::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(operand),
            },
        })
    }

    fn lower_logical_not(&mut self, operand: &Expr, span: Span) -> SourceResult<TypedExpr> {
        let operand = self.lower_expr(operand)?;
        let ty = match operand.ty {
            RuleType::BoolLit(v) => RuleType::BoolLit(!v),
            RuleType::Bool => RuleType::Bool,
            ref other => {
                return Err(SourceError::semantic(
                    format!("Logical not takes a bool, found {}", other),
                    span,
                ))
            }
        };
        reduce::fold_shallow(TypedExpr {
            ty,
            span,
            kind: ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            },
        })
    }

    fn lower_bitwise_not(&mut self, operand: &Expr, span: Span) -> SourceResult<TypedExpr> {
        let operand = self.lower_expr(operand)?;
        let ty = match operand.ty {
            RuleType::SintLit(v) => RuleType::SintLit(!v),
            RuleType::UintLit(v) => RuleType::UintLit(!v),
            ref other if other.is_integer() => other.clone(),
            ref other => {
                return Err(SourceError::semantic(
                    format!("Bitwise not takes an integer, found {}", other),
                    span,
                ))
            }
        };
        reduce::fold_shallow(TypedExpr {
            ty,
            span,
            kind: ExprKind::Unary {
                op: UnaryOp::BitNot,
                operand: Box::new(operand),
            },
        })
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        let lhs = self.lower_expr(lhs)?;
        let rhs = self.lower_expr(rhs)?;
        match op {
            BinaryOp::LogicalAnd => self.lower_logical(LogicalOp::And, lhs, rhs, span),
            BinaryOp::LogicalOr => self.lower_logical(LogicalOp::Or, lhs, rhs, span),
            BinaryOp::LogicalXor => self.lower_logical(LogicalOp::Xor, lhs, rhs, span),
            BinaryOp::Concatenate => self.lower_concatenate(lhs, rhs, span),
            BinaryOp::Range => self.lower_range(lhs, rhs, span),
            BinaryOp::ShiftLeft | BinaryOp::ShiftRight | BinaryOp::ShiftRightUnsigned => {
                self.lower_shift(op, lhs, rhs, span)
            }
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                self.lower_bitwise(op, lhs, rhs, span)
            }
            _ => self.lower_arithmetic(op, lhs, rhs, span),
        }
    }

    fn lower_arithmetic(
        &mut self,
        op: BinaryOp,
        lhs: TypedExpr,
        rhs: TypedExpr,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        let bin_op = match op {
            BinaryOp::Add => BinOp::Add,
            BinaryOp::Subtract => BinOp::Sub,
            BinaryOp::Multiply => BinOp::Mul,
            BinaryOp::Divide => BinOp::Div,
            BinaryOp::Remainder => BinOp::Rem,
            BinaryOp::Exponent => BinOp::Pow,
            other => unreachable!("not an arithmetic operator: {:?}", other),
        };
        if let Some(folded) = reduce::try_fold_binary(bin_op, &lhs, &rhs, span)? {
            return Ok(folded);
        }
        let (lhs, rhs, joined) = self.join_numeric_operands(lhs, rhs, span)?;
        Ok(TypedExpr {
            ty: joined,
            span,
            kind: ExprKind::Binary {
                op: bin_op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }

    fn lower_bitwise(
        &mut self,
        op: BinaryOp,
        lhs: TypedExpr,
        rhs: TypedExpr,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        let bin_op = match op {
            BinaryOp::BitAnd => BinOp::BitAnd,
            BinaryOp::BitOr => BinOp::BitOr,
            BinaryOp::BitXor => BinOp::BitXor,
            other => unreachable!("not a bitwise operator: {:?}", other),
        };
        if let Some(folded) = reduce::try_fold_binary(bin_op, &lhs, &rhs, span)? {
            return Ok(folded);
        }
        let (lhs, rhs, joined) = self.join_numeric_operands(lhs, rhs, span)?;
        if !joined.is_integer() {
            return Err(SourceError::semantic(
                format!("Bitwise operands are integers, found {}", joined),
                span,
            ));
        }
        Ok(TypedExpr {
            ty: joined,
            span,
            kind: ExprKind::Binary {
                op: bin_op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }

    fn lower_shift(
        &mut self,
        op: BinaryOp,
        lhs: TypedExpr,
        rhs: TypedExpr,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        let bin_op = match op {
            BinaryOp::ShiftLeft => BinOp::Shl,
            BinaryOp::ShiftRight => BinOp::Shr,
            BinaryOp::ShiftRightUnsigned => BinOp::Ushr,
            other => unreachable!("not a shift operator: {:?}", other),
        };
        if let Some(folded) = reduce::try_fold_binary(bin_op, &lhs, &rhs, span)? {
            return Ok(folded);
        }
        // The result takes the left operand's type.
        let lhs_ty = lhs.ty.narrow_against(&rhs.ty);
        let lhs = if lhs_ty == lhs.ty {
            lhs
        } else {
            self.convert(lhs, &lhs_ty)?
        };
        if !lhs.ty.is_integer() && !lhs.ty.is_integer_literal() {
            return Err(SourceError::semantic(
                format!("Shift operands are integers, found {}", lhs.ty),
                span,
            ));
        }
        let rhs_ty = rhs.ty.narrow_against(&RuleType::Sint64);
        let rhs = if rhs_ty == rhs.ty {
            rhs
        } else {
            self.convert(rhs, &rhs_ty)?
        };
        if !rhs.ty.is_integer() {
            return Err(SourceError::semantic(
                format!("Shift amounts are integers, found {}", rhs.ty),
                span,
            ));
        }
        let ty = lhs.ty.clone();
        Ok(TypedExpr {
            ty,
            span,
            kind: ExprKind::Binary {
                op: bin_op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }

    fn lower_logical(
        &mut self,
        op: LogicalOp,
        lhs: TypedExpr,
        rhs: TypedExpr,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        if let (RuleType::BoolLit(a), RuleType::BoolLit(b)) = (&lhs.ty, &rhs.ty) {
            let value = match op {
                LogicalOp::And => *a && *b,
                LogicalOp::Or => *a || *b,
                LogicalOp::Xor => *a != *b,
            };
            return Ok(TypedExpr {
                ty: RuleType::BoolLit(value),
                span,
                kind: ExprKind::Bool(value),
            });
        }
        let lhs = self.convert(lhs, &RuleType::Bool)?;
        let rhs = self.convert(rhs, &RuleType::Bool)?;
        Ok(TypedExpr {
            ty: RuleType::Bool,
            span,
            kind: ExprKind::Logical {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }

    fn lower_concatenate(
        &mut self,
        lhs: TypedExpr,
        rhs: TypedExpr,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        // Two string literals fold to a string literal.
        if let (
            RuleType::StrLit {
                encoding, value: a, ..
            },
            RuleType::StrLit { value: b, .. },
        ) = (&lhs.ty, &rhs.ty)
        {
            let value = format!("{}{}", a, b);
            let encoding = *encoding;
            return Ok(TypedExpr {
                ty: RuleType::StrLit {
                    encoding,
                    value: value.clone(),
                },
                span,
                kind: ExprKind::Str { encoding, value },
            });
        }

        let (lhs_comp, lhs_size) = concat_operand(&lhs.ty).ok_or_else(|| {
            SourceError::semantic(format!("Cannot concatenate {}", lhs.ty), lhs.span)
        })?;
        let (rhs_comp, rhs_size) = concat_operand(&rhs.ty).ok_or_else(|| {
            SourceError::semantic(format!("Cannot concatenate {}", rhs.ty), rhs.span)
        })?;
        let component = lhs_comp.join(&rhs_comp).ok_or_else(|| {
            SourceError::semantic(
                format!("No common component type for {} and {}", lhs.ty, rhs.ty),
                span,
            )
        })?;
        let lhs = self.convert(
            lhs,
            &RuleType::Array {
                component: Box::new(component.clone()),
                size: lhs_size,
            },
        )?;
        let rhs = self.convert(
            rhs,
            &RuleType::Array {
                component: Box::new(component.clone()),
                size: rhs_size,
            },
        )?;
        let size = match (lhs_size, rhs_size) {
            (Some(a), Some(b)) => Some(a + b),
            _ => None,
        };
        Ok(TypedExpr {
            ty: RuleType::Array {
                component: Box::new(component),
                size,
            },
            span,
            kind: ExprKind::Concat {
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }

    fn lower_range(&mut self, lhs: TypedExpr, rhs: TypedExpr, span: Span) -> SourceResult<TypedExpr> {
        let (lhs, rhs, joined) = self.join_numeric_operands(lhs, rhs, span)?;
        if !joined.is_integer() {
            return Err(SourceError::semantic(
                format!("Range bounds are integers, found {}", joined),
                span,
            ));
        }
        Ok(TypedExpr {
            ty: RuleType::Array {
                component: Box::new(joined),
                size: None,
            },
            span,
            kind: ExprKind::RangeArray {
                lo: Box::new(lhs),
                hi: Box::new(rhs),
            },
        })
    }

    /// Narrow literals against each other, join, and convert both sides
    fn join_numeric_operands(
        &mut self,
        lhs: TypedExpr,
        rhs: TypedExpr,
        span: Span,
    ) -> SourceResult<(TypedExpr, TypedExpr, RuleType)> {
        let lhs_ty = lhs.ty.narrow_against(&rhs.ty);
        let rhs_ty = rhs.ty.narrow_against(&lhs.ty);
        let joined = lhs_ty.join(&rhs_ty).ok_or_else(|| {
            SourceError::semantic(
                format!("No common type for {} and {}", lhs.ty, rhs.ty),
                span,
            )
        })?;
        if !joined.is_numeric() && !joined.is_integer_literal() {
            return Err(SourceError::semantic(
                format!("Expected numeric operands, found {}", joined),
                span,
            ));
        }
        let lhs = self.convert(lhs, &joined)?;
        let rhs = self.convert(rhs, &joined)?;
        Ok((lhs, rhs, joined))
    }

    fn lower_compare(
        &mut self,
        first: &Expr,
        comparisons: &[(CompareOp, Expr)],
        type_test: Option<&(TypeTestOp, Box<Expr>)>,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        let mut operands = vec![self.lower_expr(first)?];
        for (_, rhs) in comparisons {
            operands.push(self.lower_expr(rhs)?);
        }

        let mut parts: Vec<TypedExpr> = Vec::new();
        for (i, (op, _)) in comparisons.iter().enumerate() {
            let lhs = operands[i].clone();
            let rhs = operands[i + 1].clone();
            parts.push(self.lower_compare_pair(*op, lhs, rhs, span)?);
        }

        if let Some((op, type_expr)) = type_test {
            let tested = operands.last().expect("chain has an operand");
            let target = self.resolve_type_expr(type_expr)?;
            let value = type_test_value(*op, &tested.ty, &target);
            parts.push(TypedExpr {
                ty: RuleType::BoolLit(value),
                span,
                kind: ExprKind::Bool(value),
            });
        }

        // The chain folds with logical and.
        let mut result = parts.remove(0);
        for part in parts {
            result = self.lower_logical(LogicalOp::And, result, part, span)?;
        }
        Ok(result)
    }

    fn lower_compare_pair(
        &mut self,
        op: CompareOp,
        lhs: TypedExpr,
        rhs: TypedExpr,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        // Identity comparison on references is address equality.
        if lhs.ty.is_reference() && rhs.ty.is_reference() {
            let bin_op = match op {
                CompareOp::Identical => BinOp::AddrEq,
                CompareOp::NotIdentical => BinOp::AddrNe,
                _ => {
                    return Err(SourceError::semantic(
                        format!("Cannot order {} and {}", lhs.ty, rhs.ty),
                        span,
                    ))
                }
            };
            return Ok(TypedExpr {
                ty: RuleType::Bool,
                span,
                kind: ExprKind::Binary {
                    op: bin_op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            });
        }

        let bin_op = match op {
            CompareOp::Identical | CompareOp::Equal => BinOp::Eq,
            CompareOp::NotIdentical | CompareOp::NotEqual => BinOp::Ne,
            CompareOp::Less => BinOp::Lt,
            CompareOp::LessEqual => BinOp::Le,
            CompareOp::Greater => BinOp::Gt,
            CompareOp::GreaterEqual => BinOp::Ge,
        };
        if let Some(folded) = reduce::try_fold_binary(bin_op, &lhs, &rhs, span)? {
            return Ok(folded);
        }

        // Bools compare for (in)equality only.
        let bool_like = |t: &RuleType| matches!(t, RuleType::Bool | RuleType::BoolLit(_));
        if bool_like(&lhs.ty) && bool_like(&rhs.ty) {
            if !matches!(bin_op, BinOp::Eq | BinOp::Ne) {
                return Err(SourceError::semantic("Cannot order bool values", span));
            }
            let lhs = self.convert(lhs, &RuleType::Bool)?;
            let rhs = self.convert(rhs, &RuleType::Bool)?;
            return Ok(TypedExpr {
                ty: RuleType::Bool,
                span,
                kind: ExprKind::Binary {
                    op: bin_op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
            });
        }

        let (lhs, rhs, _) = self.join_numeric_operands(lhs, rhs, span)?;
        Ok(TypedExpr {
            ty: RuleType::Bool,
            span,
            kind: ExprKind::Binary {
                op: bin_op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        })
    }

    fn lower_conditional(
        &mut self,
        truthy: &Expr,
        condition: &Expr,
        falsy: &Expr,
        span: Span,
    ) -> SourceResult<TypedExpr> {
        let condition = self.lower_condition(condition)?;
        let truthy = self.lower_expr(truthy)?;
        let falsy = self.lower_expr(falsy)?;
        let joined = truthy.ty.join(&falsy.ty).ok_or_else(|| {
            SourceError::semantic(
                format!("No common type for {} and {}", truthy.ty, falsy.ty),
                span,
            )
        })?;
        let truthy = self.convert(truthy, &joined)?;
        let falsy = self.convert(falsy, &joined)?;
        reduce::fold_shallow(TypedExpr {
            ty: joined,
            span,
            kind: ExprKind::Conditional {
                condition: Box::new(condition),
                truthy: Box::new(truthy),
                falsy: Box::new(falsy),
            },
        })
    }

    /// Lower an expression that must be a bool condition
    pub(crate) fn lower_condition(&mut self, condition: &Expr) -> SourceResult<TypedExpr> {
        let lowered = self.lower_expr(condition)?;
        match lowered.ty {
            RuleType::Bool | RuleType::BoolLit(_) => Ok(lowered),
            ref other => Err(SourceError::semantic(
                format!("Conditions are bool, found {}", other),
                lowered.span,
            )),
        }
    }

    // ==================== Composite literals ====================

    pub(crate) fn lower_composite(
        &mut self,
        lit: &CompositeLiteral,
        target: Option<&RuleType>,
    ) -> SourceResult<TypedExpr> {
        match target {
            Some(RuleType::Array { component, size }) => {
                self.lower_array_literal(lit, component, *size)
            }
            Some(RuleType::Tuple(members)) => self.lower_tuple_literal(lit, members),
            Some(RuleType::Structure { members }) => self.lower_struct_literal(lit, members),
            Some(RuleType::Any) | None => self.infer_composite(lit),
            Some(other) => Err(SourceError::semantic(
                format!("{} does not take a composite literal", other),
                lit.span,
            )),
        }
    }

    fn lower_array_literal(
        &mut self,
        lit: &CompositeLiteral,
        component: &RuleType,
        size: Option<u64>,
    ) -> SourceResult<TypedExpr> {
        let mut filled: Vec<(u64, TypedExpr)> = Vec::new();
        let mut other = None;
        let mut cursor = 0u64;

        for part in &lit.parts {
            match &part.label {
                Some(Label::Other { span }) => {
                    if other.is_some() {
                        return Err(SourceError::semantic(
                            "Duplicate 'other' label",
                            *span,
                        ));
                    }
                    other = Some(self.lower_part(&part.value, component)?);
                }
                Some(Label::Index { index, .. }) => {
                    self.fill_array_slot(&mut filled, *index, &part.value, component)?;
                    cursor = index + 1;
                }
                Some(Label::Name { span, .. }) => {
                    return Err(SourceError::semantic(
                        "Array literals take index labels",
                        *span,
                    ))
                }
                None => {
                    self.fill_array_slot(&mut filled, cursor, &part.value, component)?;
                    cursor += 1;
                }
            }
        }

        let length = size.unwrap_or_else(|| {
            filled.iter().map(|(i, _)| i + 1).max().unwrap_or(0)
        });
        if let Some((index, value)) = filled.iter().find(|(i, _)| *i >= length) {
            return Err(SourceError::semantic(
                format!("Index {} is out of bounds for length {}", index, length),
                value.span,
            ));
        }

        let mut values: Vec<Option<TypedExpr>> = (0..length).map(|_| None).collect();
        for (index, value) in filled {
            values[index as usize] = Some(value);
        }
        Ok(TypedExpr {
            ty: RuleType::Array {
                component: Box::new(component.clone()),
                size: Some(length),
            },
            span: lit.span,
            kind: ExprKind::ArrayLiteral {
                values,
                other: other.map(Box::new),
            },
        })
    }

    fn fill_array_slot(
        &mut self,
        filled: &mut Vec<(u64, TypedExpr)>,
        index: u64,
        value: &Expr,
        component: &RuleType,
    ) -> SourceResult<()> {
        if filled.iter().any(|(i, _)| *i == index) {
            return Err(SourceError::semantic(
                format!("Index {} is filled twice", index),
                value.span(),
            ));
        }
        let value = self.lower_part(value, component)?;
        filled.push((index, value));
        Ok(())
    }

    fn lower_tuple_literal(
        &mut self,
        lit: &CompositeLiteral,
        members: &[RuleType],
    ) -> SourceResult<TypedExpr> {
        let mut values: Vec<Option<TypedExpr>> = (0..members.len()).map(|_| None).collect();
        let mut cursor = 0usize;
        for part in &lit.parts {
            let position = match &part.label {
                None => {
                    let p = cursor;
                    cursor += 1;
                    p
                }
                Some(Label::Index { index, .. }) => {
                    cursor = *index as usize + 1;
                    *index as usize
                }
                Some(other) => {
                    return Err(SourceError::semantic(
                        "Tuple literals take index labels",
                        super::label_span(other),
                    ))
                }
            };
            if position >= members.len() {
                return Err(SourceError::semantic(
                    format!("Tuple has {} members", members.len()),
                    part.value.span(),
                ));
            }
            if values[position].is_some() {
                return Err(SourceError::semantic(
                    format!("Member {} is filled twice", position),
                    part.value.span(),
                ));
            }
            values[position] = Some(self.lower_part(&part.value, &members[position])?);
        }
        Ok(TypedExpr {
            ty: RuleType::Tuple(members.to_vec()),
            span: lit.span,
            kind: ExprKind::TupleLiteral { values },
        })
    }

    fn lower_struct_literal(
        &mut self,
        lit: &CompositeLiteral,
        members: &[(String, RuleType)],
    ) -> SourceResult<TypedExpr> {
        let mut values: Vec<Option<TypedExpr>> = (0..members.len()).map(|_| None).collect();
        let mut cursor = 0usize;
        for part in &lit.parts {
            let position = match &part.label {
                None => {
                    let p = cursor;
                    cursor += 1;
                    p
                }
                Some(Label::Name { name, span }) => members
                    .iter()
                    .position(|(n, _)| n == name)
                    .ok_or_else(|| {
                        SourceError::semantic_with_offender(
                            format!("No member '{}' in the target structure", name),
                            name,
                            *span,
                        )
                    })?,
                Some(other) => {
                    return Err(SourceError::semantic(
                        "Structure literals take member-name labels",
                        super::label_span(other),
                    ))
                }
            };
            if position >= members.len() {
                return Err(SourceError::semantic(
                    format!("Structure has {} members", members.len()),
                    part.value.span(),
                ));
            }
            if values[position].is_some() {
                return Err(SourceError::semantic(
                    format!("Member '{}' is filled twice", members[position].0),
                    part.value.span(),
                ));
            }
            values[position] = Some(self.lower_part(&part.value, &members[position].1)?);
        }
        Ok(TypedExpr {
            ty: RuleType::Structure {
                members: members.to_vec(),
            },
            span: lit.span,
            kind: ExprKind::StructLiteral { values },
        })
    }

    /// Lower a composite part toward a member type; nested composites stay
    /// target-directed
    fn lower_part(&mut self, value: &Expr, target: &RuleType) -> SourceResult<TypedExpr> {
        self.lower_expr_with_target(value, target)
    }

    /// Infer the type of a bare composite literal from its parts
    fn infer_composite(&mut self, lit: &CompositeLiteral) -> SourceResult<TypedExpr> {
        let has_name = lit
            .parts
            .iter()
            .any(|p| matches!(p.label, Some(Label::Name { .. })));
        let has_index = lit.parts.iter().any(|p| {
            matches!(p.label, Some(Label::Index { .. }) | Some(Label::Other { .. }))
        });

        if has_name {
            // Structure: every part must be name-labeled.
            let mut members = Vec::new();
            let mut values = Vec::new();
            for part in &lit.parts {
                let Some(Label::Name { name, span }) = &part.label else {
                    return Err(SourceError::semantic(
                        "A structure literal labels every member",
                        part.value.span(),
                    ));
                };
                if members.iter().any(|(n, _): &(String, RuleType)| n == name) {
                    return Err(SourceError::semantic_with_offender(
                        format!("Duplicate member name '{}'", name),
                        name,
                        *span,
                    ));
                }
                let value = self.lower_expr(&part.value)?;
                members.push((name.clone(), value.ty.clone()));
                values.push(Some(value));
            }
            return Ok(TypedExpr {
                ty: RuleType::Structure { members },
                span: lit.span,
                kind: ExprKind::StructLiteral { values },
            });
        }

        if has_index {
            // Array: join the part types for the component.
            let mut component: Option<RuleType> = None;
            for part in &lit.parts {
                let ty = self.lower_expr(&part.value)?.ty;
                component = Some(match component {
                    None => ty,
                    Some(prev) => prev.join(&ty).ok_or_else(|| {
                        SourceError::semantic("No common component type", lit.span)
                    })?,
                });
            }
            let component = component.unwrap_or(RuleType::Any);
            return self.lower_array_literal(lit, &component, None);
        }

        // Tuple of the part types.
        let values = lit
            .parts
            .iter()
            .map(|part| self.lower_expr(&part.value).map(Some))
            .collect::<SourceResult<Vec<_>>>()?;
        let members = values
            .iter()
            .map(|v| v.as_ref().expect("just built").ty.clone())
            .collect();
        Ok(TypedExpr {
            ty: RuleType::Tuple(members),
            span: lit.span,
            kind: ExprKind::TupleLiteral { values },
        })
    }
}

/// Literal type of a negated integer literal, widening across the i64
/// boundary exactly like literal reduction does
fn negated_int_literal(value: i128, span: Span) -> SourceResult<RuleType> {
    let negated = -value;
    if let Ok(v) = i64::try_from(negated) {
        return Ok(RuleType::SintLit(v));
    }
    if let Ok(v) = u64::try_from(negated) {
        return Ok(RuleType::UintLit(v));
    }
    Err(SourceError::semantic("Integer overflow", span))
}

/// Length-prefixed concat operand: its component type and static size
fn concat_operand(ty: &RuleType) -> Option<(RuleType, Option<u64>)> {
    match ty {
        RuleType::Array { component, size } => Some(((**component).clone(), *size)),
        RuleType::StrLit { encoding, value } => Some((
            encoding.unit_atomic(),
            Some(encoding.unit_len(value) as u64),
        )),
        _ => None,
    }
}

/// Evaluate a type test statically; types are fixed at analysis time
fn type_test_value(op: TypeTestOp, value: &RuleType, target: &RuleType) -> bool {
    let lifted = value.lift();
    match op {
        TypeTestOp::Same => lifted == *target,
        TypeTestOp::NotSame => lifted != *target,
        TypeTestOp::Subtype => value.convertible_to(target),
        TypeTestOp::Supertype => target.convertible_to(value),
        TypeTestOp::ProperSubtype => value.convertible_to(target) && lifted != *target,
        TypeTestOp::ProperSupertype => target.convertible_to(value) && lifted != *target,
        TypeTestOp::Related => value.convertible_to(target) || target.convertible_to(value),
    }
}

/// Parse a constant composite index in value position
fn constant_index(index: &Expr, len: usize, span: Span) -> SourceResult<usize> {
    let Expr::Integer { text, span: index_span } = index else {
        return Err(SourceError::semantic(
            "Tuple and structure indices are integer literals",
            span,
        ));
    };
    let value = decode_integer(text).ok_or_else(|| {
        SourceError::semantic_with_offender("Integer literal overflows", text, *index_span)
    })?;
    if value as usize >= len {
        return Err(SourceError::semantic(
            format!("Index {} is out of bounds for {} members", value, len),
            *index_span,
        ));
    }
    Ok(value as usize)
}
