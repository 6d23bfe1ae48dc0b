//! Statement analysis
//!
//! Declarations bind names and slots, assignments check assignability and
//! value conversion, control statements open the matching scope kinds, and
//! function definitions validate that every path through a non-void body
//! returns.

use super::context::BlockKind;
use super::Lowering;
use crate::error::{SourceError, SourceResult};
use crate::ir::core::{Function, Param, TypedStmt};
use crate::types::RuleType;
use rules_lang_parser::ast::{DeclKind, Expr, Stmt};
use rules_lang_parser::span::Span;

impl Lowering {
    /// Analyze a statement list in the current scope
    pub(crate) fn lower_statements(&mut self, stmts: &[Stmt]) -> SourceResult<Vec<TypedStmt>> {
        let mut out = Vec::new();
        for stmt in stmts {
            if let Some(lowered) = self.lower_statement(stmt)? {
                out.push(lowered);
            }
        }
        Ok(out)
    }

    /// Analyze one statement; type and function definitions produce no
    /// runtime statement
    fn lower_statement(&mut self, stmt: &Stmt) -> SourceResult<Option<TypedStmt>> {
        match stmt {
            Stmt::TypeDefinition { name, ty, span } => {
                let resolved = self.resolve_type_definition(name, ty)?;
                if name == "Input" {
                    if !matches!(resolved, RuleType::Structure { .. }) {
                        return Err(SourceError::semantic(
                            "The rule input type is a structure",
                            *span,
                        ));
                    }
                    self.input_type = resolved.clone();
                }
                self.context.define_type(name, resolved, *span)?;
                Ok(None)
            }
            Stmt::VariableDeclaration {
                kind,
                type_name,
                name,
                value,
                span,
            } => self
                .lower_declaration(*kind, type_name.as_ref(), name, value.as_ref(), *span)
                .map(Some),
            Stmt::Assignment {
                target,
                op,
                value,
                span,
            } => {
                // The operator expander runs before analysis; a compound
                // assignment reaching this pass is a pipeline ordering bug.
                assert!(op.is_none(), "compound assignment not expanded");
                self.lower_assignment(target, value, *span).map(Some)
            }
            Stmt::CallStatement { call, span } => {
                let Expr::Call { value, args, .. } = call else {
                    return Err(SourceError::semantic("Expected a call", *span));
                };
                let call = self.lower_call_statement(value, args, *span)?;
                Ok(Some(TypedStmt::Call { call, span: *span }))
            }
            Stmt::Conditional {
                blocks,
                false_statements,
                span,
            } => {
                let mut arms = Vec::with_capacity(blocks.len());
                for block in blocks {
                    let condition = self.lower_condition(&block.condition)?;
                    self.context.push(BlockKind::Conditional);
                    let body = self.lower_statements(&block.statements);
                    self.context.pop();
                    arms.push((condition, body?));
                }
                self.context.push(BlockKind::Conditional);
                let falsy = self.lower_statements(false_statements);
                self.context.pop();
                Ok(Some(TypedStmt::If {
                    arms,
                    falsy: falsy?,
                    span: *span,
                }))
            }
            Stmt::Loop {
                label,
                condition,
                body,
                span,
            } => {
                let condition = self.lower_condition(condition)?;
                self.context.push(BlockKind::Loop {
                    label: label.clone(),
                });
                let body = self.lower_statements(body);
                self.context.pop();
                Ok(Some(TypedStmt::While {
                    label: label.clone(),
                    condition,
                    body: body?,
                    span: *span,
                }))
            }
            Stmt::FunctionDefinition {
                name,
                params,
                return_type,
                body,
                span,
            } => {
                self.lower_function(name, params, return_type.as_ref(), body, *span)?;
                Ok(None)
            }
            Stmt::Return { value, span } => self.lower_return(value.as_ref(), *span).map(Some),
            Stmt::Break { label, span } => {
                self.check_jump("break", label.as_deref(), *span)?;
                Ok(Some(TypedStmt::Break {
                    label: label.clone(),
                    span: *span,
                }))
            }
            Stmt::Continue { label, span } => {
                self.check_jump("continue", label.as_deref(), *span)?;
                Ok(Some(TypedStmt::Continue {
                    label: label.clone(),
                    span: *span,
                }))
            }
        }
    }

    fn lower_declaration(
        &mut self,
        kind: DeclKind,
        type_name: Option<&(String, Span)>,
        name: &str,
        value: Option<&Expr>,
        span: Span,
    ) -> SourceResult<TypedStmt> {
        let (ty, value) = match (type_name, value) {
            (Some((type_name, type_span)), value) => {
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
                let value = value
                    .map(|v| self.lower_expr_with_target(v, &ty))
                    .transpose()?;
                (ty, value)
            }
            (None, Some(value)) => {
                let lowered = self.lower_expr(value)?;
                let ty = match kind {
                    DeclKind::Let => lowered.ty.clone(),
                    DeclKind::Var => lowered.ty.lift(),
                };
                let lowered = self.convert(lowered, &ty)?;
                (ty, Some(lowered))
            }
            (None, None) => {
                return Err(SourceError::semantic(
                    format!("Cannot infer a type for '{}'", name),
                    span,
                ))
            }
        };
        let variable = self.context.define_variable(name, ty.clone(), span)?;
        Ok(TypedStmt::Declare {
            slot: variable.slot,
            ty,
            value,
            span,
        })
    }

    fn lower_assignment(
        &mut self,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> SourceResult<TypedStmt> {
        match target {
            Expr::Name { name, span: name_span } => {
                let variable = self.context.variable(name).cloned().ok_or_else(|| {
                    SourceError::semantic_with_offender(
                        format!("Unknown name '{}'", name),
                        name,
                        *name_span,
                    )
                })?;
                let value = self.lower_expr_with_target(value, &variable.ty)?;
                Ok(TypedStmt::AssignLocal {
                    slot: variable.slot,
                    value,
                    span,
                })
            }
            Expr::FieldAccess {
                value: object,
                name,
                span: access_span,
            } => {
                let object = self.lower_expr(object)?;
                let RuleType::Structure { members } = object.ty.clone() else {
                    return Err(SourceError::semantic(
                        format!("{} has no members", object.ty),
                        *access_span,
                    ));
                };
                let Some(index) = members.iter().position(|(n, _)| n == name) else {
                    return Err(SourceError::semantic_with_offender(
                        format!("{} has no member '{}'", object.ty, name),
                        name,
                        *access_span,
                    ));
                };
                let value = self.lower_expr_with_target(value, &members[index].1)?;
                Ok(TypedStmt::AssignMember {
                    object,
                    name: name.clone(),
                    index,
                    value,
                    span,
                })
            }
            Expr::IndexAccess {
                value: object,
                index,
                span: access_span,
            } => {
                let Some(index) = index else {
                    return Err(SourceError::semantic("Expected an index", *access_span));
                };
                let object = self.lower_expr(object)?;
                match object.ty.clone() {
                    RuleType::Array { component, .. } => {
                        let index = self.lower_array_index(index)?;
                        let value = self.lower_expr_with_target(value, &component)?;
                        Ok(TypedStmt::AssignElement {
                            object,
                            index,
                            value,
                            span,
                        })
                    }
                    RuleType::Tuple(members) => {
                        let position = constant_position(index, members.len())?;
                        let value = self.lower_expr_with_target(value, &members[position])?;
                        Ok(TypedStmt::AssignMember {
                            object,
                            name: String::new(),
                            index: position,
                            value,
                            span,
                        })
                    }
                    RuleType::Structure { members } => {
                        let position = constant_position(index, members.len())?;
                        let value =
                            self.lower_expr_with_target(value, &members[position].1)?;
                        Ok(TypedStmt::AssignMember {
                            object,
                            name: members[position].0.clone(),
                            index: position,
                            value,
                            span,
                        })
                    }
                    other => Err(SourceError::semantic(
                        format!("{} cannot be assigned into", other),
                        *access_span,
                    )),
                }
            }
            Expr::ContextField { span, .. } => Err(SourceError::semantic(
                "The rule input is read-only",
                *span,
            )),
            other => Err(SourceError::semantic(
                "Target is not assignable",
                other.span(),
            )),
        }
    }

    fn lower_function(
        &mut self,
        name: &str,
        params: &[rules_lang_parser::ast::Parameter],
        return_type: Option<&(String, Span)>,
        body: &[Stmt],
        span: Span,
    ) -> SourceResult<()> {
        let param_types = params
            .iter()
            .map(|p| {
                self.context
                    .lookup_type(&p.type_name)
                    .cloned()
                    .ok_or_else(|| {
                        SourceError::semantic_with_offender(
                            format!("Unknown type '{}'", p.type_name),
                            &p.type_name,
                            p.type_span,
                        )
                    })
            })
            .collect::<SourceResult<Vec<_>>>()?;
        let return_type = return_type
            .map(|(type_name, type_span)| {
                self.context
                    .lookup_type(type_name)
                    .cloned()
                    .ok_or_else(|| {
                        SourceError::semantic_with_offender(
                            format!("Unknown type '{}'", type_name),
                            type_name,
                            *type_span,
                        )
                    })
            })
            .transpose()?;

        // A same-signature redefinition collides; differing signatures
        // overload.
        for &index in &self.context.function_overloads(name) {
            let existing: Vec<&RuleType> =
                self.functions[index].params.iter().map(|p| &p.ty).collect();
            if existing.len() == param_types.len()
                && existing.iter().zip(&param_types).all(|(a, b)| **a == *b)
            {
                return Err(SourceError::semantic_with_offender(
                    format!("Function '{}' is already defined with this signature", name),
                    name,
                    span,
                ));
            }
        }

        // Register before the body so recursion resolves.
        let index = self.functions.len();
        self.functions.push(Function {
            name: name.to_string(),
            params: Vec::new(),
            return_type: return_type.clone(),
            body: Vec::new(),
            slot_count: 0,
            span,
        });
        self.context.define_function(name, index);

        self.context.push(BlockKind::Function {
            return_type: return_type.clone(),
        });
        let result = (|| {
            let mut bound = Vec::with_capacity(params.len());
            for (param, ty) in params.iter().zip(&param_types) {
                let variable = self.context.define_variable(&param.name, ty.clone(), param.span)?;
                bound.push(Param {
                    name: param.name.clone(),
                    ty: ty.clone(),
                    slot: variable.slot,
                });
            }
            self.functions[index].params = bound;
            self.lower_statements(body)
        })();
        let slot_count = self.context.pop().unwrap_or(0);
        let body = result?;

        if return_type.is_some() && !returns_definitely(&body) {
            return Err(SourceError::semantic(
                format!("Not every path through '{}' returns a value", name),
                span,
            ));
        }

        self.functions[index].body = body;
        self.functions[index].slot_count = slot_count;
        Ok(())
    }

    fn lower_return(&mut self, value: Option<&Expr>, span: Span) -> SourceResult<TypedStmt> {
        match self.context.enclosing_function().cloned() {
            Some(Some(return_type)) => {
                let Some(value) = value else {
                    return Err(SourceError::semantic(
                        format!("Expected a {} return value", return_type),
                        span,
                    ));
                };
                let value = self.lower_expr_with_target(value, &return_type)?;
                Ok(TypedStmt::Return {
                    value: Some(value),
                    span,
                })
            }
            Some(None) => {
                if value.is_some() {
                    return Err(SourceError::semantic(
                        "A void function returns no value",
                        span,
                    ));
                }
                Ok(TypedStmt::Return { value: None, span })
            }
            None => {
                // Top level: the rule's output.
                let value = value.map(|v| self.lower_expr(v)).transpose()?;
                if let Some(value) = &value {
                    self.output_type = match self.output_type.take() {
                        None => Some(value.ty.clone()),
                        Some(previous) => Some(previous.join(&value.ty).ok_or_else(|| {
                            SourceError::semantic(
                                format!(
                                    "No common type for rule outputs {} and {}",
                                    previous, value.ty
                                ),
                                span,
                            )
                        })?),
                    };
                }
                Ok(TypedStmt::Return { value, span })
            }
        }
    }

    fn check_jump(&self, what: &str, label: Option<&str>, span: Span) -> SourceResult<()> {
        if !self.context.find_loop(None) {
            return Err(SourceError::semantic(
                format!("'{}' outside a loop", what),
                span,
            ));
        }
        if let Some(label) = label {
            if !self.context.find_loop(Some(label)) {
                return Err(SourceError::semantic_with_offender(
                    format!("No enclosing loop labeled '{}'", label),
                    label,
                    span,
                ));
            }
        }
        Ok(())
    }

    fn lower_call_statement(
        &mut self,
        value: &Expr,
        args: &[Expr],
        span: Span,
    ) -> SourceResult<crate::ir::core::TypedExpr> {
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
        self.resolve_call(name, *name_span, args, span, true)
    }

}

/// Flow-sensitive check: does every path through these statements return?
pub(crate) fn returns_definitely(stmts: &[TypedStmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        TypedStmt::Return { .. } => true,
        TypedStmt::If { arms, falsy, .. } => {
            !falsy.is_empty()
                && returns_definitely(falsy)
                && arms.iter().all(|(_, body)| returns_definitely(body))
        }
        _ => false,
    })
}

fn constant_position(index: &Expr, len: usize) -> SourceResult<usize> {
    let Expr::Integer { text, span } = index else {
        return Err(SourceError::semantic(
            "Tuple and structure indices are integer literals",
            index.span(),
        ));
    };
    let value = rules_lang_parser::parser::literals::decode_integer(text).ok_or_else(|| {
        SourceError::semantic_with_offender("Integer literal overflows", text, *span)
    })?;
    if value as usize >= len {
        return Err(SourceError::semantic(
            format!("Index {} is out of bounds for {} members", value, len),
            *span,
        ));
    }
    Ok(value as usize)
}
