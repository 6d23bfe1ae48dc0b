//! Semantic analyzer
//!
//! Lowers the syntactic tree to the typed semantic tree in a single pass
//! over a scope [`Context`]: name resolution, type inference, implicit
//! conversion insertion, literal narrowing and reduction, overload
//! resolution, and flow validation. Expression work lives in `expr.rs`,
//! statement work in `stmt.rs`, constant folding in `reduce.rs`.

pub mod context;
mod expr;
pub mod reduce;
mod stmt;

#[cfg(test)]
mod tests;

use crate::error::{SourceError, SourceResult};
use crate::ir::core::{Function, Program, TypedStmt};
use crate::types::RuleType;
use context::{BlockKind, Context};
use rules_lang_parser::ast::{Expr, Label, Stmt};
use rules_lang_parser::parser::literals::decode_integer;

/// The single-pass analyzer
#[derive(Debug)]
pub struct Lowering {
    pub(crate) context: Context,
    pub(crate) functions: Vec<Function>,
    pub(crate) input_type: RuleType,
    pub(crate) output_type: Option<RuleType>,
    /// Names whose definitions are being resolved; a reference back into
    /// this set is a type cycle
    resolving_types: Vec<String>,
}

impl Lowering {
    /// Create an analyzer for a rule file
    pub fn new() -> Self {
        Self::with_root(BlockKind::TopLevel)
    }

    /// Create an analyzer for the persistent shell session
    pub fn new_shell() -> Self {
        Self::with_root(BlockKind::Shell)
    }

    fn with_root(root: BlockKind) -> Self {
        Self {
            context: Context::new(root),
            functions: Vec::new(),
            input_type: RuleType::Structure { members: Vec::new() },
            output_type: None,
            resolving_types: Vec::new(),
        }
    }

    /// Analyze a whole program
    pub fn lower_program(stmts: &[Stmt]) -> SourceResult<Program> {
        let mut lowering = Lowering::new();
        let main = lowering.lower_statements(stmts)?;
        Ok(lowering.into_program(main))
    }

    /// Analyze one shell submission, keeping the session context
    pub fn lower_shell_input(&mut self, stmts: &[Stmt]) -> SourceResult<Vec<TypedStmt>> {
        self.lower_statements(stmts)
    }

    /// Analyze a single expression in the session context (the shell's
    /// expression mode)
    pub fn lower_shell_expression(
        &mut self,
        expr: &Expr,
    ) -> SourceResult<crate::ir::core::TypedExpr> {
        self.lower_expr(expr)
    }

    /// Snapshot the accumulated definitions into a program with the given
    /// main body
    pub fn into_program(self, main: Vec<TypedStmt>) -> Program {
        Program {
            functions: self.functions,
            main,
            main_slot_count: self.context.frame_slot_count(),
            input_type: self.input_type,
            output_type: self.output_type,
        }
    }

    /// Snapshot for the shell: clones the accumulated definitions so the
    /// session can keep lowering further submissions
    pub fn snapshot_program(&self, main: Vec<TypedStmt>) -> Program {
        Program {
            functions: self.functions.clone(),
            main,
            main_slot_count: self.context.frame_slot_count(),
            input_type: self.input_type.clone(),
            output_type: self.output_type.clone(),
        }
    }

    // ==================== Type expressions ====================

    /// Interpret an expression in type position
    pub(crate) fn resolve_type_expr(&mut self, expr: &Expr) -> SourceResult<RuleType> {
        match expr {
            Expr::Name { name, span } => {
                if self.resolving_types.iter().any(|n| n == name) {
                    return Err(SourceError::semantic_with_offender(
                        format!("Cyclic type reference through '{}'", name),
                        name,
                        *span,
                    ));
                }
                self.context.lookup_type(name).cloned().ok_or_else(|| {
                    SourceError::semantic_with_offender(
                        format!("Unknown type '{}'", name),
                        name,
                        *span,
                    )
                })
            }
            // `T[n]` is a sized array, `T[]` an unsized one.
            Expr::IndexAccess { value, index, span } => {
                let component = self.resolve_type_expr(value)?;
                let size = match index {
                    None => None,
                    Some(index) => Some(self.resolve_array_size(index, *span)?),
                };
                Ok(RuleType::Array {
                    component: Box::new(component),
                    size,
                })
            }
            // `{a: T, b: U}` is a structure, `{T, U}` a tuple.
            Expr::Composite(lit) => {
                let labeled = lit.parts.iter().filter(|p| p.label.is_some()).count();
                if labeled == 0 {
                    let members = lit
                        .parts
                        .iter()
                        .map(|p| self.resolve_type_expr(&p.value))
                        .collect::<SourceResult<Vec<_>>>()?;
                    return Ok(RuleType::Tuple(members));
                }
                if labeled != lit.parts.len() {
                    return Err(SourceError::semantic(
                        "A structure type labels every member",
                        lit.span,
                    ));
                }
                let mut members = Vec::with_capacity(lit.parts.len());
                for part in &lit.parts {
                    let name = match &part.label {
                        Some(Label::Name { name, .. }) => name.clone(),
                        Some(other) => {
                            return Err(SourceError::semantic(
                                "Structure member labels are names",
                                label_span(other),
                            ))
                        }
                        None => unreachable!("checked above"),
                    };
                    if members.iter().any(|(n, _)| *n == name) {
                        return Err(SourceError::semantic_with_offender(
                            format!("Duplicate member name '{}'", name),
                            &name,
                            lit.span,
                        ));
                    }
                    let ty = self.resolve_type_expr(&part.value)?;
                    members.push((name, ty));
                }
                Ok(RuleType::Structure { members })
            }
            Expr::Null { .. } => Ok(RuleType::NullLit),
            other => Err(SourceError::semantic(
                "Expected a type expression",
                other.span(),
            )),
        }
    }

    fn resolve_array_size(
        &mut self,
        index: &Expr,
        span: rules_lang_parser::span::Span,
    ) -> SourceResult<u64> {
        match index {
            Expr::Integer { text, span } => decode_integer(text).ok_or_else(|| {
                SourceError::semantic_with_offender("Integer overflows", text, *span)
            }),
            _ => Err(SourceError::semantic(
                "Array sizes are integer literals",
                span,
            )),
        }
    }

    /// Resolve a type definition's body with the cycle guard armed
    pub(crate) fn resolve_type_definition(
        &mut self,
        name: &str,
        ty: &Expr,
    ) -> SourceResult<RuleType> {
        self.resolving_types.push(name.to_string());
        let result = self.resolve_type_expr(ty);
        self.resolving_types.pop();
        result
    }
}

impl Default for Lowering {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn label_span(label: &Label) -> rules_lang_parser::span::Span {
    match label {
        Label::Name { span, .. } | Label::Index { span, .. } | Label::Other { span } => *span,
    }
}
