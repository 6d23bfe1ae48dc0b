//! Statement evaluation
//!
//! Every statement leaves the stack balanced, with one exception: `return`
//! leaves its value on top for the caller (a function call frame or the
//! rule driver) to consume.

use crate::error::SourceResult;
use crate::ir::core::{ExprKind, Program, TypedStmt};
use crate::types::identity::{self, IdentityKind};

use super::flow::Flow;
use super::Vm;

impl Vm {
    /// Run a statement list, bubbling any non-`Proceed` flow
    pub(crate) fn run_block(
        &mut self,
        program: &Program,
        stmts: &[TypedStmt],
    ) -> SourceResult<Flow> {
        for stmt in stmts {
            match self.exec_stmt(program, stmt)? {
                Flow::Proceed => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Proceed)
    }

    fn exec_stmt(&mut self, program: &Program, stmt: &TypedStmt) -> SourceResult<Flow> {
        match stmt {
            TypedStmt::Declare {
                slot, ty, value, ..
            } => {
                let bits = match value {
                    Some(value) => {
                        self.eval_expr(program, value)?;
                        self.stack.pop_scalar(ty)
                    }
                    None => 0,
                };
                self.locals()[*slot] = bits;
                Ok(Flow::Proceed)
            }
            TypedStmt::AssignLocal { slot, value, .. } => {
                self.eval_expr(program, value)?;
                let bits = self.stack.pop_scalar(&value.ty);
                self.locals()[*slot] = bits;
                Ok(Flow::Proceed)
            }
            TypedStmt::AssignMember {
                object,
                name,
                index,
                value,
                span,
            } => {
                self.eval_expr(program, object)?;
                let addr = self.stack.pop_scalar(&object.ty);
                self.null_check(addr, *span)?;
                let record = identity::lookup(self.heap.identity_at(addr));
                let offset = match record.kind {
                    IdentityKind::Struct if !name.is_empty() => {
                        record
                            .offset_by_name(name)
                            .expect("member resolved during analysis")
                            .0
                    }
                    _ => record.member_offsets[*index],
                };
                self.eval_expr(program, value)?;
                let bits = self.stack.pop_scalar(&value.ty);
                let member_addr = self.heap.data_addr(addr) + offset as u64;
                self.heap_write_value(&value.ty, member_addr, bits);
                Ok(Flow::Proceed)
            }
            TypedStmt::AssignElement {
                object,
                index,
                value,
                span,
            } => {
                self.eval_expr(program, object)?;
                let addr = self.stack.pop_scalar(&object.ty);
                self.null_check(addr, *span)?;
                self.eval_expr(program, index)?;
                let position = self.stack.pop_scalar(&index.ty) as i64;
                let element = self.element_addr(addr, position, *span)?;
                self.eval_expr(program, value)?;
                let bits = self.stack.pop_scalar(&value.ty);
                self.heap_write_value(&value.ty, element, bits);
                Ok(Flow::Proceed)
            }
            TypedStmt::Call { call, .. } => {
                self.eval_expr(program, call)?;
                // A non-void callee left its result on the stack; statement
                // position discards it.
                if let ExprKind::Call { function, .. } = &call.kind {
                    if let Some(return_type) = &program.functions[*function].return_type {
                        self.stack.pop_scalar(return_type);
                    }
                }
                Ok(Flow::Proceed)
            }
            TypedStmt::If { arms, falsy, .. } => {
                for (condition, body) in arms {
                    self.eval_expr(program, condition)?;
                    let taken = self.stack.pop_scalar(&condition.ty) != 0;
                    if taken {
                        return self.run_block(program, body);
                    }
                }
                self.run_block(program, falsy)
            }
            TypedStmt::While {
                label,
                condition,
                body,
                ..
            } => {
                loop {
                    self.eval_expr(program, condition)?;
                    let live = self.stack.pop_scalar(&condition.ty) != 0;
                    if !live {
                        return Ok(Flow::Proceed);
                    }
                    match self.run_block(program, body)? {
                        Flow::Proceed => {}
                        Flow::Continue(target) if Flow::matches_loop(&target, label) => {}
                        Flow::Break(target) if Flow::matches_loop(&target, label) => {
                            return Ok(Flow::Proceed)
                        }
                        other => return Ok(other),
                    }
                }
            }
            TypedStmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.eval_expr(program, value)?;
                    self.returned_type = Some(value.ty.clone());
                } else {
                    self.returned_type = None;
                }
                Ok(Flow::Return)
            }
            TypedStmt::Break { label, .. } => Ok(Flow::Break(label.clone())),
            TypedStmt::Continue { label, .. } => Ok(Flow::Continue(label.clone())),
        }
    }
}
