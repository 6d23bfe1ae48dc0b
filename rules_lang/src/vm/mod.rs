//! Tree-walking evaluator
//!
//! Executes the typed semantic tree over the value stack and the heap.
//! Atomic values travel on the stack at their native size; composite
//! values are identity-headed heap blocks addressed by `u64`. Frames hold
//! one 8-byte cell per local slot.

pub mod flow;
pub mod format;
pub mod heap;
pub mod stack;
pub mod strings;

mod exec_expr;
mod exec_stmt;


use crate::error::{SourceError, SourceResult};
use crate::ir::core::Program;
use crate::types::RuleType;
use flow::Flow;
use heap::Heap;
use stack::Stack;

/// The evaluator state
#[derive(Debug)]
pub struct Vm {
    pub stack: Stack,
    pub heap: Heap,
    /// One frame per active call; frame 0 is the top level and persists
    /// across shell submissions
    frames: Vec<Vec<u64>>,
    /// Address of the rule input object; 0 when no input is bound
    context_addr: u64,
    /// Static type of the value a top-level `return` left on the stack
    returned_type: Option<RuleType>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self {
            stack: Stack::new(),
            heap: Heap::new(),
            frames: vec![Vec::new()],
            context_addr: 0,
            returned_type: None,
        }
    }

    /// Bind the rule input object
    pub fn set_context(&mut self, addr: u64) {
        self.context_addr = addr;
    }

    /// The type of the value left by the last top-level `return`, if any
    pub fn returned_type(&self) -> Option<&RuleType> {
        self.returned_type.as_ref()
    }

    fn locals(&mut self) -> &mut Vec<u64> {
        self.frames.last_mut().expect("no active frame")
    }

    fn local(&self, slot: usize) -> u64 {
        self.frames.last().expect("no active frame")[slot]
    }

    /// Run a program's top-level statements in frame 0. Returns the final
    /// flow: `Return` means a top-level return fired and, when
    /// [`Vm::returned_type`] is set, its value sits on top of the stack.
    pub fn run_main(&mut self, program: &Program) -> SourceResult<Flow> {
        let base = self.frames.first_mut().expect("no base frame");
        if base.len() < program.main_slot_count {
            base.resize(program.main_slot_count, 0);
        }
        self.returned_type = None;
        self.run_block(program, &program.main)
    }

    /// Evaluate a single expression, leaving its value on top of the stack
    /// (the shell's expression mode)
    pub fn eval(
        &mut self,
        program: &Program,
        expr: &crate::ir::core::TypedExpr,
    ) -> SourceResult<()> {
        let base = self.frames.first_mut().expect("no base frame");
        if base.len() < program.main_slot_count {
            base.resize(program.main_slot_count, 0);
        }
        self.eval_expr(program, expr)
    }

    /// Raise a null-reference failure at a source span
    fn null_check(&self, addr: u64, span: rules_lang_parser::span::Span) -> SourceResult<()> {
        if addr == 0 {
            return Err(SourceError::runtime("Null reference", span));
        }
        Ok(())
    }
}
