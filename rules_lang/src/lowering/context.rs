//! Name resolution context
//!
//! A stack of scope blocks. Each block has a kind, a variable map, a type
//! map, and a function map; lookup walks outward. Shadowing an outer name
//! is allowed, redefining a name in the same block is an error. The root
//! block carries the builtin type names.

use std::collections::HashMap;

use crate::error::{SourceError, SourceResult};
use crate::types::RuleType;
use rules_lang_parser::span::Span;

/// What kind of scope a block is
#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    /// The persistent interactive session scope
    Shell,
    /// A rule file's top level
    TopLevel,
    /// A function body; carries the declared return type
    Function { return_type: Option<RuleType> },
    /// A loop body; `break`/`continue` target the innermost one
    Loop { label: Option<String> },
    /// An `if`/`elif`/`else` arm
    Conditional,
}

/// A resolved variable binding
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub slot: usize,
    pub ty: RuleType,
}

#[derive(Debug)]
struct Block {
    kind: BlockKind,
    variables: HashMap<String, Variable>,
    types: HashMap<String, RuleType>,
    /// Function name to overload indices into the program function list
    functions: HashMap<String, Vec<usize>>,
}

impl Block {
    fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            variables: HashMap::new(),
            types: HashMap::new(),
            functions: HashMap::new(),
        }
    }
}

/// The scope stack
#[derive(Debug)]
pub struct Context {
    blocks: Vec<Block>,
    /// One frame-slot counter per open frame (root plus each function)
    slot_counters: Vec<usize>,
}

impl Context {
    /// Create a context with the builtin types and a root block of the
    /// given kind (`TopLevel` for files, `Shell` for the session)
    pub fn new(root: BlockKind) -> Self {
        let mut builtins = Block::new(BlockKind::TopLevel);
        for (name, ty) in [
            ("bool", RuleType::Bool),
            ("sint8", RuleType::Sint8),
            ("sint16", RuleType::Sint16),
            ("sint32", RuleType::Sint32),
            ("sint64", RuleType::Sint64),
            ("uint8", RuleType::Uint8),
            ("uint16", RuleType::Uint16),
            ("uint32", RuleType::Uint32),
            ("uint64", RuleType::Uint64),
            ("fp32", RuleType::Fp32),
            ("fp64", RuleType::Fp64),
            ("any", RuleType::Any),
        ] {
            builtins.types.insert(name.to_string(), ty);
        }
        Self {
            blocks: vec![builtins, Block::new(root)],
            slot_counters: vec![0],
        }
    }

    /// Open a nested block
    pub fn push(&mut self, kind: BlockKind) {
        if matches!(kind, BlockKind::Function { .. }) {
            self.slot_counters.push(0);
        }
        self.blocks.push(Block::new(kind));
    }

    /// Close the innermost block; returns the frame slot count when a
    /// function frame was closed
    pub fn pop(&mut self) -> Option<usize> {
        let block = self.blocks.pop().expect("unbalanced context pop");
        if matches!(block.kind, BlockKind::Function { .. }) {
            return self.slot_counters.pop();
        }
        None
    }

    /// Allocate a frame slot in the current frame
    pub fn allocate_slot(&mut self) -> usize {
        let counter = self
            .slot_counters
            .last_mut()
            .expect("no open frame");
        let slot = *counter;
        *counter += 1;
        slot
    }

    /// Slots allocated so far in the current frame
    pub fn frame_slot_count(&self) -> usize {
        *self.slot_counters.last().expect("no open frame")
    }

    /// Bind a variable in the current block
    pub fn define_variable(
        &mut self,
        name: &str,
        ty: RuleType,
        span: Span,
    ) -> SourceResult<Variable> {
        let slot = self.allocate_slot();
        let block = self.blocks.last_mut().expect("no open block");
        if block.variables.contains_key(name) {
            return Err(SourceError::semantic_with_offender(
                format!("Variable '{}' is already defined in this block", name),
                name,
                span,
            ));
        }
        let variable = Variable { slot, ty };
        block.variables.insert(name.to_string(), variable.clone());
        Ok(variable)
    }

    /// Look up a variable, walking outward
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.blocks
            .iter()
            .rev()
            .find_map(|block| block.variables.get(name))
    }

    /// Bind a type name in the current block
    pub fn define_type(&mut self, name: &str, ty: RuleType, span: Span) -> SourceResult<()> {
        let block = self.blocks.last_mut().expect("no open block");
        if block.types.contains_key(name) {
            return Err(SourceError::semantic_with_offender(
                format!("Type '{}' is already defined in this block", name),
                name,
                span,
            ));
        }
        block.types.insert(name.to_string(), ty);
        Ok(())
    }

    /// Look up a type name, walking outward
    pub fn lookup_type(&self, name: &str) -> Option<&RuleType> {
        self.blocks
            .iter()
            .rev()
            .find_map(|block| block.types.get(name))
    }

    /// Register a function overload in the current block
    pub fn define_function(&mut self, name: &str, index: usize) {
        let block = self.blocks.last_mut().expect("no open block");
        block.functions.entry(name.to_string()).or_default().push(index);
    }

    /// Collect every visible overload of a function name, innermost first
    pub fn function_overloads(&self, name: &str) -> Vec<usize> {
        let mut overloads = Vec::new();
        for block in self.blocks.iter().rev() {
            if let Some(indices) = block.functions.get(name) {
                overloads.extend(indices.iter().copied());
            }
        }
        overloads
    }

    /// Check if a function with this name is visible at all
    pub fn has_function(&self, name: &str) -> bool {
        self.blocks
            .iter()
            .any(|block| block.functions.contains_key(name))
    }

    /// The declared return type of the innermost enclosing function, or
    /// `None` when the statement sits at the top level / shell
    pub fn enclosing_function(&self) -> Option<&Option<RuleType>> {
        self.blocks.iter().rev().find_map(|block| match &block.kind {
            BlockKind::Function { return_type } => Some(return_type),
            _ => None,
        })
    }

    /// Check whether a `break`/`continue` with an optional label is legal
    /// here: a loop must enclose it lexically (within the current function),
    /// and a label must name one of the enclosing loops
    pub fn find_loop(&self, label: Option<&str>) -> bool {
        for block in self.blocks.iter().rev() {
            match &block.kind {
                BlockKind::Function { .. } => return false,
                BlockKind::Loop { label: loop_label } => match label {
                    None => return true,
                    Some(wanted) => {
                        if loop_label.as_deref() == Some(wanted) {
                            return true;
                        }
                    }
                },
                _ => {}
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::empty()
    }

    #[test]
    fn test_shadowing_and_collision() {
        let mut ctx = Context::new(BlockKind::TopLevel);
        ctx.define_variable("x", RuleType::Sint64, span()).unwrap();
        // Same block: collision
        assert!(ctx.define_variable("x", RuleType::Bool, span()).is_err());
        // Inner block: shadowing
        ctx.push(BlockKind::Conditional);
        let inner = ctx.define_variable("x", RuleType::Bool, span()).unwrap();
        assert_eq!(ctx.variable("x").unwrap().slot, inner.slot);
        ctx.pop();
        assert_eq!(ctx.variable("x").unwrap().ty, RuleType::Sint64);
    }

    #[test]
    fn test_builtin_types_resolve() {
        let ctx = Context::new(BlockKind::TopLevel);
        assert_eq!(ctx.lookup_type("sint32"), Some(&RuleType::Sint32));
        assert_eq!(ctx.lookup_type("any"), Some(&RuleType::Any));
        assert_eq!(ctx.lookup_type("missing"), None);
    }

    #[test]
    fn test_function_frames_get_fresh_slots() {
        let mut ctx = Context::new(BlockKind::TopLevel);
        ctx.define_variable("a", RuleType::Sint64, span()).unwrap();
        ctx.push(BlockKind::Function { return_type: None });
        assert_eq!(ctx.allocate_slot(), 0);
        assert_eq!(ctx.allocate_slot(), 1);
        let frame = ctx.pop();
        assert_eq!(frame, Some(2));
        // Back in the root frame
        assert_eq!(ctx.allocate_slot(), 1);
    }

    #[test]
    fn test_loop_lookup() {
        let mut ctx = Context::new(BlockKind::TopLevel);
        assert!(!ctx.find_loop(None));
        ctx.push(BlockKind::Loop {
            label: Some("outer".to_string()),
        });
        ctx.push(BlockKind::Loop { label: None });
        assert!(ctx.find_loop(None));
        assert!(ctx.find_loop(Some("outer")));
        assert!(!ctx.find_loop(Some("missing")));
        // A function boundary hides enclosing loops
        ctx.push(BlockKind::Function { return_type: None });
        assert!(!ctx.find_loop(None));
    }
}
