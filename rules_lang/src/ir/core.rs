//! The typed semantic tree
//!
//! Output of the semantic analyzer, input of the evaluator. Every node
//! carries its resolved type and the span of the syntax it came from.
//! Implicit conversions appear as explicit [`ExprKind::Convert`] nodes;
//! composite literals are decomposed into tuple/struct/array literal nodes
//! whose element order matches the target layout; names are resolved to
//! frame slots and function indices.

use serde::{Deserialize, Serialize};

use crate::types::{RuleType, StrEncoding};
use rules_lang_parser::span::Span;

/// A whole analyzed program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub functions: Vec<Function>,
    /// Top-level statements
    pub main: Vec<TypedStmt>,
    /// Frame slots the top level needs
    pub main_slot_count: usize,
    /// The rule input type (the `Input` structure; empty when undeclared)
    pub input_type: RuleType,
    /// Joined type of all top-level `return` values; `None` when the top
    /// level never returns a value
    pub output_type: Option<RuleType>,
}

/// An analyzed function definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Option<RuleType>,
    pub body: Vec<TypedStmt>,
    /// Frame slots the body needs, parameters included
    pub slot_count: usize,
    pub span: Span,
}

/// A function parameter bound to its frame slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: RuleType,
    pub slot: usize,
}

/// Unary operator of the semantic tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Arithmetic negation
    Negate,
    /// Logical not
    Not,
    /// Bitwise complement
    BitNot,
}

/// Binary operator of the semantic tree. Both operands have been converted
/// to the same atomic type by the analyzer, except for the address
/// comparisons, whose operands are references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Shl,
    Shr,
    Ushr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `===` on references: address identity
    AddrEq,
    /// `!==` on references
    AddrNe,
}

/// Short-circuit / eager logical operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

/// A typed expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedExpr {
    pub ty: RuleType,
    pub span: Span,
    pub kind: ExprKind,
}

/// Expression node variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Bool(bool),
    Sint(i64),
    Uint(u64),
    Float(f64),
    Str {
        encoding: StrEncoding,
        value: String,
    },
    Null,
    /// Read a frame slot
    ReadLocal { slot: usize },
    /// Read a member of the rule input
    ContextField { name: String, index: usize },
    /// Member access; tuples resolve by `index`, structures by `name`
    /// (the runtime identity may order members differently after widening)
    FieldAccess {
        value: Box<TypedExpr>,
        name: String,
        index: usize,
    },
    /// Array element access with a runtime bounds check
    IndexAccess {
        value: Box<TypedExpr>,
        index: Box<TypedExpr>,
    },
    /// Tuple literal in layout order
    TupleLiteral { values: Vec<Option<TypedExpr>> },
    /// Structure literal in the layout order of its type
    StructLiteral { values: Vec<Option<TypedExpr>> },
    /// Array literal; absent positions take the once-evaluated `other`
    /// value, or stay zeroed
    ArrayLiteral {
        values: Vec<Option<TypedExpr>>,
        other: Option<Box<TypedExpr>>,
    },
    /// Call of a resolved function overload
    Call {
        function: usize,
        args: Vec<TypedExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    /// Array concatenation (length-prefixed operands of any kind)
    Concat {
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    /// `lo .. hi`: materialize the half-open range as an array
    RangeArray {
        lo: Box<TypedExpr>,
        hi: Box<TypedExpr>,
    },
    /// Implicit conversion of `value` to this node's type
    Convert { value: Box<TypedExpr> },
    Conditional {
        condition: Box<TypedExpr>,
        truthy: Box<TypedExpr>,
        falsy: Box<TypedExpr>,
    },
    /// Static member access over a type name; evaluation is not implemented
    StaticField { type_name: String, name: String },
}

impl TypedExpr {
    /// Check if this node is a literal value (the literal-reduction fixpoint)
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Bool(_)
                | ExprKind::Sint(_)
                | ExprKind::Uint(_)
                | ExprKind::Float(_)
                | ExprKind::Str { .. }
                | ExprKind::Null
        )
    }
}

/// A typed statement node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypedStmt {
    /// Variable declaration; a missing value zero-initializes the slot
    Declare {
        slot: usize,
        ty: RuleType,
        value: Option<TypedExpr>,
        span: Span,
    },
    /// Assignment to a frame slot
    AssignLocal {
        slot: usize,
        value: TypedExpr,
        span: Span,
    },
    /// Assignment to a tuple/structure member
    AssignMember {
        object: TypedExpr,
        name: String,
        index: usize,
        value: TypedExpr,
        span: Span,
    },
    /// Assignment to an array element
    AssignElement {
        object: TypedExpr,
        index: TypedExpr,
        value: TypedExpr,
        span: Span,
    },
    /// A call in statement position; its value, if any, is discarded
    Call { call: TypedExpr, span: Span },
    /// `if`/`elif`/`else`
    If {
        arms: Vec<(TypedExpr, Vec<TypedStmt>)>,
        falsy: Vec<TypedStmt>,
        span: Span,
    },
    /// `while`
    While {
        label: Option<String>,
        condition: TypedExpr,
        body: Vec<TypedStmt>,
        span: Span,
    },
    Return {
        value: Option<TypedExpr>,
        span: Span,
    },
    Break {
        label: Option<String>,
        span: Span,
    },
    Continue {
        label: Option<String>,
        span: Span,
    },
}

impl TypedStmt {
    /// The source span of this node
    pub fn span(&self) -> Span {
        match self {
            TypedStmt::Declare { span, .. }
            | TypedStmt::AssignLocal { span, .. }
            | TypedStmt::AssignMember { span, .. }
            | TypedStmt::AssignElement { span, .. }
            | TypedStmt::Call { span, .. }
            | TypedStmt::If { span, .. }
            | TypedStmt::While { span, .. }
            | TypedStmt::Return { span, .. }
            | TypedStmt::Break { span, .. }
            | TypedStmt::Continue { span, .. } => *span,
        }
    }
}
