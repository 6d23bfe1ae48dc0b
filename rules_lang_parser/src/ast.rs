//! Syntactic tree for RulesLang
//!
//! One tagged sum per category: [`Expr`] for expressions, [`Stmt`] for
//! statements. Every node carries the span of the source text it was parsed
//! from. The formatter renders a tree back to its normal form: one statement
//! per line, two-space block indentation, single-space operator spacing,
//! nested compound operands parenthesized. The normal form re-parses to the
//! same tree, which keeps formatting idempotent.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Binary operator tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Exponent,
    Multiply,
    Divide,
    Remainder,
    Add,
    Subtract,
    ShiftLeft,
    ShiftRight,
    ShiftRightUnsigned,
    BitAnd,
    BitXor,
    BitOr,
    LogicalAnd,
    LogicalXor,
    LogicalOr,
    Concatenate,
    Range,
}

impl BinaryOp {
    /// The operator's source lexeme
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Exponent => "**",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Remainder => "%",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::ShiftLeft => "<<",
            BinaryOp::ShiftRight => ">>",
            BinaryOp::ShiftRightUnsigned => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitXor => "^",
            BinaryOp::BitOr => "|",
            BinaryOp::LogicalAnd => "&&",
            BinaryOp::LogicalXor => "^^",
            BinaryOp::LogicalOr => "||",
            BinaryOp::Concatenate => "~",
            BinaryOp::Range => "..",
        }
    }
}

/// Value comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Identical,
    NotIdentical,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Identical => "===",
            CompareOp::NotIdentical => "!==",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
            CompareOp::Less => "<",
            CompareOp::Greater => ">",
            CompareOp::LessEqual => "<=",
            CompareOp::GreaterEqual => ">=",
        }
    }
}

/// Type comparison operator (the optional trailing member of a compare chain)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTestOp {
    Same,
    NotSame,
    Subtype,
    Supertype,
    ProperSubtype,
    ProperSupertype,
    Related,
}

impl TypeTestOp {
    pub fn symbol(self) -> &'static str {
        match self {
            TypeTestOp::Same => "::",
            TypeTestOp::NotSame => "!:",
            TypeTestOp::Subtype => "<:",
            TypeTestOp::Supertype => ">:",
            TypeTestOp::ProperSubtype => "<<:",
            TypeTestOp::ProperSupertype => ">>:",
            TypeTestOp::Related => "<:>",
        }
    }
}

/// A label inside a composite literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Label {
    /// Structure member name
    Name { name: String, span: Span },
    /// Array index
    Index { index: u64, span: Span },
    /// The catch-all `other` label
    Other { span: Span },
}

/// A possibly-labeled part of a composite literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledValue {
    pub label: Option<Label>,
    pub value: Expr,
}

/// A brace-enclosed composite literal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeLiteral {
    pub parts: Vec<LabeledValue>,
    pub span: Span,
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// A bare name
    Name { name: String, span: Span },
    /// `.name` — a field of the rule input
    ContextField { name: String, span: Span },
    /// `value.name`
    FieldAccess {
        value: Box<Expr>,
        name: String,
        span: Span,
    },
    /// `value[index]`; the index is absent in unsized-array type position
    IndexAccess {
        value: Box<Expr>,
        index: Option<Box<Expr>>,
        span: Span,
    },
    /// `value(args...)`
    Call {
        value: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    /// Unary `+`/`-`
    Sign {
        negative: bool,
        operand: Box<Expr>,
        span: Span,
    },
    /// Unary `!`
    LogicalNot { operand: Box<Expr>, span: Span },
    /// Unary `~`
    BitwiseNot { operand: Box<Expr>, span: Span },
    /// Any binary operator except comparisons
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// A comparison chain with an optional trailing type test
    Compare {
        first: Box<Expr>,
        comparisons: Vec<(CompareOp, Expr)>,
        type_test: Option<(TypeTestOp, Box<Expr>)>,
        span: Span,
    },
    /// `lhs name rhs` — named infix function call
    Infix {
        name: String,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },
    /// `truthy if condition else falsy`
    Conditional {
        truthy: Box<Expr>,
        condition: Box<Expr>,
        falsy: Box<Expr>,
        span: Span,
    },
    /// `{ ... }`
    Composite(CompositeLiteral),
    /// `Name { ... }`
    Initializer {
        type_name: String,
        type_span: Span,
        literal: CompositeLiteral,
        span: Span,
    },
    /// `true` / `false`
    Boolean { value: bool, span: Span },
    /// Integer literal, raw text (decimal, hex, or binary, with underscores)
    Integer { text: String, span: Span },
    /// Float literal, raw text
    Float { text: String, span: Span },
    /// String literal, escapes decoded
    Str { value: String, span: Span },
    /// `null`
    Null { span: Span },
}

impl Expr {
    /// The source span of this node
    pub fn span(&self) -> Span {
        match self {
            Expr::Name { span, .. }
            | Expr::ContextField { span, .. }
            | Expr::FieldAccess { span, .. }
            | Expr::IndexAccess { span, .. }
            | Expr::Call { span, .. }
            | Expr::Sign { span, .. }
            | Expr::LogicalNot { span, .. }
            | Expr::BitwiseNot { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Compare { span, .. }
            | Expr::Infix { span, .. }
            | Expr::Conditional { span, .. }
            | Expr::Initializer { span, .. }
            | Expr::Boolean { span, .. }
            | Expr::Integer { span, .. }
            | Expr::Float { span, .. }
            | Expr::Str { span, .. }
            | Expr::Null { span } => *span,
            Expr::Composite(lit) => lit.span,
        }
    }

    /// An expression that prints with interior spaces and needs parentheses
    /// when used as an operand
    fn is_compound(&self) -> bool {
        matches!(
            self,
            Expr::Binary { .. }
                | Expr::Compare { .. }
                | Expr::Infix { .. }
                | Expr::Conditional { .. }
        )
    }
}

/// Declaration keyword of a variable declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclKind {
    Let,
    Var,
}

/// One `if`/`elif` arm of a conditional statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionBlock {
    pub condition: Expr,
    pub statements: Vec<Stmt>,
    pub span: Span,
}

/// A function parameter: `Type name`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub type_name: String,
    pub type_span: Span,
    pub name: String,
    pub span: Span,
}

/// Statement node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `def Name: type`
    TypeDefinition { name: String, ty: Expr, span: Span },
    /// `let`/`var` declaration
    VariableDeclaration {
        kind: DeclKind,
        type_name: Option<(String, Span)>,
        name: String,
        value: Option<Expr>,
        span: Span,
    },
    /// `target = value`, or `target op= value` before operator expansion.
    /// The operator carries its own token span: the expander's rewritten
    /// binary node starts at the assignment operator's offset.
    Assignment {
        target: Expr,
        op: Option<(BinaryOp, Span)>,
        value: Expr,
        span: Span,
    },
    /// A function call in statement position
    CallStatement { call: Expr, span: Span },
    /// `if`/`elif`/`else` chain; at least one condition block
    Conditional {
        blocks: Vec<ConditionBlock>,
        false_statements: Vec<Stmt>,
        span: Span,
    },
    /// `while cond:` with an optional `Label:` prefix
    Loop {
        label: Option<String>,
        condition: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `func name(params) [Return]:`
    FunctionDefinition {
        name: String,
        params: Vec<Parameter>,
        return_type: Option<(String, Span)>,
        body: Vec<Stmt>,
        span: Span,
    },
    /// `return [value]`
    Return { value: Option<Expr>, span: Span },
    /// `break [label]`
    Break { label: Option<String>, span: Span },
    /// `continue [label]`
    Continue { label: Option<String>, span: Span },
}

impl Stmt {
    /// The source span of this node
    pub fn span(&self) -> Span {
        match self {
            Stmt::TypeDefinition { span, .. }
            | Stmt::VariableDeclaration { span, .. }
            | Stmt::Assignment { span, .. }
            | Stmt::CallStatement { span, .. }
            | Stmt::Conditional { span, .. }
            | Stmt::Loop { span, .. }
            | Stmt::FunctionDefinition { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Break { span, .. }
            | Stmt::Continue { span, .. } => *span,
        }
    }
}

// ==================== Formatter ====================

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expr) -> fmt::Result {
    if expr.is_compound() {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

fn write_string_literal(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in value.chars() {
        match c {
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            '\0' => f.write_str("\\0")?,
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            c if (c as u32) < 0x20 => write!(f, "\\u{:04x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

impl fmt::Display for CompositeLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('{')?;
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &part.label {
                Some(Label::Name { name, .. }) => write!(f, "{}: ", name)?,
                Some(Label::Index { index, .. }) => write!(f, "{}: ", index)?,
                Some(Label::Other { .. }) => f.write_str("other: ")?,
                None => {}
            }
            write!(f, "{}", part.value)?;
        }
        f.write_char('}')
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Name { name, .. } => f.write_str(name),
            Expr::ContextField { name, .. } => write!(f, ".{}", name),
            Expr::FieldAccess { value, name, .. } => {
                write_operand(f, value)?;
                write!(f, ".{}", name)
            }
            Expr::IndexAccess { value, index, .. } => {
                write_operand(f, value)?;
                match index {
                    Some(index) => write!(f, "[{}]", index),
                    None => f.write_str("[]"),
                }
            }
            Expr::Call { value, args, .. } => {
                write_operand(f, value)?;
                f.write_char('(')?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_char(')')
            }
            Expr::Sign {
                negative, operand, ..
            } => {
                f.write_char(if *negative { '-' } else { '+' })?;
                write_operand(f, operand)
            }
            Expr::LogicalNot { operand, .. } => {
                f.write_char('!')?;
                write_operand(f, operand)
            }
            Expr::BitwiseNot { operand, .. } => {
                f.write_char('~')?;
                write_operand(f, operand)
            }
            Expr::Binary { op, lhs, rhs, .. } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, rhs)
            }
            Expr::Compare {
                first,
                comparisons,
                type_test,
                ..
            } => {
                write_operand(f, first)?;
                for (op, rhs) in comparisons {
                    write!(f, " {} ", op.symbol())?;
                    write_operand(f, rhs)?;
                }
                if let Some((op, ty)) = type_test {
                    write!(f, " {} ", op.symbol())?;
                    write_operand(f, ty)?;
                }
                Ok(())
            }
            Expr::Infix { name, lhs, rhs, .. } => {
                write_operand(f, lhs)?;
                write!(f, " {} ", name)?;
                write_operand(f, rhs)
            }
            Expr::Conditional {
                truthy,
                condition,
                falsy,
                ..
            } => {
                write_operand(f, truthy)?;
                f.write_str(" if ")?;
                write_operand(f, condition)?;
                f.write_str(" else ")?;
                write_operand(f, falsy)
            }
            Expr::Composite(lit) => write!(f, "{}", lit),
            Expr::Initializer {
                type_name, literal, ..
            } => write!(f, "{} {}", type_name, literal),
            Expr::Boolean { value, .. } => write!(f, "{}", value),
            Expr::Integer { text, .. } => f.write_str(text),
            Expr::Float { text, .. } => f.write_str(text),
            Expr::Str { value, .. } => write_string_literal(f, value),
            Expr::Null { .. } => f.write_str("null"),
        }
    }
}

fn write_stmt(out: &mut String, stmt: &Stmt, indent: usize) {
    let pad = "  ".repeat(indent);
    match stmt {
        Stmt::TypeDefinition { name, ty, .. } => {
            let _ = writeln!(out, "{}def {}: {}", pad, name, ty);
        }
        Stmt::VariableDeclaration {
            kind,
            type_name,
            name,
            value,
            ..
        } => {
            let keyword = match kind {
                DeclKind::Let => "let",
                DeclKind::Var => "var",
            };
            let _ = write!(out, "{}{}", pad, keyword);
            if let Some((ty, _)) = type_name {
                let _ = write!(out, " {}", ty);
            }
            let _ = write!(out, " {}", name);
            if let Some(value) = value {
                let _ = write!(out, " = {}", value);
            }
            out.push('\n');
        }
        Stmt::Assignment {
            target, op, value, ..
        } => {
            let _ = match op {
                Some((op, _)) => writeln!(out, "{}{} {}= {}", pad, target, op.symbol(), value),
                None => writeln!(out, "{}{} = {}", pad, target, value),
            };
        }
        Stmt::CallStatement { call, .. } => {
            let _ = writeln!(out, "{}{}", pad, call);
        }
        Stmt::Conditional {
            blocks,
            false_statements,
            ..
        } => {
            for (i, block) in blocks.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "elif" };
                let _ = writeln!(out, "{}{} {}:", pad, keyword, block.condition);
                for inner in &block.statements {
                    write_stmt(out, inner, indent + 1);
                }
            }
            if !false_statements.is_empty() {
                let _ = writeln!(out, "{}else:", pad);
                for inner in false_statements {
                    write_stmt(out, inner, indent + 1);
                }
            }
        }
        Stmt::Loop {
            label,
            condition,
            body,
            ..
        } => {
            let _ = match label {
                Some(label) => writeln!(out, "{}{}: while {}:", pad, label, condition),
                None => writeln!(out, "{}while {}:", pad, condition),
            };
            for inner in body {
                write_stmt(out, inner, indent + 1);
            }
        }
        Stmt::FunctionDefinition {
            name,
            params,
            return_type,
            body,
            ..
        } => {
            let _ = write!(out, "{}func {}(", pad, name);
            for (i, param) in params.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                let _ = write!(out, "{} {}", param.type_name, param.name);
            }
            out.push(')');
            if let Some((ty, _)) = return_type {
                let _ = write!(out, " {}", ty);
            }
            out.push_str(":\n");
            for inner in body {
                write_stmt(out, inner, indent + 1);
            }
        }
        Stmt::Return { value, .. } => {
            let _ = match value {
                Some(value) => writeln!(out, "{}return {}", pad, value),
                None => writeln!(out, "{}return", pad),
            };
        }
        Stmt::Break { label, .. } => {
            let _ = match label {
                Some(label) => writeln!(out, "{}break {}", pad, label),
                None => writeln!(out, "{}break", pad),
            };
        }
        Stmt::Continue { label, .. } => {
            let _ = match label {
                Some(label) => writeln!(out, "{}continue {}", pad, label),
                None => writeln!(out, "{}continue", pad),
            };
        }
    }
}

/// Render a statement list to its normal form
pub fn format_program(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    for stmt in stmts {
        write_stmt(&mut out, stmt, 0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> Expr {
        Expr::Name {
            name: n.to_string(),
            span: Span::empty(),
        }
    }

    fn int(text: &str) -> Expr {
        Expr::Integer {
            text: text.to_string(),
            span: Span::empty(),
        }
    }

    #[test]
    fn test_format_binary() {
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(int("1")),
            rhs: Box::new(Expr::Binary {
                op: BinaryOp::Multiply,
                lhs: Box::new(int("2")),
                rhs: Box::new(int("3")),
                span: Span::empty(),
            }),
            span: Span::empty(),
        };
        assert_eq!(expr.to_string(), "1 + (2 * 3)");
    }

    #[test]
    fn test_format_string_escapes() {
        let expr = Expr::Str {
            value: "a\n\"b\"\\".to_string(),
            span: Span::empty(),
        };
        assert_eq!(expr.to_string(), "\"a\\n\\\"b\\\"\\\\\"");
    }

    #[test]
    fn test_format_statement() {
        let stmt = Stmt::VariableDeclaration {
            kind: DeclKind::Let,
            type_name: Some(("Test".to_string(), Span::empty())),
            name: "t".to_string(),
            value: Some(Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(int("1")),
                rhs: Box::new(int("1")),
                span: Span::empty(),
            }),
            span: Span::empty(),
        };
        assert_eq!(format_program(&[stmt]), "let Test t = 1 + 1\n");
    }

    #[test]
    fn test_format_conditional() {
        let stmt = Stmt::Conditional {
            blocks: vec![ConditionBlock {
                condition: name("a"),
                statements: vec![Stmt::Assignment {
                    target: name("b"),
                    op: None,
                    value: int("1"),
                    span: Span::empty(),
                }],
                span: Span::empty(),
            }],
            false_statements: vec![Stmt::Assignment {
                target: name("c"),
                op: None,
                value: int("2"),
                span: Span::empty(),
            }],
            span: Span::empty(),
        };
        assert_eq!(
            format_program(&[stmt]),
            "if a:\n  b = 1\nelse:\n  c = 2\n"
        );
    }
}
