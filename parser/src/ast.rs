//! Defines the Abstract Syntax Tree (AST) for measure formulas.
//!
//! After the Lexer tokenizes a formula string, the Parser converts those
//! tokens into this tree structure. The engine's formula interpreter then
//! traverses the tree, resolving variables against per-cell bindings.
//!
//! SUPPORTED EXPRESSIONS:
//! - Literals: numbers
//! - Variables: revenue, 'Net Sales'
//! - Binary operations: +, -, *, /, ^
//! - Unary operations: - (negation)
//! - Function calls: ROUND(revenue / units, 2)

/// Represents a parsed formula expression.
#[derive(Debug, PartialEq, Clone)]
pub enum Expression {
    /// A numeric literal.
    Number(f64),

    /// A variable referencing a named field's per-cell sub-aggregation.
    Variable(String),

    /// A binary operation: left op right (e.g., revenue - cost).
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    /// A unary operation: op operand (e.g., -cost).
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// A function call like ROUND(x, 2) or MIN(a, b).
    FunctionCall { name: String, args: Vec<Expression> },
}

/// Binary operators for expressions.
/// Listed in order of precedence groups (additive is lowest).
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BinaryOperator {
    Add,      // +
    Subtract, // -
    Multiply, // *
    Divide,   // /
    Power,    // ^ (highest precedence among binary ops)
}

/// Unary operators.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum UnaryOperator {
    Negate, // -
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOperator::Add => write!(f, "+"),
            BinaryOperator::Subtract => write!(f, "-"),
            BinaryOperator::Multiply => write!(f, "*"),
            BinaryOperator::Divide => write!(f, "/"),
            BinaryOperator::Power => write!(f, "^"),
        }
    }
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Negate => write!(f, "-"),
        }
    }
}
