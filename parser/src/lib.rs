//! Library root for the measure formula parser.
//!
//! Custom measures in a pivot configuration carry a small arithmetic
//! formula over named fields. This crate converts such a formula string
//! into an expression tree that the engine can interpret over per-cell
//! variable bindings. No evaluation happens here.
//!
//! PIPELINE: Formula String --> Lexer --> Tokens --> Parser --> AST
//!
//! SUPPORTED FEATURES:
//! - Arithmetic: +, -, *, /, ^ (power)
//! - Numeric literals: 1, 2.5, .75
//! - Variables: revenue, net_income, 'Net Sales' (quoted for spaces)
//! - Function calls: ROUND(revenue / units, 2), MIN(a, b)
//! - Parentheses for grouping
//! - Unary negation: -cost

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;


// Re-export commonly used types for convenience
pub use ast::{BinaryOperator, Expression, UnaryOperator};
pub use lexer::Lexer;
pub use parser::{parse, ParseError, ParseResult, Parser};
pub use token::Token;
