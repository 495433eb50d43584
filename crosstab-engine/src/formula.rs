//! Formula measure evaluation.
//!
//! `custom` measures carry an arithmetic formula that is parsed once per
//! generation (never dynamically executed) and evaluated against each
//! cell. A bare field reference reads as the sum of that field over the
//! cell's member records; aggregate functions select a different fold.

use formula_parser::{BinaryOperator, Expression, UnaryOperator};
use thiserror::Error;

use crate::aggregate::AggregateAccumulator;
use crate::config::AggregationKind;
use crate::value::Record;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' takes {expected} argument(s), got {got}")]
    WrongArity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("function '{0}' requires a field reference argument")]
    FieldArgumentRequired(String),
}

/// The member records a formula is evaluated against.
pub struct CellContext<'a> {
    records: &'a [Record],
    members: &'a [usize],
}

impl<'a> CellContext<'a> {
    pub fn new(records: &'a [Record], members: &'a [usize]) -> Self {
        CellContext { records, members }
    }

    fn fold(&self, field: &str) -> AggregateAccumulator {
        let mut acc = AggregateAccumulator::new();
        for &idx in self.members {
            acc.push(&self.records[idx].value_or_null(field));
        }
        acc
    }

    fn aggregate(&self, field: &str, kind: AggregationKind) -> f64 {
        self.fold(field).finish(kind).as_number().unwrap_or(0.0)
    }
}

/// Checks a parsed formula for callable functions and argument shapes,
/// so a formula accepted at plan time cannot fail during evaluation.
pub fn validate(expr: &Expression) -> Result<(), FormulaError> {
    match expr {
        Expression::Number(_) | Expression::Variable(_) => Ok(()),
        Expression::UnaryOp { operand, .. } => validate(operand),
        Expression::BinaryOp { left, right, .. } => {
            validate(left)?;
            validate(right)
        }
        Expression::FunctionCall { name, args } => {
            let lower = name.to_ascii_lowercase();
            match lower.as_str() {
                "sum" | "avg" | "count" | "min" | "max" | "median" => {
                    single_field_arg(name, args).map(|_| ())
                }
                "abs" | "sqrt" | "round" => match args.as_slice() {
                    [arg] => validate(arg),
                    _ => Err(FormulaError::WrongArity {
                        name: name.to_string(),
                        expected: 1,
                        got: args.len(),
                    }),
                },
                _ => Err(FormulaError::UnknownFunction(name.to_string())),
            }
        }
    }
}

/// Evaluates a parsed formula against one cell. Division by zero yields 0
/// rather than poisoning the cell with infinity.
pub fn evaluate(expr: &Expression, ctx: &CellContext) -> Result<f64, FormulaError> {
    match expr {
        Expression::Number(n) => Ok(*n),

        Expression::Variable(field) => Ok(ctx.aggregate(field, AggregationKind::Sum)),

        Expression::UnaryOp { op, operand } => {
            let value = evaluate(operand, ctx)?;
            Ok(match op {
                UnaryOperator::Negate => -value,
            })
        }

        Expression::BinaryOp { left, op, right } => {
            let lhs = evaluate(left, ctx)?;
            let rhs = evaluate(right, ctx)?;
            Ok(match op {
                BinaryOperator::Add => lhs + rhs,
                BinaryOperator::Subtract => lhs - rhs,
                BinaryOperator::Multiply => lhs * rhs,
                BinaryOperator::Divide => {
                    if rhs == 0.0 {
                        0.0
                    } else {
                        lhs / rhs
                    }
                }
                BinaryOperator::Power => lhs.powf(rhs),
            })
        }

        Expression::FunctionCall { name, args } => call(name, args, ctx),
    }
}

fn call(name: &str, args: &[Expression], ctx: &CellContext) -> Result<f64, FormulaError> {
    let lower = name.to_ascii_lowercase();

    // Aggregate functions fold a field over the cell's records.
    let aggregate_kind = match lower.as_str() {
        "sum" => Some(AggregationKind::Sum),
        "avg" => Some(AggregationKind::Avg),
        "count" => Some(AggregationKind::Count),
        "min" => Some(AggregationKind::Min),
        "max" => Some(AggregationKind::Max),
        "median" => Some(AggregationKind::Median),
        _ => None,
    };

    if let Some(kind) = aggregate_kind {
        let field = single_field_arg(name, args)?;
        return Ok(ctx.aggregate(field, kind));
    }

    // Scalar functions apply to an evaluated sub-expression.
    match lower.as_str() {
        "abs" => Ok(single_value_arg(name, args, ctx)?.abs()),
        "sqrt" => Ok(single_value_arg(name, args, ctx)?.sqrt()),
        "round" => Ok(single_value_arg(name, args, ctx)?.round()),
        _ => Err(FormulaError::UnknownFunction(name.to_string())),
    }
}

fn single_field_arg<'e>(name: &str, args: &'e [Expression]) -> Result<&'e str, FormulaError> {
    match args {
        [Expression::Variable(field)] => Ok(field),
        [_] => Err(FormulaError::FieldArgumentRequired(name.to_string())),
        _ => Err(FormulaError::WrongArity {
            name: name.to_string(),
            expected: 1,
            got: args.len(),
        }),
    }
}

fn single_value_arg(
    name: &str,
    args: &[Expression],
    ctx: &CellContext,
) -> Result<f64, FormulaError> {
    match args {
        [expr] => evaluate(expr, ctx),
        _ => Err(FormulaError::WrongArity {
            name: name.to_string(),
            expected: 1,
            got: args.len(),
        }),
    }
}
