//! Expression evaluation.
//!
//! Walks an [`Expr`] against an [`EvaluationContext`].
//!
//! # Variable resolution
//!
//! The first segment of a variable selects its namespace:
//!
//! - `open`, `high`, `low`, `close`, `volume`: the current bar
//! - `indicators.<name>` / `indicators.<name>.<line>`: the indicator mapping,
//!   where a line is stored under the key `<name>.<line>`
//! - `datas[i].<field>` / `tickers[i].<field>`: feed `i`
//! - `strategy.<path>`: the strategy state lookup
//!
//! # Evaluation semantics
//!
//! - `and`: short-circuits on the first `false`
//! - `or`: short-circuits on the first `true`
//! - `==` / `!=`: equal within `EPSILON`
//! - Division by exactly zero is an error; so is any non-finite variable

use crate::domain::context::EvaluationContext;
use crate::domain::error::EvaluationError;
use crate::domain::expr::{ArithmeticOp, ComparisonOp, Expr, LogicalOp, PathSegment, VariablePath};
use crate::domain::ohlcv::PRICE_FIELDS;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
}

impl Value {
    pub fn as_number(self) -> Result<f64, EvaluationError> {
        match self {
            Value::Number(n) => Ok(n),
            Value::Boolean(b) => Err(EvaluationError::TypeMismatch {
                reason: format!("expected a number, found boolean {b}"),
            }),
        }
    }

    pub fn as_bool(self) -> Result<bool, EvaluationError> {
        match self {
            Value::Boolean(b) => Ok(b),
            Value::Number(n) => Err(EvaluationError::TypeMismatch {
                reason: format!("expected a boolean, found number {n}"),
            }),
        }
    }
}

pub fn evaluate(expr: &Expr, ctx: &EvaluationContext<'_>) -> Result<Value, EvaluationError> {
    match expr {
        Expr::Literal(v) => Ok(Value::Number(*v)),
        Expr::Variable(path) => resolve_variable(path, ctx).map(Value::Number),
        Expr::Arithmetic { op, left, right } => {
            let l = evaluate(left, ctx)?.as_number()?;
            let r = evaluate(right, ctx)?.as_number()?;
            apply_arithmetic(*op, l, r).map(Value::Number)
        }
        Expr::Comparison { op, left, right } => {
            let l = evaluate(left, ctx)?.as_number()?;
            let r = evaluate(right, ctx)?.as_number()?;
            Ok(Value::Boolean(compare(*op, l, r)))
        }
        Expr::Logical { op, left, right } => {
            let l = evaluate(left, ctx)?.as_bool()?;
            let result = match op {
                LogicalOp::And if !l => false,
                LogicalOp::Or if l => true,
                _ => evaluate(right, ctx)?.as_bool()?,
            };
            Ok(Value::Boolean(result))
        }
    }
}

pub fn evaluate_condition(expr: &Expr, ctx: &EvaluationContext<'_>) -> Result<bool, EvaluationError> {
    evaluate(expr, ctx)?.as_bool()
}

pub fn evaluate_number(expr: &Expr, ctx: &EvaluationContext<'_>) -> Result<f64, EvaluationError> {
    evaluate(expr, ctx)?.as_number()
}

fn apply_arithmetic(op: ArithmeticOp, l: f64, r: f64) -> Result<f64, EvaluationError> {
    match op {
        ArithmeticOp::Add => Ok(l + r),
        ArithmeticOp::Subtract => Ok(l - r),
        ArithmeticOp::Multiply => Ok(l * r),
        ArithmeticOp::Divide => {
            if r == 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            Ok(l / r)
        }
    }
}

fn compare(op: ComparisonOp, l: f64, r: f64) -> bool {
    match op {
        ComparisonOp::Greater => l > r,
        ComparisonOp::Less => l < r,
        ComparisonOp::GreaterEqual => l >= r,
        ComparisonOp::LessEqual => l <= r,
        ComparisonOp::Equal => (l - r).abs() < EPSILON,
        ComparisonOp::NotEqual => (l - r).abs() >= EPSILON,
    }
}

fn resolve_variable(path: &VariablePath, ctx: &EvaluationContext<'_>) -> Result<f64, EvaluationError> {
    let value = lookup(path, ctx)
        .ok_or_else(|| EvaluationError::UndefinedVariable(path.raw.clone()))?;
    if !value.is_finite() {
        return Err(EvaluationError::NotANumber {
            path: path.raw.clone(),
        });
    }
    Ok(value)
}

fn lookup(path: &VariablePath, ctx: &EvaluationContext<'_>) -> Option<f64> {
    use PathSegment::{Index, Name};

    match path.segments.as_slice() {
        [Name(field)] if PRICE_FIELDS.contains(&field.as_str()) => ctx.bar.field(field),
        [Name(ns), Name(name)] if ns == "indicators" => ctx.indicator(name),
        [Name(ns), Name(name), Name(line)] if ns == "indicators" => {
            ctx.indicator(&format!("{name}.{line}"))
        }
        [Name(ns), Index(i), Name(field)] if ns == "datas" || ns == "tickers" => {
            ctx.feed(*i)?.field(field)
        }
        [Name(ns), rest @ ..] if ns == "strategy" && !rest.is_empty() => {
            ctx.state?.lookup(rest)
        }
        _ => None,
    }
}
