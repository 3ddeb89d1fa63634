//! Trigger conditions.
//!
//! A condition is either a parsed expression or an externally supplied
//! predicate. Both are evaluated through [`Condition::evaluate`], so the
//! registry never branches on where a condition came from.

use std::fmt;
use std::sync::Arc;

use crate::domain::context::EvaluationContext;
use crate::domain::error::{EvaluationError, ExpressionError};
use crate::domain::expr::Expr;
use crate::domain::expr_eval::evaluate_condition;
use crate::domain::expr_parser::parse_condition;

type PredicateFn = dyn Fn(&EvaluationContext<'_>) -> Result<bool, EvaluationError> + Send + Sync;

/// An opaque, shareable predicate over the step context.
#[derive(Clone)]
pub struct Predicate {
    label: String,
    func: Arc<PredicateFn>,
}

impl Predicate {
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(&EvaluationContext<'_>) -> Result<bool, EvaluationError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn call(&self, ctx: &EvaluationContext<'_>) -> Result<bool, EvaluationError> {
        (self.func)(ctx)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.label).finish()
    }
}

#[derive(Debug, Clone)]
pub enum Condition {
    Expression { source: String, ast: Expr },
    Predicate(Predicate),
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let ast = parse_condition(source)?;
        Ok(Condition::Expression {
            source: source.to_string(),
            ast,
        })
    }

    pub fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<bool, EvaluationError> {
        match self {
            Condition::Expression { ast, .. } => evaluate_condition(ast, ctx),
            Condition::Predicate(p) => p.call(ctx),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Expression { source, .. } => f.write_str(source),
            Condition::Predicate(p) => write!(f, "<predicate {}>", p.label),
        }
    }
}
