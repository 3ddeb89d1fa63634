//! Domain error types.
//!
//! Expression errors (`TokenError`, `ParseError`) are fatal when a trigger is
//! registered. `EvaluationError` is recoverable per step. Trigger errors are
//! fatal at registration and never leave the registry half-mutated.

use crate::ports::order_port::OrderId;

/// An unrecognised character in an expression string.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid character '{character}' at position {position}")]
pub struct TokenError {
    pub character: char,
    pub position: usize,
}

/// A parse error with position information for expression parsing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
        }
    }

    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position) + "^";
        format!(
            "{input}\n{caret}\n{err}",
            input = input,
            caret = caret,
            err = self
        )
    }
}

/// Anything that can go wrong turning a string into an [`Expr`](crate::domain::expr::Expr).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ExpressionError {
    pub fn position(&self) -> usize {
        match self {
            ExpressionError::Token(e) => e.position,
            ExpressionError::Parse(e) => e.position,
        }
    }

    pub fn display_with_context(&self, input: &str) -> String {
        let caret = " ".repeat(self.position()) + "^";
        format!("{input}\n{caret}\n{self}")
    }
}

/// Failure while evaluating an expression against one step's context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("variable {path} is not a finite number")]
    NotANumber { path: String },

    #[error("type mismatch: {reason}")]
    TypeMismatch { reason: String },

    #[error("predicate failed: {reason}")]
    Predicate { reason: String },
}

/// A trigger definition that cannot be registered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TriggerValidationError {
    #[error("trigger name must be a non-empty string")]
    EmptyName,

    #[error("trigger with name '{0}' already exists")]
    DuplicateName(String),

    #[error("trigger '{0}' must have at least one action")]
    NoActions(String),

    #[error("trigger '{trigger}' has an action with an empty name")]
    EmptyActionName { trigger: String },

    #[error("trigger '{trigger}' declares action '{action}' more than once")]
    DuplicateAction { trigger: String, action: String },

    #[error("action '{action}' in trigger '{trigger}' is missing required parameter '{parameter}'")]
    MissingParameter {
        trigger: String,
        action: String,
        parameter: String,
    },

    #[error("action '{action}' in trigger '{trigger}' has invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        trigger: String,
        action: String,
        parameter: String,
        reason: String,
    },

    #[error("invalid condition syntax in trigger '{trigger}': {source}")]
    InvalidCondition {
        trigger: String,
        source: ExpressionError,
    },
}

/// Registry and sequencing errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TriggerSystemError {
    #[error(transparent)]
    Validation(#[from] TriggerValidationError),

    #[error("maximum number of triggers ({max}) exceeded")]
    CapacityExceeded { max: usize },

    #[error("no trigger named '{0}'")]
    UnknownTrigger(String),

    #[error("internal error: order {0} was not issued by this engine")]
    UnknownOrder(OrderId),

    #[error("internal error: order {0} was already resolved")]
    OrderAlreadyResolved(OrderId),
}

/// Top-level error type for tradetrig.
#[derive(Debug, thiserror::Error)]
pub enum TradetrigError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Trigger(#[from] TriggerSystemError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<TriggerValidationError> for TradetrigError {
    fn from(err: TriggerValidationError) -> Self {
        TradetrigError::Trigger(err.into())
    }
}

impl From<&TradetrigError> for std::process::ExitCode {
    fn from(err: &TradetrigError) -> Self {
        let code: u8 = match err {
            TradetrigError::Io(_) => 1,
            TradetrigError::ConfigParse { .. }
            | TradetrigError::ConfigMissing { .. }
            | TradetrigError::ConfigInvalid { .. } => 2,
            TradetrigError::Data { .. } => 3,
            TradetrigError::Expression(_) | TradetrigError::Evaluation(_) => 4,
            TradetrigError::Trigger(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}
