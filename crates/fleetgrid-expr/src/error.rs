//! Expression engine error types.

use std::time::Duration;

use thiserror::Error;

use crate::value::ValueType;

/// Result type alias for expression operations.
pub type ExprResult<T> = Result<T, ExprError>;

/// Errors raised while compiling or evaluating expressions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    /// Syntax or type error. Carries the underlying diagnostic text.
    #[error("compilation error: {0}")]
    Compilation(String),

    /// Runtime failure: type mismatch, missing key, overflow.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("undeclared reference to function '{0}'")]
    UnknownFunction(String),

    #[error("invalid arguments to {function}: expected {expected}, got {got}")]
    InvalidArguments {
        function: String,
        expected: String,
        got: usize,
    },

    #[error("expression result is {0}, expected bool")]
    NonBooleanResult(ValueType),

    #[error("evaluation exceeded timeout of {0:?}")]
    EvaluationTimeout(Duration),

    #[error("evaluation cancelled")]
    EvaluationCancelled,
}

impl ExprError {
    pub(crate) fn no_overload(op: &str, types: &[ValueType]) -> Self {
        let types: Vec<String> = types.iter().map(ToString::to_string).collect();
        ExprError::Evaluation(format!(
            "no matching overload for '{op}' applied to ({})",
            types.join(", ")
        ))
    }
}
