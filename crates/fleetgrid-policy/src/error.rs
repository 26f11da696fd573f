//! Policy error types.

use fleetgrid_expr::ExprError;
use thiserror::Error;

/// Errors that can occur while evaluating policies.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// A rule failed to compile, failed at runtime, timed out, or produced
    /// a non-boolean value.
    #[error("rule '{rule}' could not be evaluated: {source}")]
    RuleEvaluation {
        rule: String,
        #[source]
        source: ExprError,
    },

    #[error("invalid policy '{policy}': {reason}")]
    InvalidPolicy { policy: String, reason: String },
}

pub type PolicyResult<T> = Result<T, PolicyError>;
