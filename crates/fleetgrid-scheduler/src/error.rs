//! Scheduler error types.

use fleetgrid_policy::PolicyError;
use thiserror::Error;

/// Errors that can occur during scheduling or algorithm configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    #[error("invalid workload: {0}")]
    InvalidWorkload(String),

    #[error("unknown scheduling algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("no eligible targets for workload {workload} ({candidates} candidates)")]
    NoEligibleTargets { workload: String, candidates: usize },

    #[error("invalid weights: {0}")]
    InvalidWeights(String),

    #[error("spread key must not be empty")]
    EmptySpreadKey,

    #[error("scheduling cancelled")]
    Cancelled,

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
