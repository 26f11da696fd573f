//! fleetgrid-policy — weighted placement policies.
//!
//! A [`Policy`] is an ordered list of [`PolicyRule`]s, each a boolean
//! expression with an optional weight. [`PolicyEvaluator::evaluate`] turns a
//! policy and a variable map into an [`EvaluationResult`]: pass/fail, a
//! 0–100 score and the violations. [`resolve`] combines the results of a
//! [`PolicySet`] according to its conflict strategy.

pub mod error;
pub mod evaluator;
pub mod resolve;
pub mod types;

pub use error::{PolicyError, PolicyResult};
pub use evaluator::PolicyEvaluator;
pub use resolve::{PolicyDecision, resolve};
pub use types::{
    ConflictStrategy, EvaluationResult, Policy, PolicyAction, PolicyRule, PolicySet, Severity,
    Violation,
};
