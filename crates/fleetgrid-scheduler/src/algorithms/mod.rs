//! Scoring algorithms.
//!
//! Each algorithm scores the *eligible* targets for a workload and never
//! removes candidates; filtering belongs to the engine.

pub mod affinity;
pub mod balanced;
pub mod binpack;
pub mod policy;
pub mod spread;

use fleetgrid_core::{Cancellation, ClusterTarget, ScoredTarget, Workload};

use crate::error::{SchedulerError, SchedulerResult};

pub use affinity::AffinityAlgorithm;
pub use balanced::BalancedAlgorithm;
pub use binpack::BinPackAlgorithm;
pub use policy::PolicyAlgorithm;
pub use spread::{DistributionAnalysis, SpreadAlgorithm};

/// A named scoring strategy.
pub trait Algorithm: Send + Sync {
    fn name(&self) -> &str;

    /// One [`ScoredTarget`] per input target, in input order, each scored
    /// in `0.0..=100.0`. Algorithms that do slow work per target must stop
    /// once `cancel` fires.
    fn score(
        &self,
        cancel: &Cancellation,
        workload: &Workload,
        targets: &[ClusterTarget],
    ) -> SchedulerResult<Vec<ScoredTarget>>;
}

/// Reject weights that are negative, non-finite, or sum to zero.
pub(crate) fn validate_weights(
    weights: &[(&str, f64)],
    require_positive_sum: bool,
) -> SchedulerResult<()> {
    for (name, weight) in weights {
        if !weight.is_finite() || *weight < 0.0 {
            tracing::warn!(weight = %name, value = weight, "rejected algorithm weight");
            return Err(SchedulerError::InvalidWeights(format!(
                "{name} must be a non-negative number, got {weight}"
            )));
        }
    }
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if require_positive_sum && sum <= 0.0 {
        tracing::warn!(sum, "rejected algorithm weights");
        return Err(SchedulerError::InvalidWeights(
            "weights must have a positive sum".to_string(),
        ));
    }
    Ok(())
}
