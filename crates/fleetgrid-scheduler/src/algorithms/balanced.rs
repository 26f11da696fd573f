//! Balanced: blend capacity, latency, cost, affinity and spread factors
//! through [`combine_scores`].

use std::collections::HashMap;

use fleetgrid_core::{Cancellation, ClusterTarget, ScoredTarget, Workload};
use tracing::debug;

use super::{AffinityAlgorithm, Algorithm, SpreadAlgorithm};
use crate::error::SchedulerResult;
use crate::scorer::{
    UNKNOWN_DISTANCE, calculate_capacity_score, calculate_distance, combine_scores,
    normalize_score,
};

pub const NAME: &str = "balanced";

/// Label carrying a cluster's cost classification.
pub const COST_TIER_LABEL: &str = "cost-tier";

const NEUTRAL: f64 = 50.0;

/// Cost factor for a cost-tier label value. Unknown or missing tiers are
/// treated as `standard`.
pub fn cost_tier_score(tier: Option<&str>) -> f64 {
    match tier {
        Some("economy") => 100.0,
        Some("premium") => 20.0,
        _ => 60.0,
    }
}

#[derive(Debug, Clone, Default)]
pub struct BalancedAlgorithm {
    affinity: AffinityAlgorithm,
    spread: SpreadAlgorithm,
}

impl BalancedAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use configured affinity and spread algorithms for those factors.
    pub fn with_factors(affinity: AffinityAlgorithm, spread: SpreadAlgorithm) -> Self {
        Self { affinity, spread }
    }

    fn latency(workload: &Workload, target: &ClusterTarget) -> f64 {
        let Some(preferred) = workload.spec.preferred_region.as_deref() else {
            return NEUTRAL;
        };
        let distance = calculate_distance(preferred, target.region().unwrap_or_default());
        normalize_score(UNKNOWN_DISTANCE - distance, 0.0, UNKNOWN_DISTANCE)
    }

    fn capacity(workload: &Workload, target: &ClusterTarget) -> f64 {
        let requested = &workload.spec.resources;
        let cpu =
            calculate_capacity_score(requested.cpu, target.available.cpu, target.capacity.cpu);
        let memory = calculate_capacity_score(
            requested.memory,
            target.available.memory,
            target.capacity.memory,
        );
        (cpu + memory) / 2.0
    }
}

impl Algorithm for BalancedAlgorithm {
    fn name(&self) -> &str {
        NAME
    }

    fn score(
        &self,
        cancel: &Cancellation,
        workload: &Workload,
        targets: &[ClusterTarget],
    ) -> SchedulerResult<Vec<ScoredTarget>> {
        let spread = self.spread.score(cancel, workload, targets)?;

        Ok(targets
            .iter()
            .zip(spread)
            .map(|(target, spread)| {
                let factors = HashMap::from([
                    ("capacity".to_string(), Self::capacity(workload, target)),
                    ("latency".to_string(), Self::latency(workload, target)),
                    (
                        "cost".to_string(),
                        cost_tier_score(target.labels.get(COST_TIER_LABEL).map(String::as_str)),
                    ),
                    (
                        "affinity".to_string(),
                        self.affinity.score_target(workload, target).score,
                    ),
                    ("spread".to_string(), spread.score),
                ]);
                let score = combine_scores(&factors);
                debug!(cluster = %target.name, score, "balanced scored target");

                let mut parts: Vec<String> = factors
                    .iter()
                    .map(|(factor, value)| format!("{factor}={value:.1}"))
                    .collect();
                parts.sort();

                ScoredTarget {
                    target: target.clone(),
                    score,
                    reason: format!("balanced: {}", parts.join(", ")),
                    details: factors,
                }
            })
            .collect())
    }
}
