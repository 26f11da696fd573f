//! Affinity: bias toward clusters matching the workload's label
//! preferences, away from clusters matching its anti-affinity terms.
//!
//! Anti-affinity is evaluated against the candidate cluster's own labels,
//! not against other workloads already placed there.

use std::collections::HashMap;

use fleetgrid_core::config::AffinityConfig;
use fleetgrid_core::{Cancellation, ClusterTarget, ScoredTarget, Workload};
use tracing::debug;

use super::{Algorithm, validate_weights};
use crate::error::SchedulerResult;

pub const NAME: &str = "affinity";

const BASE_SCORE: f64 = 50.0;
const REQUIRED_MATCH_BONUS: f64 = 50.0;
const REQUIRED_MISS_PENALTY: f64 = 25.0;
const ANTI_AFFINITY_PENALTY: f64 = 30.0;

#[derive(Debug, Clone)]
pub struct AffinityAlgorithm {
    affinity_weight: f64,
    anti_affinity_weight: f64,
}

impl Default for AffinityAlgorithm {
    fn default() -> Self {
        Self {
            affinity_weight: 1.0,
            anti_affinity_weight: 1.0,
        }
    }
}

impl AffinityAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AffinityConfig) -> SchedulerResult<Self> {
        let mut algorithm = Self::new();
        algorithm.set_weights(config.affinity_weight, config.anti_affinity_weight)?;
        Ok(algorithm)
    }

    pub fn set_weights(&mut self, affinity: f64, anti_affinity: f64) -> SchedulerResult<()> {
        validate_weights(
            &[("affinity_weight", affinity), ("anti_affinity_weight", anti_affinity)],
            false,
        )?;
        self.affinity_weight = affinity;
        self.anti_affinity_weight = anti_affinity;
        Ok(())
    }

    pub(crate) fn score_target(&self, workload: &Workload, target: &ClusterTarget) -> ScoredTarget {
        let affinity = workload.spec.affinity.as_ref();
        let node = affinity.and_then(|a| a.node_affinity.as_ref());
        let anti = affinity.and_then(|a| a.anti_affinity.as_ref());

        let mut score = BASE_SCORE;
        let mut required_matched = 0usize;
        let mut required_total = 0usize;
        let mut preferred_bonus = 0.0;
        let mut anti_matched = 0usize;

        if let Some(node) = node {
            for requirement in &node.required_during_scheduling {
                required_total += 1;
                if target.matches_requirement(requirement) {
                    required_matched += 1;
                    score += REQUIRED_MATCH_BONUS * self.affinity_weight;
                } else {
                    score -= REQUIRED_MISS_PENALTY * self.affinity_weight;
                }
            }
            for term in &node.preferred_during_scheduling {
                if target.matches_requirement(&term.preference) {
                    preferred_bonus += f64::from(term.weight) * self.affinity_weight;
                }
            }
            score += preferred_bonus;
        }

        if let Some(anti) = anti {
            for requirement in &anti.required_during_scheduling {
                if target.matches_requirement(requirement) {
                    anti_matched += 1;
                    score -= ANTI_AFFINITY_PENALTY * self.anti_affinity_weight;
                }
            }
        }

        let score = score.clamp(0.0, 100.0);
        debug!(
            cluster = %target.name,
            required_matched,
            required_total,
            anti_matched,
            score,
            "affinity scored target"
        );

        ScoredTarget {
            target: target.clone(),
            score,
            reason: format!(
                "affinity: {required_matched}/{required_total} required, \
                 +{preferred_bonus} preferred, {anti_matched} anti-affinity match(es)"
            ),
            details: HashMap::from([
                ("requiredMatched".to_string(), required_matched as f64),
                ("preferredBonus".to_string(), preferred_bonus),
                ("antiAffinityMatched".to_string(), anti_matched as f64),
            ]),
        }
    }
}

impl Algorithm for AffinityAlgorithm {
    fn name(&self) -> &str {
        NAME
    }

    fn score(
        &self,
        _cancel: &Cancellation,
        workload: &Workload,
        targets: &[ClusterTarget],
    ) -> SchedulerResult<Vec<ScoredTarget>> {
        Ok(targets
            .iter()
            .map(|target| self.score_target(workload, target))
            .collect())
    }
}
