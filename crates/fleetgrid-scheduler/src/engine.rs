//! Scheduling engine: validate, filter eligible targets, score with the
//! selected algorithm, pick the top `replicas`.
//!
//! Equal scores keep their input order, so identical inputs always produce
//! identical decisions.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use fleetgrid_core::config::{DEFAULT_STRATEGY, SchedulerConfig};
use fleetgrid_core::{Cancellation, ClusterTarget, PlacementDecision, ScoredTarget, Workload};
use fleetgrid_policy::{Policy, PolicyEvaluator};
use tracing::{debug, info};

use crate::algorithms::policy::placement_variables;
use crate::algorithms::{
    AffinityAlgorithm, Algorithm, BalancedAlgorithm, BinPackAlgorithm, SpreadAlgorithm, affinity,
    balanced, binpack, spread,
};
use crate::error::{SchedulerError, SchedulerResult};

/// A policy every target must pass before it is scored.
#[derive(Debug, Clone)]
struct Admission {
    policy: Policy,
    evaluator: PolicyEvaluator,
}

pub struct SchedulingEngine {
    algorithms: RwLock<HashMap<String, Arc<dyn Algorithm>>>,
    admission: RwLock<Option<Admission>>,
    default_strategy: String,
}

impl Default for SchedulingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SchedulingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingEngine")
            .field("algorithms", &self.list_algorithms())
            .field("default_strategy", &self.default_strategy)
            .finish()
    }
}

impl SchedulingEngine {
    /// An engine with `binpack`, `spread`, `affinity` and `balanced`
    /// registered at their default settings.
    pub fn new() -> Self {
        let engine = Self::empty(DEFAULT_STRATEGY);
        engine.register_algorithm(binpack::NAME, Arc::new(BinPackAlgorithm::new()));
        engine.register_algorithm(spread::NAME, Arc::new(SpreadAlgorithm::new()));
        engine.register_algorithm(affinity::NAME, Arc::new(AffinityAlgorithm::new()));
        engine.register_algorithm(balanced::NAME, Arc::new(BalancedAlgorithm::new()));
        engine
    }

    /// An engine with no algorithms registered.
    pub fn empty(default_strategy: &str) -> Self {
        Self {
            algorithms: RwLock::new(HashMap::new()),
            admission: RwLock::new(None),
            default_strategy: default_strategy.to_string(),
        }
    }

    /// Build the default algorithm set from configuration. Invalid weights
    /// or an empty spread key are rejected, never clamped.
    pub fn from_config(config: &SchedulerConfig) -> SchedulerResult<Self> {
        let by_affinity = AffinityAlgorithm::from_config(&config.affinity)?;
        let by_spread = SpreadAlgorithm::from_config(&config.spread)?;
        let by_binpack = BinPackAlgorithm::from_config(&config.binpack)?;
        let by_balance = BalancedAlgorithm::with_factors(by_affinity.clone(), by_spread.clone());

        let engine = Self::empty(&config.default_strategy);
        engine.register_algorithm(binpack::NAME, Arc::new(by_binpack));
        engine.register_algorithm(spread::NAME, Arc::new(by_spread));
        engine.register_algorithm(affinity::NAME, Arc::new(by_affinity));
        engine.register_algorithm(balanced::NAME, Arc::new(by_balance));

        if engine.get_algorithm(&config.default_strategy).is_none() {
            return Err(SchedulerError::UnknownAlgorithm(
                config.default_strategy.clone(),
            ));
        }
        Ok(engine)
    }

    pub fn default_strategy(&self) -> &str {
        &self.default_strategy
    }

    /// Register `algorithm` under `name`, replacing any existing entry. One
    /// algorithm may be registered under several names.
    pub fn register_algorithm(&self, name: &str, algorithm: Arc<dyn Algorithm>) {
        let replaced = self
            .algorithms
            .write()
            .expect("algorithms lock")
            .insert(name.to_string(), algorithm)
            .is_some();
        debug!(algorithm = %name, replaced, "registered scheduling algorithm");
    }

    /// Registered algorithm names, sorted.
    pub fn list_algorithms(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .algorithms
            .read()
            .expect("algorithms lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn get_algorithm(&self, name: &str) -> Option<Arc<dyn Algorithm>> {
        self.algorithms
            .read()
            .expect("algorithms lock")
            .get(name)
            .cloned()
    }

    /// Require every target to pass `policy` to be eligible. `None` removes
    /// the gate.
    pub fn set_admission_policy(&self, admission: Option<(Policy, PolicyEvaluator)>) {
        let admission = admission.map(|(policy, evaluator)| Admission { policy, evaluator });
        if let Some(admission) = &admission {
            info!(policy = %admission.policy.name, "admission policy set");
        }
        *self.admission.write().expect("admission lock") = admission;
    }

    /// Pre-flight checks on a workload.
    pub fn validate_workload(workload: &Workload) -> SchedulerResult<()> {
        if workload.name.is_empty() {
            return Err(SchedulerError::InvalidWorkload(
                "name must not be empty".to_string(),
            ));
        }
        if workload.spec.replicas <= 0 {
            return Err(SchedulerError::InvalidWorkload(format!(
                "replicas must be positive, got {}",
                workload.spec.replicas
            )));
        }
        if workload.spec.resources.is_zero() {
            return Err(SchedulerError::InvalidWorkload(
                "resource requirements must not be zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Capacity and taint checks, then the admission policy if one is set.
    fn eligible_targets(
        &self,
        cancel: &Cancellation,
        workload: &Workload,
        targets: &[ClusterTarget],
    ) -> SchedulerResult<Vec<ClusterTarget>> {
        let admission = self.admission.read().expect("admission lock").clone();
        let mut eligible = Vec::with_capacity(targets.len());

        for target in targets {
            if !target.available.fits(&workload.spec.resources) {
                debug!(cluster = %target.name, "insufficient capacity");
                continue;
            }
            if !workload.tolerates_all(&target.taints) {
                debug!(cluster = %target.name, "untolerated taint");
                continue;
            }
            if let Some(admission) = &admission {
                let vars = placement_variables(workload, target);
                let result = admission.evaluator.evaluate(cancel, &admission.policy, &vars)?;
                if !result.passed {
                    debug!(
                        cluster = %target.name,
                        policy = %admission.policy.name,
                        violations = result.violations.len(),
                        "rejected by admission policy"
                    );
                    continue;
                }
            }
            eligible.push(target.clone());
        }
        Ok(eligible)
    }

    /// Score every eligible target with `strategy`, best first.
    pub fn rank(
        &self,
        cancel: &Cancellation,
        workload: &Workload,
        targets: &[ClusterTarget],
        strategy: &str,
    ) -> SchedulerResult<Vec<ScoredTarget>> {
        Self::validate_workload(workload)?;
        let algorithm = self
            .get_algorithm(strategy)
            .ok_or_else(|| SchedulerError::UnknownAlgorithm(strategy.to_string()))?;

        if cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }
        let eligible = self.eligible_targets(cancel, workload, targets)?;
        if eligible.is_empty() {
            return Err(SchedulerError::NoEligibleTargets {
                workload: workload.name.clone(),
                candidates: targets.len(),
            });
        }

        if cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }
        let mut scored = algorithm.score(cancel, workload, &eligible)?;
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(scored)
    }

    /// Place `workload` on the best `min(eligible, replicas)` targets.
    pub fn schedule(
        &self,
        cancel: &Cancellation,
        workload: &Workload,
        targets: &[ClusterTarget],
        strategy: &str,
    ) -> SchedulerResult<PlacementDecision> {
        let ranked = self.rank(cancel, workload, targets, strategy)?;
        let replicas = usize::try_from(workload.spec.replicas).unwrap_or(usize::MAX);
        let clusters: Vec<String> = ranked
            .into_iter()
            .take(replicas)
            .map(|scored| scored.target.name)
            .collect();

        info!(
            workload = %workload.name,
            strategy,
            candidates = targets.len(),
            selected = clusters.len(),
            clusters = ?clusters,
            "placement decided"
        );

        Ok(PlacementDecision {
            workload_name: workload.name.clone(),
            clusters,
            strategy: strategy.to_string(),
        })
    }
}
