//! Bin-packing: prefer clusters that are most utilized after placement.

use std::collections::HashMap;

use fleetgrid_core::config::BinPackConfig;
use fleetgrid_core::{Cancellation, ClusterTarget, ScoredTarget, Workload};
use tracing::debug;

use super::{Algorithm, validate_weights};
use crate::error::SchedulerResult;

pub const NAME: &str = "binpack";

#[derive(Debug, Clone)]
pub struct BinPackAlgorithm {
    cpu_weight: f64,
    memory_weight: f64,
}

impl Default for BinPackAlgorithm {
    fn default() -> Self {
        Self {
            cpu_weight: 0.5,
            memory_weight: 0.5,
        }
    }
}

/// Fraction of `capacity` in use after adding `requested`, clamped to
/// `0..=1`. Zero capacity counts as unused.
fn utilization_after(requested: i64, available: i64, capacity: i64) -> f64 {
    if capacity <= 0 {
        return 0.0;
    }
    let used = (capacity - available) as f64 + requested as f64;
    (used / capacity as f64).clamp(0.0, 1.0)
}

impl BinPackAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &BinPackConfig) -> SchedulerResult<Self> {
        let mut algorithm = Self::new();
        algorithm.set_weights(config.cpu_weight, config.memory_weight)?;
        Ok(algorithm)
    }

    /// Weights must be non-negative with a positive sum. They are applied
    /// relative to their sum.
    pub fn set_weights(&mut self, cpu_weight: f64, memory_weight: f64) -> SchedulerResult<()> {
        validate_weights(&[("cpu_weight", cpu_weight), ("memory_weight", memory_weight)], true)?;
        self.cpu_weight = cpu_weight;
        self.memory_weight = memory_weight;
        Ok(())
    }

    pub fn weights(&self) -> (f64, f64) {
        (self.cpu_weight, self.memory_weight)
    }

    fn score_target(&self, workload: &Workload, target: &ClusterTarget) -> ScoredTarget {
        let requested = &workload.spec.resources;
        let cpu = utilization_after(requested.cpu, target.available.cpu, target.capacity.cpu);
        let memory = utilization_after(
            requested.memory,
            target.available.memory,
            target.capacity.memory,
        );

        let total = self.cpu_weight + self.memory_weight;
        let score = 100.0 * (self.cpu_weight * cpu + self.memory_weight * memory) / total;

        ScoredTarget {
            target: target.clone(),
            score,
            reason: format!(
                "binpack: cpu {:.1}% / memory {:.1}% after placement (weights cpu={}, memory={})",
                cpu * 100.0,
                memory * 100.0,
                self.cpu_weight,
                self.memory_weight
            ),
            details: HashMap::from([
                ("cpuUtilization".to_string(), cpu * 100.0),
                ("memoryUtilization".to_string(), memory * 100.0),
            ]),
        }
    }
}

impl Algorithm for BinPackAlgorithm {
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
            .map(|target| {
                let scored = self.score_target(workload, target);
                debug!(cluster = %target.name, score = scored.score, "binpack scored target");
                scored
            })
            .collect())
    }
}
