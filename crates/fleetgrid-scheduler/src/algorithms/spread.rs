//! Spread: favour clusters in the least populated topology domain.

use std::collections::{BTreeMap, HashMap};

use fleetgrid_core::config::{DEFAULT_SPREAD_KEY, SpreadConfig};
use fleetgrid_core::{Cancellation, ClusterTarget, ScoredTarget, Workload};
use serde::Serialize;
use tracing::debug;

use super::Algorithm;
use crate::error::{SchedulerError, SchedulerResult};

pub const NAME: &str = "spread";

/// Domain for targets that lack the spread label.
pub const UNKNOWN_DOMAIN: &str = "unknown";

#[derive(Debug, Clone)]
pub struct SpreadAlgorithm {
    spread_key: String,
}

/// How targets are distributed over the spread label's values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionAnalysis {
    pub total_clusters: usize,
    pub unique_domains: usize,
    pub domain_counts: BTreeMap<String, usize>,
    /// 100 when every domain holds the same number of clusters.
    pub balance_score: f64,
}

impl Default for SpreadAlgorithm {
    fn default() -> Self {
        Self {
            spread_key: DEFAULT_SPREAD_KEY.to_string(),
        }
    }
}

impl SpreadAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SpreadConfig) -> SchedulerResult<Self> {
        let mut algorithm = Self::new();
        algorithm.set_spread_key(&config.spread_key)?;
        Ok(algorithm)
    }

    pub fn set_spread_key(&mut self, key: &str) -> SchedulerResult<()> {
        if key.is_empty() {
            tracing::warn!("rejected empty spread key");
            return Err(SchedulerError::EmptySpreadKey);
        }
        self.spread_key = key.to_string();
        Ok(())
    }

    pub fn spread_key(&self) -> &str {
        &self.spread_key
    }

    fn domain_of<'a>(&self, target: &'a ClusterTarget) -> &'a str {
        target
            .labels
            .get(&self.spread_key)
            .map_or(UNKNOWN_DOMAIN, String::as_str)
    }

    fn distribution(&self, targets: &[ClusterTarget]) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for target in targets {
            *counts.entry(self.domain_of(target).to_string()).or_insert(0) += 1;
        }
        counts
    }

    pub fn analyze_distribution(&self, targets: &[ClusterTarget]) -> DistributionAnalysis {
        let domain_counts = self.distribution(targets);
        let total_clusters = targets.len();
        let unique_domains = domain_counts.len();

        let balance_score = if unique_domains == 0 {
            100.0
        } else {
            let ideal = total_clusters as f64 / unique_domains as f64;
            let max_deviation = domain_counts
                .values()
                .map(|count| (*count as f64 - ideal).abs())
                .fold(0.0, f64::max);
            ((ideal - max_deviation) / ideal * 100.0).clamp(0.0, 100.0)
        };

        DistributionAnalysis {
            total_clusters,
            unique_domains,
            domain_counts,
            balance_score,
        }
    }
}

impl Algorithm for SpreadAlgorithm {
    fn name(&self) -> &str {
        NAME
    }

    fn score(
        &self,
        _cancel: &Cancellation,
        _workload: &Workload,
        targets: &[ClusterTarget],
    ) -> SchedulerResult<Vec<ScoredTarget>> {
        let counts = self.distribution(targets);
        let max_count = counts.values().copied().max().unwrap_or(0) as f64;

        Ok(targets
            .iter()
            .map(|target| {
                let domain = self.domain_of(target);
                let count = counts.get(domain).copied().unwrap_or(0);
                let score = if count == 0 {
                    100.0
                } else {
                    (100.0 * (max_count - count as f64 + 1.0) / (max_count + 1.0)).clamp(0.0, 100.0)
                };
                debug!(cluster = %target.name, domain, count, score, "spread scored target");

                ScoredTarget {
                    target: target.clone(),
                    score,
                    reason: format!(
                        "spread: {}={domain} holds {count} of {} candidates",
                        self.spread_key,
                        targets.len()
                    ),
                    details: HashMap::from([
                        ("domainCount".to_string(), count as f64),
                        ("maxDomainCount".to_string(), max_count),
                    ]),
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgrid_core::ResourceList;

    fn make_target(name: &str, zone: Option<&str>) -> ClusterTarget {
        ClusterTarget {
            name: name.to_string(),
            available: ResourceList::new(10, 10),
            capacity: ResourceList::new(10, 10),
            taints: Vec::new(),
            labels: zone
                .map(|z| HashMap::from([("zone".to_string(), z.to_string())]))
                .unwrap_or_default(),
        }
    }

    fn workload() -> Workload {
        Workload {
            name: "w".to_string(),
            spec: Default::default(),
        }
    }

    #[test]
    fn least_populated_domain_scores_highest() {
        let targets = vec![
            make_target("a1", Some("a")),
            make_target("a2", Some("a")),
            make_target("a3", Some("a")),
            make_target("b1", Some("b")),
        ];
        let scores = SpreadAlgorithm::new()
            .score(&Cancellation::none(), &workload(), &targets)
            .unwrap();
        // max 3: zone a -> 100*1/4, zone b -> 100*3/4.
        assert_eq!(scores[0].score, 25.0);
        assert_eq!(scores[3].score, 75.0);
    }

    #[test]
    fn missing_label_goes_to_unknown_bucket() {
        let spread = SpreadAlgorithm::new();
        let analysis =
            spread.analyze_distribution(&[make_target("x", None), make_target("y", Some("a"))]);
        assert_eq!(analysis.domain_counts[UNKNOWN_DOMAIN], 1);
        assert_eq!(analysis.unique_domains, 2);
        assert_eq!(analysis.balance_score, 100.0);
    }

    #[test]
    fn balance_score_reflects_skew() {
        let spread = SpreadAlgorithm::new();
        let targets = vec![
            make_target("a1", Some("a")),
            make_target("a2", Some("a")),
            make_target("a3", Some("a")),
            make_target("b1", Some("b")),
        ];
        let analysis = spread.analyze_distribution(&targets);
        // ideal 2, max deviation 1.
        assert_eq!(analysis.balance_score, 50.0);
        assert_eq!(analysis.total_clusters, 4);
        assert_eq!(spread.analyze_distribution(&[]).balance_score, 100.0);
    }

    #[test]
    fn empty_spread_key_is_rejected() {
        let mut spread = SpreadAlgorithm::new();
        assert_eq!(spread.set_spread_key(""), Err(SchedulerError::EmptySpreadKey));
        assert_eq!(spread.spread_key(), "zone");
        spread.set_spread_key("region").unwrap();
        assert_eq!(spread.spread_key(), "region");
    }
}
