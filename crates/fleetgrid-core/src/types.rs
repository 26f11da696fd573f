//! Shared types used across FleetGrid crates.
//!
//! These are the already-validated inputs and outputs of a placement call.
//! Resource-definition objects live elsewhere; callers convert them into
//! [`Workload`] and [`ClusterTarget`] before asking for a decision.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Label keys consulted (in order) when resolving a cluster's region.
pub const REGION_LABEL_KEYS: [&str; 2] = ["region", "topology.kubernetes.io/region"];

/// CPU and memory quantities. CPU is in millicores, memory in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceList {
    #[serde(default)]
    pub cpu: i64,
    #[serde(default)]
    pub memory: i64,
}

impl ResourceList {
    pub fn new(cpu: i64, memory: i64) -> Self {
        Self { cpu, memory }
    }

    pub fn is_zero(&self) -> bool {
        self.cpu == 0 && self.memory == 0
    }

    /// Componentwise `self >= other`.
    pub fn fits(&self, requested: &ResourceList) -> bool {
        self.cpu >= requested.cpu && self.memory >= requested.memory
    }
}

/// A cluster-level exclusion marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taint {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub effect: String,
}

/// A workload-level override permitting placement despite a taint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    pub key: String,
    #[serde(default)]
    pub value: String,
    pub effect: String,
}

impl Toleration {
    /// Exact key/value/effect match. No wildcard or operator semantics.
    pub fn tolerates(&self, taint: &Taint) -> bool {
        self.key == taint.key && self.value == taint.value && self.effect == taint.effect
    }
}

/// A weighted soft preference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferredTerm {
    /// Expected range 1..=100.
    pub weight: i32,
    /// `"key=value"` or bare `"key"`.
    pub preference: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeAffinity {
    #[serde(default)]
    pub required_during_scheduling: Vec<String>,
    #[serde(default)]
    pub preferred_during_scheduling: Vec<PreferredTerm>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiAffinity {
    #[serde(default)]
    pub required_during_scheduling: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affinity {
    #[serde(default)]
    pub node_affinity: Option<NodeAffinity>,
    #[serde(default)]
    pub anti_affinity: Option<AntiAffinity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub replicas: i32,
    #[serde(default)]
    pub resources: ResourceList,
    #[serde(default)]
    pub tolerations: Vec<Toleration>,
    #[serde(default)]
    pub affinity: Option<Affinity>,
    /// Region the workload would like to run close to (latency factor).
    #[serde(default)]
    pub preferred_region: Option<String>,
}

/// A placement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub name: String,
    pub spec: WorkloadSpec,
}

impl Workload {
    /// Whether every taint in `taints` is tolerated by this workload.
    pub fn tolerates_all(&self, taints: &[Taint]) -> bool {
        taints
            .iter()
            .all(|taint| self.spec.tolerations.iter().any(|t| t.tolerates(taint)))
    }
}

/// A candidate cluster with a point-in-time resource snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterTarget {
    pub name: String,
    #[serde(default)]
    pub available: ResourceList,
    #[serde(default)]
    pub capacity: ResourceList,
    #[serde(default)]
    pub taints: Vec<Taint>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl ClusterTarget {
    /// Region from the first populated region label.
    pub fn region(&self) -> Option<&str> {
        REGION_LABEL_KEYS
            .iter()
            .find_map(|key| self.labels.get(*key))
            .map(String::as_str)
    }

    /// Match a `"key=value"` (exact) or bare `"key"` (existence) requirement
    /// against this cluster's labels. Splits on the first `=`.
    pub fn matches_requirement(&self, requirement: &str) -> bool {
        match requirement.split_once('=') {
            Some((key, value)) => self.labels.get(key).is_some_and(|v| v == value),
            None => self.labels.contains_key(requirement),
        }
    }
}

/// Score for a single target produced by one algorithm invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredTarget {
    pub target: ClusterTarget,
    /// Range: 0.0..=100.0.
    pub score: f64,
    pub reason: String,
    pub details: HashMap<String, f64>,
}

/// The selected clusters for a workload, best first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementDecision {
    pub workload_name: String,
    pub clusters: Vec<String>,
    pub strategy: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(labels: &[(&str, &str)]) -> ClusterTarget {
        ClusterTarget {
            name: "c1".to_string(),
            available: ResourceList::default(),
            capacity: ResourceList::default(),
            taints: Vec::new(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn requirement_key_value_and_existence() {
        let target = labeled(&[("zone", "a"), ("gpu", "")]);
        assert!(target.matches_requirement("zone=a"));
        assert!(!target.matches_requirement("zone=b"));
        assert!(target.matches_requirement("gpu"));
        assert!(!target.matches_requirement("ssd"));
    }

    #[test]
    fn requirement_splits_on_first_equals() {
        let target = labeled(&[("expr", "a=b")]);
        assert!(target.matches_requirement("expr=a=b"));
    }

    #[test]
    fn region_prefers_short_label() {
        let target = labeled(&[("topology.kubernetes.io/region", "eu-west-1")]);
        assert_eq!(target.region(), Some("eu-west-1"));

        let target = labeled(&[("region", "us-east-1"), ("topology.kubernetes.io/region", "x")]);
        assert_eq!(target.region(), Some("us-east-1"));
    }

    #[test]
    fn toleration_requires_exact_match() {
        let taint = Taint {
            key: "dedicated".to_string(),
            value: "gpu".to_string(),
            effect: "NoSchedule".to_string(),
        };
        let exact = Toleration {
            key: "dedicated".to_string(),
            value: "gpu".to_string(),
            effect: "NoSchedule".to_string(),
        };
        let wrong_effect = Toleration {
            effect: "NoExecute".to_string(),
            ..exact.clone()
        };
        assert!(exact.tolerates(&taint));
        assert!(!wrong_effect.tolerates(&taint));
    }

    #[test]
    fn workload_deserializes_from_camel_case_json() {
        let json = r#"{
            "name": "api",
            "spec": {
                "replicas": 2,
                "resources": {"cpu": 500, "memory": 1024},
                "affinity": {
                    "nodeAffinity": {
                        "requiredDuringScheduling": ["zone=a"],
                        "preferredDuringScheduling": [{"weight": 20, "preference": "ssd"}]
                    }
                }
            }
        }"#;
        let workload: Workload = serde_json::from_str(json).unwrap();
        assert_eq!(workload.spec.replicas, 2);
        assert!(workload.spec.tolerations.is_empty());
        let node = workload.spec.affinity.unwrap().node_affinity.unwrap();
        assert_eq!(node.required_during_scheduling, vec!["zone=a"]);
        assert_eq!(node.preferred_during_scheduling[0].weight, 20);
    }
}
