//! Policy-driven scoring: each target's score is the policy score, or 0
//! when a required rule fails.

use std::collections::HashMap;

use fleetgrid_core::{Cancellation, ClusterTarget, ScoredTarget, Workload};
use fleetgrid_expr::Value;
use fleetgrid_policy::{Policy, PolicyEvaluator};
use serde_json::json;
use tracing::debug;

use super::Algorithm;
use crate::error::SchedulerResult;

pub const NAME: &str = "policy";

/// Variables exposed to policy rules for one (workload, target) pair:
/// `cluster` and `workload`.
pub fn placement_variables(workload: &Workload, target: &ClusterTarget) -> HashMap<String, Value> {
    let cluster = json!({
        "name": target.name,
        "labels": target.labels,
        "region": target.region(),
        "available": {"cpu": target.available.cpu, "memory": target.available.memory},
        "capacity": {"cpu": target.capacity.cpu, "memory": target.capacity.memory},
        "taints": target.taints.iter().map(|t| json!({
            "key": t.key,
            "value": t.value,
            "effect": t.effect,
        })).collect::<Vec<_>>(),
    });
    let workload = json!({
        "name": workload.name,
        "replicas": workload.spec.replicas,
        "resources": {
            "cpu": workload.spec.resources.cpu,
            "memory": workload.spec.resources.memory,
        },
    });
    HashMap::from([
        ("cluster".to_string(), Value::from(cluster)),
        ("workload".to_string(), Value::from(workload)),
    ])
}

#[derive(Debug, Clone)]
pub struct PolicyAlgorithm {
    name: String,
    policy: Policy,
    evaluator: PolicyEvaluator,
}

impl PolicyAlgorithm {
    /// Registered under [`NAME`].
    pub fn new(policy: Policy, evaluator: PolicyEvaluator) -> Self {
        Self::named(NAME, policy, evaluator)
    }

    pub fn named(name: impl Into<String>, policy: Policy, evaluator: PolicyEvaluator) -> Self {
        Self {
            name: name.into(),
            policy,
            evaluator,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}

impl Algorithm for PolicyAlgorithm {
    fn name(&self) -> &str {
        &self.name
    }

    fn score(
        &self,
        cancel: &Cancellation,
        workload: &Workload,
        targets: &[ClusterTarget],
    ) -> SchedulerResult<Vec<ScoredTarget>> {
        let mut scored = Vec::with_capacity(targets.len());

        for target in targets {
            let vars = placement_variables(workload, target);
            let result = self.evaluator.evaluate(cancel, &self.policy, &vars)?;
            let required_failed = result.required_failed();
            let score = if required_failed { 0.0 } else { result.score };
            debug!(
                cluster = %target.name,
                policy = %self.policy.name,
                passed = result.passed,
                score,
                "policy scored target"
            );

            let reason = if result.passed {
                format!("policy '{}': passed", self.policy.name)
            } else {
                let rules: Vec<&str> = result.violations.iter().map(|v| v.rule.as_str()).collect();
                format!(
                    "policy '{}': failed {}{}",
                    self.policy.name,
                    rules.join(", "),
                    if required_failed { " (required)" } else { "" }
                )
            };

            scored.push(ScoredTarget {
                target: target.clone(),
                score,
                reason,
                details: HashMap::from([
                    ("policyScore".to_string(), result.score),
                    ("violations".to_string(), result.violations.len() as f64),
                ]),
            });
        }
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedulerError;
    use fleetgrid_core::{ResourceList, Taint, WorkloadSpec};
    use fleetgrid_expr::ExprError;
    use fleetgrid_policy::{PolicyError, PolicyRule};

    fn make_target(name: &str, labels: &[(&str, &str)], cpu: i64) -> ClusterTarget {
        ClusterTarget {
            name: name.to_string(),
            available: ResourceList::new(cpu, 1000),
            capacity: ResourceList::new(100, 1000),
            taints: vec![Taint {
                key: "dedicated".to_string(),
                value: "ml".to_string(),
                effect: "NoSchedule".to_string(),
            }],
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn make_workload() -> Workload {
        Workload {
            name: "trainer".to_string(),
            spec: WorkloadSpec {
                replicas: 2,
                resources: ResourceList::new(10, 100),
                ..WorkloadSpec::default()
            },
        }
    }

    #[test]
    fn variables_expose_cluster_and_workload() {
        let target = make_target("c", &[("region", "eu-west-1")], 50);
        let vars = placement_variables(&make_workload(), &target);
        let cluster = &vars["cluster"];
        assert_eq!(cluster.lookup_path("region"), Some(&Value::from("eu-west-1")));
        assert_eq!(cluster.lookup_path("available.cpu"), Some(&Value::Int(50)));
        assert_eq!(vars["workload"].lookup_path("resources.memory"), Some(&Value::Int(100)));
        assert_eq!(vars["workload"].lookup_path("replicas"), Some(&Value::Int(2)));
    }

    #[test]
    fn required_failure_zeroes_score() {
        let policy = Policy::new("gpu")
            .with_rule(
                PolicyRule::new("gpu", "hasLabel(cluster.labels, \"gpu\")")
                    .required()
                    .weighted(1),
            )
            .with_rule(
                PolicyRule::new("capacity", "cluster.available.cpu >= workload.resources.cpu * 4")
                    .weighted(3),
            );
        let algorithm = PolicyAlgorithm::new(policy, PolicyEvaluator::new());
        let targets = vec![
            make_target("no-gpu", &[], 90),
            make_target("gpu-small", &[("gpu", "t4")], 20),
            make_target("gpu-big", &[("gpu", "a100")], 90),
        ];

        let scores = algorithm
            .score(&Cancellation::none(), &make_workload(), &targets)
            .unwrap();
        assert_eq!(scores[0].score, 0.0);
        assert!(scores[0].reason.contains("(required)"));
        assert_eq!(scores[0].details["policyScore"], 75.0);
        assert_eq!(scores[1].score, 25.0);
        assert_eq!(scores[2].score, 100.0);
    }

    #[test]
    fn taints_are_visible_to_rules() {
        let policy = Policy::new("taints").with_rule(PolicyRule::new(
            "no-ml",
            "!cluster.taints.exists(t, t.key == \"dedicated\" && t.value == \"ml\")",
        ));
        let algorithm = PolicyAlgorithm::new(policy, PolicyEvaluator::new());
        let scores = algorithm
            .score(&Cancellation::none(), &make_workload(), &[make_target("c", &[], 50)])
            .unwrap();
        // Unweighted failure keeps full score; the rule is not required.
        assert_eq!(scores[0].score, 100.0);
        assert!(scores[0].reason.contains("no-ml"));
    }

    #[test]
    fn rule_errors_propagate() {
        let policy = Policy::new("bad").with_rule(PolicyRule::new("num", "cluster.available.cpu"));
        let algorithm = PolicyAlgorithm::new(policy, PolicyEvaluator::new());
        let err = algorithm
            .score(&Cancellation::none(), &make_workload(), &[make_target("c", &[], 50)])
            .unwrap_err();
        assert!(matches!(err, SchedulerError::Policy(_)));
    }

    #[test]
    fn caller_cancellation_stops_rule_evaluation() {
        let policy = Policy::new("eu").with_rule(PolicyRule::new("eu", "cluster.region == \"eu\""));
        let algorithm = PolicyAlgorithm::new(policy, PolicyEvaluator::new());
        let (tx, cancel) = Cancellation::channel();
        tx.send(true).unwrap();

        let err = algorithm
            .score(&cancel, &make_workload(), &[make_target("c", &[], 50)])
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::Policy(PolicyError::RuleEvaluation {
                source: ExprError::EvaluationCancelled,
                ..
            })
        ));
    }
}
