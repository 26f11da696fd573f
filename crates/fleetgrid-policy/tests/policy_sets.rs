//! Policy sets loaded from JSON, evaluated and resolved.

use std::collections::HashMap;

use fleetgrid_core::Cancellation;
use fleetgrid_expr::Value;
use fleetgrid_policy::{PolicyAction, PolicyEvaluator, PolicySet, Severity, resolve};
use serde_json::json;

const SET: &str = r#"{
  "name": "gpu-placement",
  "conflictStrategy": "HighestPriority",
  "defaultAction": "Deny",
  "policies": [
    {
      "name": "gpu-only",
      "priority": 10,
      "action": "Allow",
      "rules": [
        {"name": "has-gpu", "expression": "hasLabel(cluster.labels, \"gpu\")", "required": true, "weight": 3},
        {"name": "cheap", "expression": "costTier(cluster) == \"economy\"", "weight": 1}
      ]
    },
    {
      "name": "eu-residency",
      "priority": 20,
      "action": "Warn",
      "rules": [
        {"name": "in-eu", "expression": "inRegion(cluster, \"eu-west-1\")", "errorMessage": "cluster is outside the EU"}
      ]
    }
  ]
}"#;

fn cluster_vars(labels: serde_json::Value) -> HashMap<String, Value> {
    HashMap::from([("cluster".to_string(), Value::from(json!({ "labels": labels })))])
}

#[test]
fn highest_priority_passing_policy_decides() {
    let set: PolicySet = serde_json::from_str(SET).unwrap();
    let evaluator = PolicyEvaluator::new();
    let vars = cluster_vars(json!({"gpu": "a100", "region": "eu-west-1", "cost-tier": "economy"}));

    let results = evaluator
        .evaluate_policy_set(&Cancellation::none(), &set, &vars)
        .unwrap();
    assert!(results[0].passed);
    assert_eq!(results[0].score, 100.0);
    assert!(results[1].passed);

    let decision = resolve(&set, &results);
    assert_eq!(decision.matched, vec!["eu-residency"]);
    assert_eq!(decision.action, PolicyAction::Warn);
}

#[test]
fn failing_policies_fall_back_to_default_action() {
    let set: PolicySet = serde_json::from_str(SET).unwrap();
    let evaluator = PolicyEvaluator::new();
    let vars = cluster_vars(json!({"region": "us-east-1"}));

    let results = evaluator
        .evaluate_policy_set(&Cancellation::none(), &set, &vars)
        .unwrap();
    assert!(results[0].required_failed());
    assert_eq!(results[0].score, 0.0);
    assert_eq!(results[0].violations.len(), 2);
    assert_eq!(results[1].violations[0].message, "cluster is outside the EU");
    assert_eq!(results[1].violations[0].severity, Severity::Medium);

    let decision = resolve(&set, &results);
    assert_eq!(decision.action, PolicyAction::Deny);
    assert!(decision.matched.is_empty());
}

#[test]
fn rule_programs_are_cached_across_evaluations() {
    let set: PolicySet = serde_json::from_str(SET).unwrap();
    let evaluator = PolicyEvaluator::new();
    for zone in ["a", "b", "c"] {
        let vars = cluster_vars(json!({"zone": zone}));
        evaluator
            .evaluate_policy_set(&Cancellation::none(), &set, &vars)
            .unwrap();
    }
    let stats = evaluator.compiler().cache_stats();
    assert_eq!(stats.size, 3);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.hits, 6);
}
