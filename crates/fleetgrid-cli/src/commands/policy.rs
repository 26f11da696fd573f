use std::collections::HashMap;

use fleetgrid_core::{Cancellation, FleetConfig};
use fleetgrid_expr::Value;
use fleetgrid_policy::{Policy, PolicyEvaluator, PolicySet, resolve};
use serde_json::json;

use super::{load_config, read_json, read_vars};

pub fn eval(policy: &str, vars: Option<&str>, config: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let document = read_json(policy)?;
    let vars = read_vars(vars)?;
    let output = run(&config, document, &vars)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// A document with a `policies` array is a policy set; anything else is a
/// single policy.
fn run(
    config: &FleetConfig,
    document: serde_json::Value,
    vars: &HashMap<String, Value>,
) -> anyhow::Result<serde_json::Value> {
    let evaluator = PolicyEvaluator::from_config(&config.expression)?;
    let cancel = Cancellation::none();

    if document.get("policies").is_some() {
        let set: PolicySet = serde_json::from_value(document)?;
        let results = evaluator.evaluate_policy_set(&cancel, &set, vars)?;
        let decision = resolve(&set, &results);
        return Ok(json!({ "results": results, "decision": decision }));
    }

    let policy: Policy = serde_json::from_value(document)?;
    evaluator.check(&policy)?;
    Ok(serde_json::to_value(evaluator.evaluate(&cancel, &policy, vars)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, Value> {
        HashMap::from([(
            "cluster".to_string(),
            Value::from(json!({"labels": {"region": "eu-west-1"}, "available": {"cpu": 8}})),
        )])
    }

    #[test]
    fn single_policy_prints_its_result() {
        let policy = json!({
            "name": "small",
            "rules": [
                {
                    "name": "cpu",
                    "expression": "hasCapacity(cluster, \"available.cpu\", 16)",
                    "weight": 1
                },
                {"name": "eu", "expression": "inRegion(cluster, \"eu-west-1\")", "weight": 1}
            ]
        });
        let output = run(&FleetConfig::default(), policy, &vars()).unwrap();
        assert_eq!(output["passed"], false);
        assert_eq!(output["score"], 50.0);
        assert_eq!(output["violations"][0]["rule"], "cpu");
    }

    #[test]
    fn policy_set_is_resolved() {
        let set = json!({
            "name": "set",
            "conflictStrategy": "Merge",
            "defaultAction": "Deny",
            "policies": [
                {
                    "name": "eu",
                    "action": "Warn",
                    "rules": [{"name": "eu", "expression": "inRegion(cluster, \"eu-west-1\")"}]
                },
                {
                    "name": "us",
                    "action": "Allow",
                    "rules": [{"name": "us", "expression": "inRegion(cluster, \"us-east-1\")"}]
                }
            ]
        });
        let output = run(&FleetConfig::default(), set, &vars()).unwrap();
        assert_eq!(output["results"].as_array().unwrap().len(), 2);
        assert_eq!(output["decision"]["action"], "Warn");
        assert_eq!(output["decision"]["matched"], json!(["eu"]));
    }

    #[test]
    fn broken_rule_is_reported() {
        let policy = json!({"name": "bad", "rules": [{"name": "r", "expression": "1 +"}]});
        assert!(run(&FleetConfig::default(), policy, &vars()).is_err());
    }
}
