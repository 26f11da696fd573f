use std::collections::HashMap;

use fleetgrid_core::{Cancellation, FleetConfig};
use fleetgrid_expr::{Compiler, Evaluator, Value};
use serde_json::json;

use super::{load_config, read_vars};

pub fn validate(expression: &str, config: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    println!("{}", serde_json::to_string_pretty(&check(&config, expression))?);
    Ok(())
}

pub fn eval(expression: &str, vars: Option<&str>, config: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let vars = read_vars(vars)?;
    let value = evaluate(&config, expression, &vars)?;
    println!("{}", serde_json::to_string_pretty(&value.to_json())?);
    Ok(())
}

fn check(config: &FleetConfig, expression: &str) -> serde_json::Value {
    let compiler = Compiler::from_config(&config.expression);
    let result = compiler.validate(expression);
    match compiler.compile(expression) {
        Ok(compiled) => json!({
            "result": result,
            "hash": compiled.hash(),
            "cost": compiled.cost(),
            "resultType": compiled.result_type().to_string(),
            "variables": compiled.variables(),
        }),
        Err(_) => json!({ "result": result }),
    }
}

fn evaluate(
    config: &FleetConfig,
    expression: &str,
    vars: &HashMap<String, Value>,
) -> anyhow::Result<Value> {
    let compiler = Compiler::from_config(&config.expression);
    let evaluator = Evaluator::from_config(&config.expression)?;
    let compiled = compiler.compile(expression)?;
    for warning in compiled.warnings() {
        tracing::warn!(%warning, "expression warning");
    }
    Ok(evaluator.evaluate_with_variables(&Cancellation::none(), &compiled, vars)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_reports_variables_and_errors() {
        let config = FleetConfig::default();
        let ok = check(&config, "cluster.labels.zone == \"a\" && workload.replicas > 1");
        assert_eq!(ok["result"]["success"], true);
        assert_eq!(ok["resultType"], "bool");
        assert_eq!(ok["variables"].as_array().unwrap().len(), 2);

        let bad = check(&config, "1 +");
        assert_eq!(bad["result"]["success"], false);
        assert!(bad.get("hash").is_none());
    }

    #[test]
    fn evaluates_with_variables() {
        let vars = read_vars(Some(r#"{"cluster": {"labels": {"tier": "gold"}}}"#)).unwrap();
        let config = FleetConfig::default();
        let value = evaluate(&config, "labelValue(cluster.labels, \"tier\")", &vars).unwrap();
        assert_eq!(value, Value::from("gold"));
        assert!(evaluate(&FleetConfig::default(), "missing.key", &HashMap::new()).is_err());
    }
}
