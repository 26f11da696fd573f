//! End-to-end: compile placement rules once, evaluate against many clusters.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use fleetgrid_core::Cancellation;
use fleetgrid_expr::{Compiler, Evaluator, ExprError, Value};
use serde_json::json;

fn cluster(name: &str, zone: &str, cpu: i64, tier: &str) -> HashMap<String, Value> {
    let cluster = json!({
        "name": name,
        "region": "us-east-1",
        "labels": {"zone": zone, "cost-tier": tier},
        "available": {"cpu": cpu, "memory": 4096},
        "taints": [],
    });
    HashMap::from([
        ("cluster".to_string(), Value::from(cluster)),
        ("workload".to_string(), Value::from(json!({"name": "web", "resources": {"cpu": 4}}))),
    ])
}

#[test]
fn gate_expression_over_several_clusters() {
    let compiler = Compiler::new();
    let compiled = compiler
        .compile(
            "inRegion(cluster, \"us-east-1\") \
             && hasCapacity(cluster, \"available.cpu\", workload.resources.cpu) \
             && costTier(cluster) != \"premium\"",
        )
        .unwrap();
    let evaluator = Evaluator::new();
    let cancel = Cancellation::none();

    let results: Vec<bool> = [
        cluster("a", "z1", 8, "economy"),
        cluster("b", "z2", 2, "economy"),
        cluster("c", "z3", 16, "premium"),
    ]
    .iter()
    .map(|vars| evaluator.evaluate_bool(&cancel, &compiled, vars).unwrap())
    .collect();

    assert_eq!(results, vec![true, false, false]);
}

#[test]
fn compiled_programs_are_shared_across_threads() {
    let compiler = Arc::new(Compiler::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let compiler = Arc::clone(&compiler);
            thread::spawn(move || {
                let compiled = compiler.compile("cluster.available.cpu >= 4").unwrap();
                let vars = cluster("x", "z", i, "standard");
                compiled.evaluate(&vars).unwrap() == Value::Bool(true)
            })
        })
        .collect();

    let passed = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(passed, 4);
    assert_eq!(compiler.cache_stats().size, 1);
}

#[test]
fn missing_key_is_an_error_but_has_probes_safely() {
    let compiler = Compiler::new();
    let vars = cluster("a", "z1", 8, "economy");

    let direct = compiler.compile("cluster.labels.gpu == \"a100\"").unwrap();
    assert!(matches!(direct.evaluate(&vars), Err(ExprError::Evaluation(_))));

    let guarded = compiler
        .compile("has(cluster.labels.gpu) && cluster.labels.gpu == \"a100\"")
        .unwrap();
    assert_eq!(guarded.evaluate(&vars).unwrap(), Value::Bool(false));
}

#[test]
fn scoring_expression_yields_numbers() {
    let compiler = Compiler::new();
    let compiled = compiler
        .compile(
            "labelValue(cluster.labels, \"zone\") == \"z1\" ? 100 : cluster.available.cpu * 2.5",
        )
        .unwrap();
    assert_eq!(compiled.evaluate(&cluster("a", "z1", 8, "x")).unwrap(), Value::Int(100));
    assert_eq!(compiled.evaluate(&cluster("a", "z2", 8, "x")).unwrap(), Value::Double(20.0));
}
