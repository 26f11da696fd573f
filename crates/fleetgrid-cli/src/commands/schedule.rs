use fleetgrid_core::{Cancellation, ClusterTarget, FleetConfig, Workload};
use fleetgrid_scheduler::SchedulingEngine;
use serde::Deserialize;
use serde_json::json;

use super::{load_config, read_json};

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub workload: Workload,
    pub targets: Vec<ClusterTarget>,
}

pub fn schedule(
    request: &str,
    config: Option<&str>,
    strategy: Option<&str>,
    explain: bool,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let request: ScheduleRequest = serde_json::from_value(read_json(request)?)?;
    let output = run(&config, &request, strategy, explain)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn algorithms(config: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let engine = SchedulingEngine::from_config(&config.scheduler)?;
    for name in engine.list_algorithms() {
        let marker = if name == engine.default_strategy() { " (default)" } else { "" };
        println!("{name}{marker}");
    }
    Ok(())
}

fn run(
    config: &FleetConfig,
    request: &ScheduleRequest,
    strategy: Option<&str>,
    explain: bool,
) -> anyhow::Result<serde_json::Value> {
    let engine = SchedulingEngine::from_config(&config.scheduler)?;
    let strategy = strategy.unwrap_or(engine.default_strategy()).to_string();
    let cancel = Cancellation::none();

    let decision = engine.schedule(&cancel, &request.workload, &request.targets, &strategy)?;
    if !explain {
        return Ok(serde_json::to_value(decision)?);
    }

    let ranked: Vec<_> = engine
        .rank(&cancel, &request.workload, &request.targets, &strategy)?
        .into_iter()
        .map(|scored| {
            json!({
                "cluster": scored.target.name,
                "score": scored.score,
                "reason": scored.reason,
                "details": scored.details,
            })
        })
        .collect();
    Ok(json!({ "decision": decision, "ranked": ranked }))
}
