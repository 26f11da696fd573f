pub mod expr;
pub mod policy;
pub mod schedule;

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, bail};
use fleetgrid_core::FleetConfig;
use fleetgrid_expr::Value;

/// Load and validate `fleetgrid.toml`, or defaults when no path is given.
pub fn load_config(path: Option<&str>) -> anyhow::Result<FleetConfig> {
    let config = match path {
        Some(path) => FleetConfig::from_file(Path::new(path))
            .with_context(|| format!("loading config {path}"))?,
        None => FleetConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Inline JSON when the argument looks like JSON, otherwise a file path.
pub fn read_json(arg: &str) -> anyhow::Result<serde_json::Value> {
    let trimmed = arg.trim_start();
    let text = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        arg.to_string()
    } else {
        std::fs::read_to_string(arg).with_context(|| format!("reading {arg}"))?
    };
    serde_json::from_str(&text).with_context(|| format!("parsing JSON from {arg}"))
}

/// Expression variables from a JSON object.
pub fn read_vars(arg: Option<&str>) -> anyhow::Result<HashMap<String, Value>> {
    let Some(arg) = arg else {
        return Ok(HashMap::new());
    };
    let serde_json::Value::Object(map) = read_json(arg)? else {
        bail!("variables must be a JSON object");
    };
    Ok(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
}
