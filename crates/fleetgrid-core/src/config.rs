//! fleetgrid.toml configuration parser.
//!
//! Every section and field is optional. Missing values fall back to the
//! documented defaults, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_STRATEGY: &str = "binpack";
pub const DEFAULT_SPREAD_KEY: &str = "zone";
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;
pub const DEFAULT_TIMEOUT: &str = "10s";
/// [`DEFAULT_TIMEOUT`] as a duration, for evaluators built without a config.
pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_COST: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub scheduler: SchedulerConfig,
    pub expression: ExpressionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub default_strategy: String,
    pub binpack: BinPackConfig,
    pub spread: SpreadConfig,
    pub affinity: AffinityConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_strategy: DEFAULT_STRATEGY.to_string(),
            binpack: BinPackConfig::default(),
            spread: SpreadConfig::default(),
            affinity: AffinityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinPackConfig {
    pub cpu_weight: f64,
    pub memory_weight: f64,
}

impl Default for BinPackConfig {
    fn default() -> Self {
        Self {
            cpu_weight: 0.5,
            memory_weight: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpreadConfig {
    pub spread_key: String,
}

impl Default for SpreadConfig {
    fn default() -> Self {
        Self {
            spread_key: DEFAULT_SPREAD_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffinityConfig {
    pub affinity_weight: f64,
    pub anti_affinity_weight: f64,
}

impl Default for AffinityConfig {
    fn default() -> Self {
        Self {
            affinity_weight: 1.0,
            anti_affinity_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpressionConfig {
    pub cache_max_size: usize,
    /// Per-evaluation timeout, e.g. `"10s"`, `"250ms"`, `"1m"`.
    pub timeout: String,
    /// Advisory complexity ceiling. Exceeding it yields a validation warning.
    pub max_cost: u64,
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            cache_max_size: DEFAULT_CACHE_MAX_SIZE,
            timeout: DEFAULT_TIMEOUT.to_string(),
            max_cost: DEFAULT_MAX_COST,
        }
    }
}

impl ExpressionConfig {
    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.timeout)
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject out-of-range values instead of clamping them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let binpack = &self.scheduler.binpack;
        check_weight("scheduler.binpack.cpu_weight", binpack.cpu_weight)?;
        check_weight("scheduler.binpack.memory_weight", binpack.memory_weight)?;
        if binpack.cpu_weight + binpack.memory_weight <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.binpack",
                reason: "weights must have a positive sum".to_string(),
            });
        }

        if self.scheduler.spread.spread_key.is_empty() {
            return Err(ConfigError::Invalid {
                field: "scheduler.spread.spread_key",
                reason: "must not be empty".to_string(),
            });
        }

        let affinity = &self.scheduler.affinity;
        check_weight("scheduler.affinity.affinity_weight", affinity.affinity_weight)?;
        check_weight(
            "scheduler.affinity.anti_affinity_weight",
            affinity.anti_affinity_weight,
        )?;

        if self.expression.cache_max_size == 0 {
            return Err(ConfigError::Invalid {
                field: "expression.cache_max_size",
                reason: "must be positive".to_string(),
            });
        }
        self.expression.timeout()?;
        Ok(())
    }
}

fn check_weight(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is not a non-negative number"),
        });
    }
    Ok(())
}

/// Parse `"250ms"`, `"10s"`, `"2m"` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let s = s.trim();
    let invalid = || ConfigError::InvalidDuration(s.to_string());
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| invalid())
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
            .ok_or_else(invalid)
    } else {
        s.parse::<u64>().map(Duration::from_secs).map_err(|_| invalid())
    }
}
