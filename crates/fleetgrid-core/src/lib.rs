//! fleetgrid-core — shared types for the FleetGrid placement core.
//!
//! - **`types`** — workloads, cluster targets, scored targets, decisions
//! - **`cancel`** — cooperative cancellation signal threaded through calls
//! - **`config`** — `fleetgrid.toml` parsing and validation

pub mod cancel;
pub mod config;
pub mod types;

pub use cancel::Cancellation;
pub use config::{ConfigError, FleetConfig};
pub use types::*;
