//! fleetgrid-scheduler — multi-cluster workload placement.
//!
//! Given a [`Workload`](fleetgrid_core::Workload) and candidate
//! [`ClusterTarget`](fleetgrid_core::ClusterTarget)s, the engine:
//!
//! - Validates the workload
//! - Drops targets without capacity, with untolerated taints, or failing
//!   the admission policy
//! - Scores the rest with a named [`Algorithm`]
//! - Picks the best `replicas` targets
//!
//! # Architecture
//!
//! ```text
//! SchedulingEngine
//!   ├── registry: name → Arc<dyn Algorithm>
//!   │     ├── binpack   (post-placement utilization)
//!   │     ├── spread    (least-populated topology domain)
//!   │     ├── affinity  (label preferences)
//!   │     ├── balanced  (scorer::combine_scores over five factors)
//!   │     └── policy    (opt-in, PolicyEvaluator per target)
//!   └── admission policy (optional eligibility gate)
//! ```

pub mod algorithms;
pub mod engine;
pub mod error;
pub mod scorer;

pub use algorithms::{
    AffinityAlgorithm, Algorithm, BalancedAlgorithm, BinPackAlgorithm, DistributionAnalysis,
    PolicyAlgorithm, SpreadAlgorithm,
};
pub use engine::SchedulingEngine;
pub use error::{SchedulerError, SchedulerResult};
