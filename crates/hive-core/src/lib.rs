//! hive-core: deployment bookkeeping for fleets of identical systems
//!
//! Holds everything hive decides on its own, with no process spawning:
//!
//! - [`inventory`]: systems, instances and their cached build results
//! - [`selector`]: glob patterns to ordered, deduplicated names
//! - [`state`]: replaying and regenerating the persisted build cache
//! - [`build`]: the at-most-once build contract
//! - [`push`]: deduplicated, per-destination transfer planning
//! - [`remote`]: activation and command batches over instances
//!
//! Building, copying and remote execution go through the traits in
//! [`collaborators`]; `hive-nix` provides the real implementations.

pub mod build;
pub mod collaborators;
pub mod error;
pub mod fakes;
pub mod inventory;
pub mod push;
pub mod remote;
pub mod selector;
pub mod state;
pub mod telemetry;

pub use build::{build_system, build_systems};
pub use collaborators::{Builder, RemoteExec, Transfer};
pub use error::{BoxError, HiveError, Result};
pub use inventory::{Instance, Inventory, System};
pub use push::{execute_push, instance_address, plan_push, push, PushBatch, PushJob, PushPlan};
pub use remote::{activate, activation_command, run_on_instances};
pub use selector::{match_patterns, Row};
pub use state::{
    apply_state, apply_state_with, encode_state, load_state, save_state, ReplaySummary, SkipList,
    Step,
};
pub use telemetry::init_tracing;

pub use tokio_util::sync::CancellationToken;

/// hive version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
