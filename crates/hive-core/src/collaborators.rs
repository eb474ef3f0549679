//! Seams to the outside world.
//!
//! hive-core never spawns processes itself. Building, copying and remote
//! execution are delegated to these traits; `hive-nix` implements them with
//! `nix` and `ssh`, and [`crate::fakes`] implements them in memory for tests.
//!
//! Every call receives the run's cancellation token and is expected to abort
//! promptly once it fires.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

/// Produces the artifact for one system.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Build `system` with the given search paths and return the artifact path.
    async fn build(
        &self,
        system: &str,
        paths: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, BoxError>;
}

/// Copies artifacts to a destination store.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Copy every artifact in `artifacts` to `destination`. Either all of them
    /// arrive or the call fails.
    async fn transfer(
        &self,
        destination: &str,
        artifacts: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), BoxError>;
}

/// Runs commands on instances.
#[async_trait]
pub trait RemoteExec: Send + Sync {
    /// Run `command` on `instance`.
    async fn exec(
        &self,
        instance: &str,
        command: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), BoxError>;
}
