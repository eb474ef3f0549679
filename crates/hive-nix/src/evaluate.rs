//! Deployment evaluation.

use std::ffi::OsString;
use std::path::Path;

use hive_core::Inventory;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::command;
use crate::error::Result;

/// Nix expression that renders a deployment as an inventory.
pub const CONFIG_EXPR: &str = "(import <hive/config.nix>)";

/// Arguments to `nix` for evaluating the deployment at `config`.
pub fn eval_args(config: &Path) -> Vec<OsString> {
    let mut deployment = OsString::from("deployment=");
    deployment.push(config);
    vec![
        "eval".into(),
        "--json".into(),
        "--include".into(),
        deployment,
        CONFIG_EXPR.into(),
    ]
}

/// Evaluate the deployment at `config` into an inventory.
pub async fn load_inventory(config: &Path, cancel: &CancellationToken) -> Result<Inventory> {
    let mut cmd = Command::new("nix");
    cmd.args(eval_args(config));
    let stdout = command::capture(&mut cmd, cancel).await?;
    let inv: Inventory = serde_json::from_slice(&stdout)?;
    debug!(
        systems = inv.systems.len(),
        instances = inv.instances.len(),
        "evaluated deployment"
    );
    Ok(inv)
}
