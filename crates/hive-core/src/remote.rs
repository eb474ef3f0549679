//! Remote execution across instances.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::collaborators::RemoteExec;
use crate::error::{HiveError, Result};
use crate::inventory::Inventory;

/// Command that switches an instance to the system at `result`.
pub fn activation_command(result: &str) -> Vec<String> {
    vec![
        "sudo".to_string(),
        format!("{result}/bin/switch-to-configuration"),
        "switch".to_string(),
    ]
}

/// Switch each instance to its system's build result, in order.
///
/// Stops at the first instance that fails; the error names it.
pub async fn activate<S: AsRef<str>>(
    inv: &Inventory,
    instances: &[S],
    remote: &dyn RemoteExec,
    cancel: &CancellationToken,
) -> Result<()> {
    for instance in instances {
        let instance = instance.as_ref();
        let (system, cfg) = inv.instance_system(instance)?;
        let result = cfg.result().ok_or_else(|| HiveError::EmptyResult {
            system: system.to_string(),
        })?;
        if cancel.is_cancelled() {
            return Err(HiveError::Cancelled);
        }
        info!(%instance, %system, "activating");
        match remote
            .exec(instance, &activation_command(result), cancel)
            .await
        {
            Ok(()) => {}
            Err(_) if cancel.is_cancelled() => return Err(HiveError::Cancelled),
            Err(source) => {
                return Err(HiveError::Activate {
                    instance: instance.to_string(),
                    source,
                })
            }
        }
    }
    Ok(())
}

/// Run `command` on every instance, carrying on past failures.
///
/// Succeeds only if every instance succeeded; otherwise reports how many failed.
pub async fn run_on_instances<S: AsRef<str>>(
    instances: &[S],
    command: &[String],
    remote: &dyn RemoteExec,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut failed = 0;
    for instance in instances {
        let instance = instance.as_ref();
        if cancel.is_cancelled() {
            return Err(HiveError::Cancelled);
        }
        info!(%instance, "running command");
        if let Err(error) = remote.exec(instance, command, cancel).await {
            warn!(%instance, %error, "command failed");
            failed += 1;
        }
    }
    if cancel.is_cancelled() {
        return Err(HiveError::Cancelled);
    }
    match failed {
        0 => Ok(()),
        failed => Err(HiveError::RemoteFailures { failed }),
    }
}
