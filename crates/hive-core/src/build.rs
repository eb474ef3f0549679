//! At-most-once system builds.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::collaborators::Builder;
use crate::error::{HiveError, Result};
use crate::inventory::Inventory;

/// Build `system` unless it already has a result.
///
/// On success the system's result is set to the artifact path returned by the
/// builder. On failure the result stays empty and the error names the system.
pub async fn build_system(
    inv: &mut Inventory,
    system: &str,
    builder: &dyn Builder,
    cancel: &CancellationToken,
) -> Result<()> {
    let paths = match inv.system(system) {
        None => return Err(HiveError::MissingSystem(system.to_string())),
        Some(cfg) if cfg.is_built() => {
            debug!(%system, "already built");
            return Ok(());
        }
        Some(_) => inv.system_paths(system).unwrap_or_default(),
    };
    if cancel.is_cancelled() {
        return Err(HiveError::Cancelled);
    }

    info!(%system, "building");
    let result = match builder.build(system, &paths, cancel).await {
        Ok(result) => result,
        Err(_) if cancel.is_cancelled() => return Err(HiveError::Cancelled),
        Err(source) => {
            return Err(HiveError::Build {
                system: system.to_string(),
                source,
            })
        }
    };
    if result.is_empty() {
        return Err(HiveError::EmptyResult {
            system: system.to_string(),
        });
    }

    debug!(%system, %result, "built");
    if let Some(cfg) = inv.system_mut(system) {
        cfg.set_result(result);
    }
    Ok(())
}

/// Build each system in order, stopping at the first failure.
pub async fn build_systems<S: AsRef<str>>(
    inv: &mut Inventory,
    systems: &[S],
    builder: &dyn Builder,
    cancel: &CancellationToken,
) -> Result<()> {
    for system in systems {
        build_system(inv, system.as_ref(), builder, cancel).await?;
    }
    Ok(())
}
