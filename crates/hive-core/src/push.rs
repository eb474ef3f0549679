//! Push planning.
//!
//! Every instance needs its artifact in two places: its dedicated store, if
//! it has one, and the instance itself. Jobs are deduplicated by
//! `(artifact, destination)` and grouped by destination so each destination
//! gets exactly one transfer, however many instances share it.

use std::collections::{HashMap, HashSet};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::collaborators::Transfer;
use crate::error::{HiveError, Result};
use crate::inventory::Inventory;

/// Scheme prefixed to an instance name to address the instance itself.
pub const INSTANCE_SCHEME: &str = "ssh://";

/// Destination address of an instance.
pub fn instance_address(instance: &str) -> String {
    format!("{INSTANCE_SCHEME}{instance}")
}

/// One artifact that must reach one destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PushJob {
    pub artifact: String,
    pub destination: String,
}

/// All artifacts bound for one destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushBatch {
    pub destination: String,
    pub artifacts: Vec<String>,
}

/// Deduplicated jobs and their per-destination batches, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushPlan {
    jobs: Vec<PushJob>,
    batches: Vec<PushBatch>,
}

impl PushPlan {
    fn add(&mut self, seen: &mut HashSet<PushJob>, index: &mut HashMap<String, usize>, job: PushJob) {
        if !seen.insert(job.clone()) {
            return;
        }
        let slot = *index.entry(job.destination.clone()).or_insert_with(|| {
            self.batches.push(PushBatch {
                destination: job.destination.clone(),
                artifacts: Vec::new(),
            });
            self.batches.len() - 1
        });
        let batch = &mut self.batches[slot];
        if !batch.artifacts.contains(&job.artifact) {
            batch.artifacts.push(job.artifact.clone());
        }
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[PushJob] {
        &self.jobs
    }

    pub fn batches(&self) -> &[PushBatch] {
        &self.batches
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Work out which artifacts must be copied where for `instances`.
///
/// `artifact` overrides the artifact for every instance; otherwise each
/// instance uses its system's build result, and an instance whose system is
/// not built yet contributes nothing.
pub fn plan_push<S: AsRef<str>>(
    inv: &Inventory,
    instances: &[S],
    artifact: Option<&str>,
) -> Result<PushPlan> {
    let artifact = artifact.filter(|a| !a.is_empty());
    let mut plan = PushPlan::default();
    let mut seen = HashSet::with_capacity(instances.len() * 2);
    let mut index = HashMap::new();

    for instance in instances {
        let instance = instance.as_ref();
        let cfg = inv.instance(instance)?;
        let path = match artifact {
            Some(path) => path,
            None => match inv.instance_system(instance)?.1.result() {
                Some(path) => path,
                None => {
                    debug!(%instance, "system not built, nothing to push");
                    continue;
                }
            },
        };
        if let Some(store) = cfg.store() {
            plan.add(
                &mut seen,
                &mut index,
                PushJob {
                    artifact: path.to_string(),
                    destination: store.to_string(),
                },
            );
        }
        plan.add(
            &mut seen,
            &mut index,
            PushJob {
                artifact: path.to_string(),
                destination: instance_address(instance),
            },
        );
    }
    Ok(plan)
}

/// Run one transfer per destination, in plan order, stopping at the first failure.
pub async fn execute_push(
    plan: &PushPlan,
    transfer: &dyn Transfer,
    cancel: &CancellationToken,
) -> Result<()> {
    for batch in plan.batches() {
        if cancel.is_cancelled() {
            return Err(HiveError::Cancelled);
        }
        info!(
            destination = %batch.destination,
            artifacts = batch.artifacts.len(),
            "pushing"
        );
        match transfer
            .transfer(&batch.destination, &batch.artifacts, cancel)
            .await
        {
            Ok(()) => {}
            Err(_) if cancel.is_cancelled() => return Err(HiveError::Cancelled),
            Err(source) => {
                return Err(HiveError::Transfer {
                    destination: batch.destination.clone(),
                    source,
                })
            }
        }
    }
    Ok(())
}

/// Plan and execute a push for `instances`.
pub async fn push<S: AsRef<str>>(
    inv: &Inventory,
    instances: &[S],
    artifact: Option<&str>,
    transfer: &dyn Transfer,
    cancel: &CancellationToken,
) -> Result<PushPlan> {
    let plan = plan_push(inv, instances, artifact)?;
    execute_push(&plan, transfer, cancel).await?;
    Ok(plan)
}
