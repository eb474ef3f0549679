//! Inventory model: systems, instances and their shared search paths.
//!
//! The inventory is produced once per run by an external evaluator and then
//! passed explicitly to every operation; build results are the only thing
//! mutated afterwards.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{HiveError, Result};
use crate::selector::{match_patterns, Row};

/// Everything hive knows about a deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    /// Search paths passed to every system build, ahead of the system's own paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,

    /// Systems by name.
    #[serde(default)]
    pub systems: BTreeMap<String, System>,

    /// Literal ssh_config used for every remote connection, including transfers.
    #[serde(default)]
    pub ssh: String,

    /// Instances by name.
    #[serde(default)]
    pub instances: BTreeMap<String, Instance>,
}

/// A buildable configuration producing one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
    /// Search paths for this system, appended after the inventory defaults.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,

    /// Path of the built artifact. Filled in by the build step or restored from
    /// state, never by the evaluator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<String>,
}

impl System {
    pub fn new(paths: Vec<String>) -> Self {
        System {
            paths,
            result: None,
        }
    }

    /// Fixture constructor for a system that is already built.
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.set_result(result.into());
        self
    }

    /// The built artifact, if any.
    pub fn result(&self) -> Option<&str> {
        self.result.as_deref().filter(|r| !r.is_empty())
    }

    pub fn is_built(&self) -> bool {
        self.result().is_some()
    }

    pub(crate) fn set_result(&mut self, result: String) {
        if result.is_empty() {
            return;
        }
        self.result = Some(result);
    }
}

/// A deployment target bound to one system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Name of the system deployed to this instance.
    pub system: String,

    /// Store that built systems are copied to before reaching the instance,
    /// so several instances can share one transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,

    /// Extra labels the selector matches against.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl Instance {
    pub fn new(system: impl Into<String>) -> Self {
        Instance {
            system: system.into(),
            ..Default::default()
        }
    }

    pub fn with_store(mut self, store: impl Into<String>) -> Self {
        self.store = Some(store.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    /// The dedicated store, if one is configured.
    pub fn store(&self) -> Option<&str> {
        self.store.as_deref().filter(|s| !s.is_empty())
    }
}

impl Inventory {
    /// Parse the evaluator's JSON output.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn with_system(mut self, name: impl Into<String>, system: System) -> Self {
        self.systems.insert(name.into(), system);
        self
    }

    pub fn with_instance(mut self, name: impl Into<String>, instance: Instance) -> Self {
        self.instances.insert(name.into(), instance);
        self
    }

    pub fn system(&self, name: &str) -> Option<&System> {
        self.systems.get(name)
    }

    pub(crate) fn system_mut(&mut self, name: &str) -> Option<&mut System> {
        self.systems.get_mut(name)
    }

    pub fn instance(&self, name: &str) -> Result<&Instance> {
        self.instances
            .get(name)
            .ok_or_else(|| HiveError::UnknownInstance(name.to_string()))
    }

    /// Resolve an instance to its system, failing on stale references.
    pub fn instance_system(&self, instance: &str) -> Result<(&str, &System)> {
        let cfg = self.instance(instance)?;
        self.systems
            .get_key_value(cfg.system.as_str())
            .map(|(name, system)| (name.as_str(), system))
            .ok_or_else(|| HiveError::UnknownSystem {
                instance: instance.to_string(),
                system: cfg.system.clone(),
            })
    }

    /// Systems matching `patterns`; every system when none are given.
    pub fn match_systems<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<String>> {
        let rows = self.systems.keys().map(|name| Row::new(name)).collect();
        match_patterns(patterns, rows)
    }

    /// Instances matching `patterns` by name, system name or tag; every
    /// instance when none are given.
    pub fn match_instances<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<String>> {
        let rows = self
            .instances
            .iter()
            .map(|(name, cfg)| {
                cfg.tags
                    .iter()
                    .fold(Row::new(name).with(&cfg.system), |row, tag| row.with(tag))
            })
            .collect();
        match_patterns(patterns, rows)
    }

    /// Unique systems behind `instances`, in instance order.
    pub fn instance_systems<S: AsRef<str>>(&self, instances: &[S]) -> Result<Vec<String>> {
        let mut added = HashSet::with_capacity(instances.len());
        let mut systems = Vec::with_capacity(instances.len());
        for instance in instances {
            let (system, _) = self.instance_system(instance.as_ref())?;
            if added.insert(system) {
                systems.push(system.to_string());
            }
        }
        Ok(systems)
    }

    /// Search paths for building `system`: inventory defaults, then the system's own.
    pub fn system_paths(&self, system: &str) -> Option<Vec<String>> {
        let cfg = self.systems.get(system)?;
        Some(self.paths.iter().chain(&cfg.paths).cloned().collect())
    }

    /// Built results by system name.
    pub fn results(&self) -> BTreeMap<&str, &str> {
        self.systems
            .iter()
            .filter_map(|(name, system)| Some((name.as_str(), system.result()?)))
            .collect()
    }
}
