//! In-memory collaborators (testing only)
//!
//! Provides `FakeBuilder`, `RecordingTransfer` and `ScriptedRemote`, which
//! satisfy the collaborator traits without spawning processes. Each records
//! its calls and can be told to fail for particular names, or to fire a
//! cancellation token from inside the call the way an interrupt would.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::collaborators::{Builder, RemoteExec, Transfer};
use crate::error::BoxError;

// ---------------------------------------------------------------------------
// FakeBuilder
// ---------------------------------------------------------------------------

/// Builder that "builds" `<prefix><system>` without touching the filesystem.
#[derive(Debug)]
pub struct FakeBuilder {
    prefix: String,
    failing: HashSet<String>,
    empty: bool,
    interrupt: Option<CancellationToken>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl Default for FakeBuilder {
    fn default() -> Self {
        Self::with_prefix("/nix/store/fake-")
    }
}

impl FakeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        FakeBuilder {
            prefix: prefix.into(),
            failing: HashSet::new(),
            empty: false,
            interrupt: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail whenever `system` is built.
    pub fn failing(mut self, system: impl Into<String>) -> Self {
        self.failing.insert(system.into());
        self
    }

    /// Report success with an empty artifact path.
    pub fn returning_empty(mut self) -> Self {
        self.empty = true;
        self
    }

    /// Cancel `token` during every build and then fail it.
    pub fn interrupting(mut self, token: CancellationToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    /// `(system, search paths)` for every build requested so far.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Builder for FakeBuilder {
    async fn build(
        &self,
        system: &str,
        paths: &[String],
        _cancel: &CancellationToken,
    ) -> Result<String, BoxError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), paths.to_vec()));
        if let Some(token) = &self.interrupt {
            token.cancel();
            return Err(format!("build of {system} interrupted").into());
        }
        if self.failing.contains(system) {
            return Err(format!("build of {system} failed").into());
        }
        if self.empty {
            return Ok(String::new());
        }
        Ok(format!("{}{}", self.prefix, system))
    }
}

// ---------------------------------------------------------------------------
// RecordingTransfer
// ---------------------------------------------------------------------------

/// Transfer that records `(destination, artifacts)` for each call.
#[derive(Debug, Default)]
pub struct RecordingTransfer {
    failing: HashSet<String>,
    interrupt: Option<CancellationToken>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail whenever `destination` is the target.
    pub fn failing(mut self, destination: impl Into<String>) -> Self {
        self.failing.insert(destination.into());
        self
    }

    /// Cancel `token` during every transfer and then fail it.
    pub fn interrupting(mut self, token: CancellationToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transfer for RecordingTransfer {
    async fn transfer(
        &self,
        destination: &str,
        artifacts: &[String],
        _cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        self.calls
            .lock()
            .unwrap()
            .push((destination.to_string(), artifacts.to_vec()));
        if let Some(token) = &self.interrupt {
            token.cancel();
            return Err(format!("copy to {destination} interrupted").into());
        }
        if self.failing.contains(destination) {
            return Err(format!("copy to {destination} failed").into());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedRemote
// ---------------------------------------------------------------------------

/// Remote executor that records `(instance, command)` for each call.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    failing: HashSet<String>,
    interrupt: Option<CancellationToken>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail whenever a command runs on `instance`.
    pub fn failing(mut self, instance: impl Into<String>) -> Self {
        self.failing.insert(instance.into());
        self
    }

    /// Cancel `token` during every command and then fail it.
    pub fn interrupting(mut self, token: CancellationToken) -> Self {
        self.interrupt = Some(token);
        self
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteExec for ScriptedRemote {
    async fn exec(
        &self,
        instance: &str,
        command: &[String],
        _cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        self.calls
            .lock()
            .unwrap()
            .push((instance.to_string(), command.to_vec()));
        if let Some(token) = &self.interrupt {
            token.cancel();
            return Err(format!("ssh {instance}: killed").into());
        }
        if self.failing.contains(instance) {
            return Err(format!("ssh {instance}: exit status 255").into());
        }
        Ok(())
    }
}
