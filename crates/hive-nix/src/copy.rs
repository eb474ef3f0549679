//! `nix copy` as a [`Transfer`].

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hive_core::{BoxError, Transfer};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::command;
use crate::workspace::Workspace;

/// Extra `nix copy` options, split on whitespace.
pub const COPY_OPTS_ENV: &str = "NIX_COPYOPTS";
/// Extra ssh options used by nix, appended after our `-F`.
pub const SSH_OPTS_ENV: &str = "NIX_SSHOPTS";

/// Options taken from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyConfig {
    pub copy_opts: Vec<String>,
    pub ssh_opts: Option<String>,
}

impl CopyConfig {
    /// Read `NIX_COPYOPTS` and `NIX_SSHOPTS`.
    pub fn from_env() -> Self {
        CopyConfig {
            copy_opts: std::env::var(COPY_OPTS_ENV)
                .map(|opts| opts.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            ssh_opts: std::env::var(SSH_OPTS_ENV).ok().filter(|o| !o.is_empty()),
        }
    }

    /// Value for `NIX_SSHOPTS` in the child's environment.
    pub fn ssh_opts_for(&self, ssh_config: &Path) -> OsString {
        let mut value = OsString::from("-F ");
        value.push(ssh_config);
        if let Some(extra) = &self.ssh_opts {
            value.push(" ");
            value.push(extra);
        }
        value
    }
}

/// Arguments to `nix` for copying `artifacts` to `destination`.
pub fn copy_args(destination: &str, copy_opts: &[String], artifacts: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(4 + copy_opts.len() + artifacts.len());
    args.extend([
        "copy".to_string(),
        "--to".to_string(),
        destination.to_string(),
        "--substitute-on-destination".to_string(),
    ]);
    args.extend(copy_opts.iter().cloned());
    args.extend(artifacts.iter().cloned());
    args
}

/// Copies store paths with `nix copy`, tunnelled through the workspace ssh config.
#[derive(Debug, Clone)]
pub struct NixCopy {
    workspace: Arc<Workspace>,
    config: CopyConfig,
}

impl NixCopy {
    pub fn new(workspace: Arc<Workspace>, config: CopyConfig) -> Self {
        NixCopy { workspace, config }
    }

    pub fn from_env(workspace: Arc<Workspace>) -> Self {
        Self::new(workspace, CopyConfig::from_env())
    }
}

#[async_trait]
impl Transfer for NixCopy {
    async fn transfer(
        &self,
        destination: &str,
        artifacts: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        let ssh_config = self.workspace.ssh_config().await?;
        let mut cmd = Command::new("nix");
        cmd.args(copy_args(destination, &self.config.copy_opts, artifacts))
            .env(SSH_OPTS_ENV, self.config.ssh_opts_for(ssh_config));
        command::run(&mut cmd, cancel).await?;
        Ok(())
    }
}
