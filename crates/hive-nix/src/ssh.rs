//! ssh as a [`RemoteExec`], plus interactive passthrough.

use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use hive_core::{BoxError, RemoteExec};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::command;
use crate::error::Result;
use crate::workspace::Workspace;

/// Arguments to `ssh` for running `command` on `instance`.
pub fn ssh_args(ssh_config: &Path, instance: &str, command: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-F".into(), ssh_config.into(), instance.into()];
    args.extend(command.iter().map(OsString::from));
    args
}

/// Runs commands on instances over ssh using the workspace ssh config.
#[derive(Debug, Clone)]
pub struct SshExec {
    workspace: Arc<Workspace>,
}

impl SshExec {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        SshExec { workspace }
    }

    /// Run `program` (`ssh` or `scp`) with the generated config and the
    /// caller's arguments, attached to our terminal.
    pub async fn passthrough(
        &self,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<()> {
        let ssh_config = self.workspace.ssh_config().await?;
        let mut cmd = Command::new(program);
        cmd.arg("-F").arg(ssh_config).args(args);
        command::run(&mut cmd, cancel).await
    }
}

#[async_trait]
impl RemoteExec for SshExec {
    async fn exec(
        &self,
        instance: &str,
        command: &[String],
        cancel: &CancellationToken,
    ) -> std::result::Result<(), BoxError> {
        let ssh_config = self.workspace.ssh_config().await?;
        let mut cmd = Command::new("ssh");
        cmd.args(ssh_args(ssh_config, instance, command));
        command::run(&mut cmd, cancel).await?;
        Ok(())
    }
}
