//! `nix build` as a [`Builder`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hive_core::{BoxError, Builder};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::command;
use crate::error::NixError;
use crate::workspace::Workspace;

/// Nix expression that builds the system named by `--argstr name`.
pub const BUILD_EXPR: &str = "(import <hive/build.nix>)";

/// Builds systems with `nix build`, leaving an out-link in the workspace.
#[derive(Debug, Clone)]
pub struct NixBuilder {
    workspace: Arc<Workspace>,
    deployment: PathBuf,
}

impl NixBuilder {
    pub fn new(workspace: Arc<Workspace>, deployment: impl Into<PathBuf>) -> Self {
        NixBuilder {
            workspace,
            deployment: deployment.into(),
        }
    }
}

/// Arguments to `nix` for building `system` into `out_link`.
pub fn build_args(
    out_link: &Path,
    deployment: &Path,
    system: &str,
    paths: &[String],
) -> Vec<OsString> {
    let mut include = OsString::from("deployment=");
    include.push(deployment);

    let mut args: Vec<OsString> = vec![
        "build".into(),
        "--out-link".into(),
        out_link.into(),
        "--include".into(),
        include,
    ];
    for path in paths {
        args.push("--include".into());
        args.push(path.into());
    }
    args.push("--argstr".into());
    args.push("name".into());
    args.push(system.into());
    args.push(BUILD_EXPR.into());
    args
}

#[async_trait]
impl Builder for NixBuilder {
    async fn build(
        &self,
        system: &str,
        paths: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, BoxError> {
        let link = self.workspace.out_link(system);
        let mut cmd = Command::new("nix");
        cmd.args(build_args(&link, &self.deployment, system, paths));
        command::capture(&mut cmd, cancel).await?;

        let target = tokio::fs::read_link(&link)
            .await
            .map_err(|_| NixError::MissingOutLink {
                system: system.to_string(),
                link: link.display().to_string(),
            })?;
        Ok(target.to_string_lossy().into_owned())
    }
}
