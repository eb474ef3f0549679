//! Run-scoped scratch space.
//!
//! Out-links and the generated ssh configuration live in a temporary
//! directory that is removed when the workspace is dropped.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::Result;

const SSH_CONFIG: &str = "ssh_config";

/// Temporary directory plus the ssh configuration blob to materialize in it.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    ssh: String,
    ssh_config: OnceCell<PathBuf>,
}

impl Workspace {
    /// Create a fresh workspace holding `ssh` as its ssh configuration.
    pub fn new(ssh: impl Into<String>) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("hive-").tempdir()?;
        debug!(path = %dir.path().display(), "created workspace");
        Ok(Workspace {
            dir,
            ssh: ssh.into(),
            ssh_config: OnceCell::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Out-link for the build of `system`.
    pub fn out_link(&self, system: &str) -> PathBuf {
        self.dir.path().join(format!("system-{system}"))
    }

    /// Path of the ssh configuration, writing it on first use.
    pub async fn ssh_config(&self) -> Result<&Path> {
        let path = self
            .ssh_config
            .get_or_try_init(|| async {
                let path = self.dir.path().join(SSH_CONFIG);
                write_private(&path, self.ssh.as_bytes()).await?;
                debug!(path = %path.display(), "wrote ssh config");
                Ok::<_, crate::error::NixError>(path)
            })
            .await?;
        Ok(path)
    }
}

async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.flush().await
}
