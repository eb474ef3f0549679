//! Child process plumbing shared by every nix and ssh invocation.

use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{NixError, Result};

fn program(cmd: &Command) -> String {
    cmd.as_std().get_program().to_string_lossy().into_owned()
}

fn describe(cmd: &Command) -> String {
    let std = cmd.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn spawn(cmd: &mut Command) -> Result<tokio::process::Child> {
    info!(command = %describe(cmd), "running");
    cmd.kill_on_drop(true).spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => NixError::NotFound {
            program: program(cmd),
        },
        _ => NixError::Io(e),
    })
}

/// Run `cmd` to completion and return its stdout.
///
/// Stderr is passed through to ours. The child is killed if `cancel` fires.
pub async fn capture(cmd: &mut Command, cancel: &CancellationToken) -> Result<Vec<u8>> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());
    let child = spawn(cmd)?;
    let output = tokio::select! {
        output = child.wait_with_output() => output?,
        _ = cancel.cancelled() => {
            return Err(NixError::Cancelled { program: program(cmd) });
        }
    };
    if !output.status.success() {
        return Err(NixError::CommandFailed {
            program: program(cmd),
            status: output.status,
        });
    }
    Ok(output.stdout)
}

/// Run `cmd` to completion with all three streams inherited.
pub async fn run(cmd: &mut Command, cancel: &CancellationToken) -> Result<()> {
    cmd.stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let mut child = spawn(cmd)?;
    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancel.cancelled() => {
            return Err(NixError::Cancelled { program: program(cmd) });
        }
    };
    if !status.success() {
        return Err(NixError::CommandFailed {
            program: program(cmd),
            status,
        });
    }
    Ok(())
}
