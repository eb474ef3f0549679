//! Error types for hive-nix

use std::process::ExitStatus;

use thiserror::Error;

/// Errors that can occur while driving nix and ssh
#[derive(Error, Debug)]
pub enum NixError {
    /// The program is not installed or not on PATH
    #[error("{program} is not installed or not in PATH")]
    NotFound { program: String },

    /// The program ran but did not succeed
    #[error("{program} exited with {status}")]
    CommandFailed { program: String, status: ExitStatus },

    /// The program was killed because the run was interrupted
    #[error("{program} was interrupted")]
    Cancelled { program: String },

    /// The evaluator's output is not a valid inventory
    #[error("invalid inventory from nix eval: {0}")]
    InvalidInventory(#[from] serde_json::Error),

    /// The build finished but left no out-link
    #[error("build of {system:?} produced no out-link at {link}")]
    MissingOutLink { system: String, link: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for hive-nix operations
pub type Result<T> = std::result::Result<T, NixError>;
