//! Error types for hive-core

use thiserror::Error;

/// Error type returned by external collaborators (builder, transfer, remote exec).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while selecting, building, pushing or activating
#[derive(Error, Debug)]
pub enum HiveError {
    /// A selector pattern is not valid glob syntax
    #[error("invalid pattern {pattern:?}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// A selector pattern matched no row
    #[error("{pattern:?} did not match anything")]
    NoMatch { pattern: String },

    /// An instance name is not in the inventory
    #[error("unknown instance {0:?}")]
    UnknownInstance(String),

    /// A system name is not in the inventory
    #[error("unknown system {0:?}")]
    MissingSystem(String),

    /// An instance refers to a system that is not in the inventory
    #[error("instance {instance:?} refers to unknown system {system:?}")]
    UnknownSystem { instance: String, system: String },

    /// The builder failed for a system
    #[error("failed to build {system:?}")]
    Build {
        system: String,
        #[source]
        source: BoxError,
    },

    /// A system has no build result where one is required
    #[error("system {system:?} has no build result")]
    EmptyResult { system: String },

    /// Transferring artifacts to a destination failed
    #[error("failed to push to {destination:?}")]
    Transfer {
        destination: String,
        #[source]
        source: BoxError,
    },

    /// Activating a system on an instance failed
    #[error("failed to activate {instance:?}")]
    Activate {
        instance: String,
        #[source]
        source: BoxError,
    },

    /// One or more instances failed during a remote batch
    #[error("{}", describe_failures(.failed))]
    RemoteFailures { failed: usize },

    /// The run was interrupted
    #[error("cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

fn describe_failures(failed: &usize) -> String {
    match *failed {
        1 => "one instance failed".to_string(),
        n => format!("{n} instances failed"),
    }
}

/// Result type for hive-core operations
pub type Result<T> = std::result::Result<T, HiveError>;
