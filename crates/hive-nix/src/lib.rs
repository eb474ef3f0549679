//! Nix and ssh collaborators for hive
//!
//! Implements the `hive_core` collaborator traits by shelling out:
//!
//! - [`load_inventory`] evaluates a deployment with `nix eval`
//! - [`NixBuilder`] builds systems with `nix build`
//! - [`NixCopy`] pushes store paths with `nix copy`
//! - [`SshExec`] runs commands on instances over `ssh`
//!
//! All of them share a [`Workspace`] holding out-links and the generated
//! ssh configuration for the duration of a run.

pub mod builder;
pub mod command;
pub mod copy;
pub mod error;
pub mod evaluate;
pub mod ssh;
pub mod workspace;

pub use builder::NixBuilder;
pub use copy::{CopyConfig, NixCopy};
pub use error::{NixError, Result};
pub use evaluate::load_inventory;
pub use ssh::SshExec;
pub use workspace::Workspace;
