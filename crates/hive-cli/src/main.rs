//! hive - build and deploy fleets of identical NixOS systems
//!
//! ## Commands
//!
//! - `build`: Build the selected systems and print their results
//! - `push`: Copy build results to instances and their stores
//! - `deploy`: Build, push and activate the selected instances
//! - `run`: Run a command on every selected instance
//! - `ssh` / `scp`: Talk to instances through the generated ssh config
//! - `ssh-config`: Print the ssh configuration

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hive_core::{
    activate, build_systems, load_state, push, run_on_instances, save_state, CancellationToken,
    Inventory, SkipList,
};
use hive_nix::{load_inventory, NixBuilder, NixCopy, SshExec, Workspace};
use tracing::{debug, error, info, warn, Level};

/// Options go before the subcommand, so that everything after `ssh`, `scp`
/// or `run <pattern>` reaches the remote program untouched.
#[derive(Parser)]
#[command(name = "hive")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Builds NixOS systems and deploys them to many instances", long_about = None)]
struct Cli {
    /// Deployment expression to evaluate
    #[arg(short, long, env = "HIVE_CONFIG", default_value = "hive.nix")]
    config: PathBuf,

    /// Where build results are remembered between runs
    #[arg(short, long, env = "HIVE_STATE", default_value = ".hive.state")]
    state: PathBuf,

    /// Comma-separated steps to skip (e.g. "build")
    #[arg(long, env = "HIVE_NO")]
    no: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build systems and print their results as JSON
    Build {
        /// System name patterns (default: all)
        patterns: Vec<String>,
    },

    /// Copy build results to instances and their stores
    Push {
        /// Instance patterns, matched against name, system and tags (default: all)
        patterns: Vec<String>,

        /// Push this store path instead of each instance's build result
        #[arg(long)]
        path: Option<String>,
    },

    /// Build, push and activate instances
    Deploy {
        /// Instance patterns (default: all)
        patterns: Vec<String>,
    },

    /// Run a command on every matching instance
    Run {
        /// Instance pattern
        pattern: String,

        /// Command and its arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// ssh to an instance using the generated config
    #[command(disable_help_flag = true)]
    Ssh {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// scp to or from an instance using the generated config
    #[command(disable_help_flag = true)]
    Scp {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the ssh configuration
    SshConfig,
}

/// Everything a command needs for one run.
struct Session {
    inv: Inventory,
    config: PathBuf,
    workspace: Arc<Workspace>,
    cancel: CancellationToken,
}

impl Session {
    fn builder(&self) -> NixBuilder {
        NixBuilder::new(self.workspace.clone(), &self.config)
    }

    fn transfer(&self) -> NixCopy {
        NixCopy::from_env(self.workspace.clone())
    }

    fn remote(&self) -> SshExec {
        SshExec::new(self.workspace.clone())
    }

    /// Select instances and make sure their systems are built.
    async fn build_instances(&mut self, patterns: &[String]) -> Result<Vec<String>> {
        let instances = self.inv.match_instances(patterns)?;
        let systems = self.inv.instance_systems(&instances)?;
        let builder = self.builder();
        build_systems(&mut self.inv, &systems, &builder, &self.cancel).await?;
        Ok(instances)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    hive_core::init_tracing(cli.json, level);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping");
                cancel.cancel();
            }
        }
    });

    let mut inv = load_inventory(&cli.config, &cancel)
        .await
        .with_context(|| format!("Failed to evaluate {}", cli.config.display()))?;
    let skip = SkipList::parse(cli.no.as_deref().unwrap_or_default());
    let summary = load_state(&cli.state, &mut inv, &skip)
        .with_context(|| format!("Failed to load state from {}", cli.state.display()))?;
    debug!(?summary, "state restored");

    let workspace = Workspace::new(inv.ssh.clone()).context("Failed to create workspace")?;
    let mut session = Session {
        inv,
        config: cli.config,
        workspace: Arc::new(workspace),
        cancel,
    };

    let outcome = dispatch(&mut session, cli.command).await;

    // Results built before a failure are still worth keeping.
    if let Err(e) = save_state(&cli.state, &session.inv) {
        error!(error = %e, path = %cli.state.display(), "failed to save state");
        if outcome.is_ok() {
            return Err(e).context("Failed to save state");
        }
    }
    outcome
}

async fn dispatch(session: &mut Session, command: Commands) -> Result<()> {
    match command {
        Commands::Build { patterns } => cmd_build(session, &patterns).await,
        Commands::Push { patterns, path } => cmd_push(session, &patterns, path.as_deref()).await,
        Commands::Deploy { patterns } => cmd_deploy(session, &patterns).await,
        Commands::Run { pattern, command } => cmd_run(session, &pattern, &command).await,
        Commands::Ssh { args } => cmd_passthrough(session, "ssh", &args).await,
        Commands::Scp { args } => cmd_passthrough(session, "scp", &args).await,
        Commands::SshConfig => {
            print!("{}", session.inv.ssh);
            Ok(())
        }
    }
}

async fn cmd_build(session: &mut Session, patterns: &[String]) -> Result<()> {
    let systems = session.inv.match_systems(patterns)?;
    let builder = session.builder();
    build_systems(&mut session.inv, &systems, &builder, &session.cancel).await?;

    let results: BTreeMap<&str, &str> = session
        .inv
        .results()
        .into_iter()
        .filter(|(system, _)| systems.iter().any(|s| s.as_str() == *system))
        .collect();
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn cmd_push(session: &mut Session, patterns: &[String], path: Option<&str>) -> Result<()> {
    let instances = match path {
        Some(_) => session.inv.match_instances(patterns)?,
        None => session.build_instances(patterns).await?,
    };
    let plan = push(
        &session.inv,
        &instances,
        path,
        &session.transfer(),
        &session.cancel,
    )
    .await?;
    info!(destinations = plan.batches().len(), "push complete");
    Ok(())
}

async fn cmd_deploy(session: &mut Session, patterns: &[String]) -> Result<()> {
    let instances = session.build_instances(patterns).await?;
    push(
        &session.inv,
        &instances,
        None,
        &session.transfer(),
        &session.cancel,
    )
    .await?;
    activate(&session.inv, &instances, &session.remote(), &session.cancel).await?;
    info!(instances = instances.len(), "deploy complete");
    Ok(())
}

async fn cmd_run(session: &mut Session, pattern: &str, command: &[String]) -> Result<()> {
    let instances = session.inv.match_instances(&[pattern])?;
    run_on_instances(&instances, command, &session.remote(), &session.cancel).await?;
    Ok(())
}

async fn cmd_passthrough(session: &mut Session, program: &str, args: &[String]) -> Result<()> {
    session
        .remote()
        .passthrough(program, args, &session.cancel)
        .await
        .with_context(|| format!("{program} failed"))
}
