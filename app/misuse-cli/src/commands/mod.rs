//! CLI command implementations.
//!
//! - `run` loads a suite, provisions fixtures, runs every case and releases
//! - `check` validates a suite without touching the runtime
//! - `fixtures` provisions fixtures and prints the resolved values

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use misuse_core::Config;
use std::path::{Path, PathBuf};
use tokio::signal;
use tokio_util::sync::CancellationToken;

pub mod check;
pub mod fixtures;
pub mod run;

/// Every case passed.
pub const EXIT_PASSED: u8 = 0;
/// At least one case failed, timed out or errored.
pub const EXIT_FAILED: u8 = 1;
/// The suite could not be loaded or fixtures could not be provisioned.
pub const EXIT_INFRASTRUCTURE: u8 = 2;

/// misuse - check that a container CLI rejects malformed invocations correctly
#[derive(Parser)]
#[command(name = "misuse")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file layered over the system and user files
    #[arg(long, global = true, env = "MISUSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run a suite against the configured tool
    Run(run::RunArgs),

    /// Validate a suite file and list its cases
    Check(check::CheckArgs),

    /// Provision fixtures and print their values
    Fixtures(fixtures::FixturesArgs),
}

/// Loads configuration, layering `path` when given.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            anyhow::ensure!(path.is_file(), "config file {} does not exist", path.display());
            Config::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))
        }
        None => Config::load().context("failed to load configuration"),
    }
}

/// Token cancelled on Ctrl+C or SIGTERM.
pub fn cancel_on_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::warn!("Interrupted, stopping after cleanup");
        trigger.cancel();
    });
    token
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
