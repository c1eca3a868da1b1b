//! Fixtures command implementation.

use anyhow::{Context, Result};
use clap::Args;
use misuse_core::{Config, FixtureProvider};
use std::process::ExitCode;

use super::{EXIT_FAILED, EXIT_PASSED, OutputFormat};
use crate::render;

/// Arguments for the fixtures command.
#[derive(Args)]
pub struct FixturesArgs {
    /// Leave the containers running instead of removing them
    #[arg(long)]
    pub keep: bool,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Executes the fixtures command.
pub async fn execute(args: FixturesArgs, config: Config) -> Result<ExitCode> {
    let mut provider = FixtureProvider::new(config.runtime(), config.fixture_settings());

    let snapshot = match provider.prepare().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            for teardown in provider.release().await {
                tracing::warn!("{}", teardown);
            }
            return Err(e).context("cannot provision fixtures");
        }
    };

    match args.format {
        OutputFormat::Table => render::print_snapshot(&snapshot),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&*snapshot)?),
    }

    if args.keep {
        tracing::warn!("Keeping fixture containers; remove them with `docker rm --force`");
        return Ok(ExitCode::from(EXIT_PASSED));
    }

    let errors = provider.release().await;
    for e in &errors {
        eprintln!("Teardown: {e}");
    }
    Ok(ExitCode::from(if errors.is_empty() {
        EXIT_PASSED
    } else {
        EXIT_FAILED
    }))
}
