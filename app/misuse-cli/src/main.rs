//! misuse - negative-usage conformance runner for container CLIs.

use anyhow::Result;
use clap::Parser;
use misuse_core::Config;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod render;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::from(commands::EXIT_INFRASTRUCTURE);
        }
    };

    // RUST_LOG wins, then --debug, then the configured level.
    let filter = if cli.debug {
        "misuse=debug".to_string()
    } else {
        format!("misuse={}", config.logging.level)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match dispatch(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(commands::EXIT_INFRASTRUCTURE)
        }
    }
}

async fn dispatch(command: Commands, config: Config) -> Result<ExitCode> {
    match command {
        Commands::Run(args) => commands::run::execute(args, config).await,
        Commands::Check(args) => commands::check::execute(args, config),
        Commands::Fixtures(args) => commands::fixtures::execute(args, config).await,
    }
}
