//! Run command implementation.

use anyhow::{Context, Result};
use clap::Args;
use misuse_core::{Config, FixtureProvider, SuiteDefinition, SuiteRunner};
use std::path::PathBuf;
use std::process::ExitCode;

use super::{EXIT_FAILED, EXIT_PASSED, OutputFormat};
use crate::render;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Suite file
    pub suite: PathBuf,

    /// Only run this case (repeatable)
    #[arg(long = "case", value_name = "ID")]
    pub cases: Vec<String>,

    /// Output format
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Executes the run command.
pub async fn execute(args: RunArgs, config: Config) -> Result<ExitCode> {
    let cases = SuiteDefinition::load(&args.suite)
        .and_then(|suite| suite.select(&args.cases))
        .and_then(|suite| suite.into_cases(config.case_defaults()))
        .with_context(|| format!("invalid suite {}", args.suite.display()))?;
    tracing::info!(
        "Loaded {} cases from {}",
        cases.len(),
        args.suite.display()
    );

    let runner = SuiteRunner::new(config.invoker());
    let mut provider = FixtureProvider::new(config.runtime(), config.fixture_settings());
    let cancel = super::cancel_on_signal();

    let report = runner
        .run_with_fixtures(&mut provider, &cases, &cancel)
        .await
        .context("cannot provision fixtures")?;

    match args.format {
        OutputFormat::Table => render::print_report(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(ExitCode::from(if report.is_success() {
        EXIT_PASSED
    } else {
        EXIT_FAILED
    }))
}
