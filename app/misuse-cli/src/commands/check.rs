//! Check command implementation.

use anyhow::{Context, Result};
use clap::Args;
use misuse_core::{Config, SuiteDefinition};
use std::path::PathBuf;
use std::process::ExitCode;

use super::EXIT_PASSED;
use crate::render;

/// Arguments for the check command.
#[derive(Args)]
pub struct CheckArgs {
    /// Suite file
    pub suite: PathBuf,
}

/// Executes the check command.
pub fn execute(args: CheckArgs, config: Config) -> Result<ExitCode> {
    let cases = SuiteDefinition::load(&args.suite)
        .and_then(|suite| suite.into_cases(config.case_defaults()))
        .with_context(|| format!("invalid suite {}", args.suite.display()))?;

    render::print_cases(&cases);
    println!();
    println!("{} cases OK", cases.len());
    Ok(ExitCode::from(EXIT_PASSED))
}
