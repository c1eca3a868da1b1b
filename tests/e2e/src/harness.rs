//! Test harness wiring the engine to the local docker CLI.

use anyhow::{Context, Result};
use misuse_core::{
    Config, FixtureProvider, SuiteDefinition, SuiteReport, SuiteRunner, TestCase,
};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Test configuration.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Docker client binary.
    pub docker_binary: PathBuf,
    /// Suite exercised by the tests.
    pub suite_path: PathBuf,
    /// Path to the misuse binary.
    pub misuse_binary: PathBuf,
    /// Per-case timeout.
    pub timeout: Duration,
    /// Enable verbose logging.
    pub verbose: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        let project_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .unwrap_or_else(|_| PathBuf::from("."));

        Self {
            docker_binary: std::env::var_os("E2E_DOCKER")
                .map_or_else(|| PathBuf::from("docker"), PathBuf::from),
            suite_path: project_root.join("suites/docker_negative.toml"),
            misuse_binary: project_root.join("target/debug/misuse"),
            timeout: Duration::from_secs(60),
            verbose: std::env::var("E2E_VERBOSE").is_ok(),
        }
    }
}

/// Returns true if `docker version` reaches a daemon.
pub fn docker_available(binary: &Path) -> bool {
    Command::new(binary)
        .args(["version", "--format", "{{.Server.Version}}"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|status| status.success())
}

/// Drives suites through the engine with docker as both tool and runtime.
pub struct TestHarness {
    /// Test configuration.
    pub config: TestConfig,
    engine: Config,
}

impl TestHarness {
    /// Creates a harness; fails if docker is not reachable.
    pub fn new(config: TestConfig) -> Result<Self> {
        if !docker_available(&config.docker_binary) {
            anyhow::bail!(
                "docker daemon not reachable via {}",
                config.docker_binary.display()
            );
        }

        let mut engine = Config::default();
        engine.tool.binary = config.docker_binary.clone();
        engine.execution.timeout_secs = config.timeout.as_secs();
        engine.fixtures.timeout_secs = config.timeout.as_secs().max(120);

        if config.verbose {
            tracing::info!("Using {}", config.docker_binary.display());
        }
        Ok(Self { config, engine })
    }

    /// Creates a harness with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(TestConfig::default())
    }

    /// Loads the configured suite, optionally narrowed to `ids`.
    pub fn load_suite(&self, ids: &[&str]) -> Result<Vec<TestCase>> {
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        SuiteDefinition::load(&self.config.suite_path)
            .and_then(|suite| suite.select(&ids))
            .and_then(|suite| suite.into_cases(self.engine.case_defaults()))
            .with_context(|| format!("failed to load {}", self.config.suite_path.display()))
    }

    /// A provider bound to the docker runtime.
    pub fn provider(&self) -> FixtureProvider {
        FixtureProvider::new(self.engine.runtime(), self.engine.fixture_settings())
    }

    /// A runner invoking docker that re-checks absent identities before use.
    pub fn runner(&self) -> SuiteRunner {
        SuiteRunner::new(self.engine.invoker()).with_runtime(self.engine.runtime())
    }

    /// Runs the suite (or the listed cases) with fresh fixtures.
    pub async fn run(&self, ids: &[&str]) -> Result<SuiteReport> {
        let cases = self.load_suite(ids)?;
        let mut provider = self.provider();
        self.runner()
            .run_with_fixtures(&mut provider, &cases, &CancellationToken::new())
            .await
            .context("fixtures unavailable")
    }

    /// Returns true if docker knows a container with this id or name.
    pub fn container_exists(&self, id: &str) -> bool {
        Command::new(&self.config.docker_binary)
            .args(["container", "inspect", id])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }
}
