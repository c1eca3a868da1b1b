//! Harness configuration.
//!
//! Configuration is loaded from multiple sources with the following priority:
//!
//! 1. Environment variables (`MISUSE_*`, nested keys separated by `__`)
//! 2. An explicit file (`--config`)
//! 3. User configuration file (~/.config/misuse/config.toml)
//! 4. System configuration file (/etc/misuse/config.toml)
//! 5. Default values
//!
//! ## Example Configuration File
//!
//! ```toml
//! [tool]
//! binary = "podman"
//! global_args = ["--log-level=error"]
//!
//! [fixtures]
//! base_image = "quay.io/prometheus/busybox:latest"
//! fake_registry = "misuse.invalid"
//! timeout_secs = 120
//!
//! [execution]
//! timeout_secs = 30
//! kill_grace_secs = 2
//!
//! [policy]
//! default_exit_code = 125
//! fail_on_crash = true
//!
//! [logging]
//! level = "info"
//! ```

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::case::CaseDefaults;
use crate::exec::Invoker;
use crate::fixture::FixtureSettings;
use crate::runtime::{DockerCli, DynContainerRuntime};

/// misuse configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tool under test.
    pub tool: ToolConfig,
    /// Fixture provisioning.
    pub fixtures: FixtureConfig,
    /// Invocation limits.
    pub execution: ExecutionConfig,
    /// Suite-wide assertion policy.
    pub policy: PolicyConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from the standard locations and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a present file cannot be parsed or a value has the
    /// wrong type.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment(None).extract()
    }

    /// Loads configuration, layering `path` above the standard files.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment(Some(path.as_ref())).extract()
    }

    fn figment(explicit: Option<&Path>) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(system_config_path()))
            .merge(Toml::file(user_config_path()));
        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("MISUSE_").split("__"))
    }

    /// Invoker for the tool under test.
    #[must_use]
    pub fn invoker(&self) -> Invoker {
        Invoker::new(&self.tool.binary)
            .with_global_args(self.tool.global_args.clone())
            .with_kill_grace(Duration::from_secs(self.execution.kill_grace_secs))
    }

    /// Container runtime used for fixtures; the tool binary doubles as the runtime client.
    #[must_use]
    pub fn runtime(&self) -> DynContainerRuntime {
        Arc::new(DockerCli::new(
            &self.tool.binary,
            self.tool.global_args.clone(),
            Duration::from_secs(self.fixtures.timeout_secs),
        ))
    }

    /// Fixture provisioning parameters.
    #[must_use]
    pub fn fixture_settings(&self) -> FixtureSettings {
        FixtureSettings {
            base_image: self.fixtures.base_image.clone(),
            fake_registry: self.fixtures.fake_registry.clone(),
            sleep_command: self.fixtures.sleep_command.clone(),
            timeout: Duration::from_secs(self.fixtures.timeout_secs),
            poll_interval: Duration::from_millis(self.fixtures.poll_interval_ms),
            name_attempts: self.fixtures.name_attempts,
        }
    }

    /// Defaults applied to cases that leave fields out.
    #[must_use]
    pub fn case_defaults(&self) -> CaseDefaults {
        CaseDefaults {
            exit_code: self.policy.default_exit_code,
            timeout: Duration::from_secs(self.execution.timeout_secs),
            fail_on_crash: self.policy.fail_on_crash,
        }
    }
}

/// Tool under test.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Executable name or path.
    pub binary: PathBuf,
    /// Arguments placed before every subcommand.
    pub global_args: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("docker"),
            global_args: Vec::new(),
        }
    }
}

/// Fixture provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureConfig {
    /// Image backing the valid reference and both containers.
    pub base_image: String,
    /// Registry namespace that never serves images.
    pub fake_registry: String,
    /// Command keeping the running container alive.
    pub sleep_command: Vec<String>,
    /// Bound on pulls, starts and confirmed stops.
    pub timeout_secs: u64,
    /// Delay between container state polls.
    pub poll_interval_ms: u64,
    /// Attempts at finding an unused nonce.
    pub name_attempts: u32,
}

impl Default for FixtureConfig {
    fn default() -> Self {
        let settings = FixtureSettings::default();
        Self {
            base_image: settings.base_image,
            fake_registry: settings.fake_registry,
            sleep_command: settings.sleep_command,
            timeout_secs: settings.timeout.as_secs(),
            poll_interval_ms: 200,
            name_attempts: settings.name_attempts,
        }
    }
}

/// Invocation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Default per-case timeout.
    pub timeout_secs: u64,
    /// Time between SIGTERM and SIGKILL for a timed-out invocation.
    pub kill_grace_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            kill_grace_secs: 2,
        }
    }
}

/// Suite-wide assertion policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Exit code expected when a case does not name one.
    pub default_exit_code: i32,
    /// Fail cases whose output contains a runtime crash trace.
    pub fail_on_crash: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default_exit_code: 125,
            fail_on_crash: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn user_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("misuse")
        .join("config.toml")
}

fn system_config_path() -> PathBuf {
    PathBuf::from("/etc/misuse/config.toml")
}
