//! Container runtime used to provision fixtures.
//!
//! The fixture provider only needs a handful of operations; they are behind
//! [`ContainerRuntime`] so provisioning can be exercised without a daemon.
//! [`DockerCli`] implements them by shelling out to the `docker` binary.

use async_trait::async_trait;
use misuse_error::CommonError;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{HarnessError, Result};

/// Shared runtime trait object.
pub type DynContainerRuntime = Arc<dyn ContainerRuntime>;

/// Observed state of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Process is running.
    Running,
    /// Created, exited or dead: not running and not about to.
    Exited,
    /// Paused, restarting or being removed.
    Transitioning,
    /// No container with that id or name.
    Absent,
}

impl ContainerState {
    /// Maps a `{{.State.Status}}` value.
    #[must_use]
    pub fn from_status(status: &str) -> Self {
        match status.trim() {
            "running" => Self::Running,
            "created" | "exited" | "dead" => Self::Exited,
            _ => Self::Transitioning,
        }
    }
}

/// Operations the fixture provider performs against the live environment.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Human-readable runtime name.
    fn name(&self) -> &'static str;

    /// Fails if the runtime is not reachable.
    async fn ping(&self) -> Result<()>;

    /// Returns true if the image reference resolves locally.
    async fn image_exists(&self, reference: &str) -> Result<bool>;

    /// Pulls an image.
    async fn pull_image(&self, reference: &str) -> Result<()>;

    /// Returns true if a container already uses `name`.
    async fn name_in_use(&self, name: &str) -> Result<bool>;

    /// Starts a detached container and returns its id.
    async fn run_detached(&self, name: &str, image: &str, command: &[String]) -> Result<String>;

    /// Requests a stop. Callers confirm with [`ContainerRuntime::state`].
    async fn stop(&self, id: &str) -> Result<()>;

    /// Reports the container state.
    async fn state(&self, id: &str) -> Result<ContainerState>;

    /// Force-removes a container by id or name. Removing an absent container
    /// succeeds.
    async fn remove(&self, id: &str) -> Result<()>;
}

/// [`ContainerRuntime`] backed by the docker command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    global_args: Vec<String>,
    timeout: Duration,
}

impl DockerCli {
    /// Creates a client for `binary`, passing `global_args` before every subcommand.
    pub fn new(binary: impl Into<PathBuf>, global_args: Vec<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            global_args,
            timeout,
        }
    }

    async fn docker(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.global_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("{} {}", self.binary.display(), args.join(" "));

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(output) => output.map_err(|source| HarnessError::Execution {
                program: self.binary.display().to_string(),
                source,
            }),
            Err(_) => Err(CommonError::timeout(format!(
                "`docker {}` did not finish within {:?}",
                args.join(" "),
                self.timeout
            ))
            .into()),
        }
    }

    async fn docker_check(&self, args: &[&str]) -> Result<String> {
        let output = self.docker(args).await?;
        if !output.status.success() {
            return Err(CommonError::command_failed(
                format!("docker {}", args.join(" ")),
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr),
            )
            .into());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Runs an inspect command; `None` when the object does not exist.
    async fn inspect(&self, args: &[&str]) -> Result<Option<String>> {
        let output = self.docker(args).await?;
        if output.status.success() {
            return Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ));
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing(&stderr) {
            return Ok(None);
        }
        Err(CommonError::command_failed(
            format!("docker {}", args.join(" ")),
            output.status.to_string(),
            stderr,
        )
        .into())
    }
}

/// Daemon wording for a missing object differs by version.
fn is_missing(stderr: &str) -> bool {
    let lower = stderr.to_ascii_lowercase();
    lower.contains("no such") || lower.contains("not found")
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn ping(&self) -> Result<()> {
        let version = self
            .docker_check(&["version", "--format", "{{.Server.Version}}"])
            .await?;
        tracing::debug!("docker server version {}", version);
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        Ok(self
            .inspect(&["image", "inspect", "--format", "{{.Id}}", reference])
            .await?
            .is_some())
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        self.docker_check(&["pull", "--quiet", reference]).await?;
        Ok(())
    }

    async fn name_in_use(&self, name: &str) -> Result<bool> {
        Ok(self
            .inspect(&["container", "inspect", "--format", "{{.Id}}", name])
            .await?
            .is_some())
    }

    async fn run_detached(&self, name: &str, image: &str, command: &[String]) -> Result<String> {
        let mut args = vec!["run", "--detach", "--name", name, image];
        args.extend(command.iter().map(String::as_str));
        let id = self.docker_check(&args).await?;
        if id.is_empty() {
            return Err(CommonError::internal(format!("docker run returned no id for {name}")).into());
        }
        Ok(id)
    }

    async fn stop(&self, id: &str) -> Result<()> {
        self.docker_check(&["stop", "--time", "1", id]).await?;
        Ok(())
    }

    async fn state(&self, id: &str) -> Result<ContainerState> {
        Ok(self
            .inspect(&["container", "inspect", "--format", "{{.State.Status}}", id])
            .await?
            .map_or(ContainerState::Absent, |status| {
                ContainerState::from_status(&status)
            }))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let output = self.docker(&["rm", "--force", "--volumes", id]).await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_missing(&stderr) {
            return Ok(());
        }
        Err(CommonError::command_failed(
            format!("docker rm --force --volumes {id}"),
            output.status.to_string(),
            stderr,
        )
        .into())
    }
}
