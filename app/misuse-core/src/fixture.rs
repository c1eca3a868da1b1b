//! Fixture provisioning.
//!
//! The provider owns every live resource a suite depends on:
//!
//! - the valid image (pulled when missing, never removed)
//! - a running container and a stopped container (removed on release)
//! - a nonce image reference and a nonce name, verified absent
//!
//! [`FixtureProvider::prepare`] hands out a frozen [`FixtureSnapshot`].
//! Calling it again before [`FixtureProvider::release`] re-verifies and
//! returns the same snapshot instead of creating more containers.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{HarnessError, Result};
use crate::runtime::{ContainerState, DynContainerRuntime};
use crate::token::Placeholder;

/// Placeholder values frozen for one suite run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FixtureSnapshot {
    generation: u64,
    values: BTreeMap<Placeholder, String>,
}

impl FixtureSnapshot {
    /// Creates an empty snapshot for `generation`.
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            values: BTreeMap::new(),
        }
    }

    /// Sets a value, builder style.
    #[must_use]
    pub fn with(mut self, token: Placeholder, value: impl Into<String>) -> Self {
        self.values.insert(token, value.into());
        self
    }

    /// A snapshot with harmless stand-in values for every token.
    ///
    /// Used to check that pattern templates compile before fixtures exist.
    #[must_use]
    pub fn sample() -> Self {
        Placeholder::ALL
            .into_iter()
            .fold(Self::new(0), |snapshot, token| {
                snapshot.with(token, token.name())
            })
    }

    /// Value for `token`, if provisioned.
    #[must_use]
    pub fn get(&self, token: Placeholder) -> Option<&str> {
        self.values.get(&token).map(String::as_str)
    }

    /// Increases every time fixtures are rebuilt after a release.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Iterates tokens and values in vocabulary order.
    pub fn iter(&self) -> impl Iterator<Item = (Placeholder, &str)> {
        self.values.iter().map(|(token, value)| (*token, value.as_str()))
    }

    /// Returns true if every token has a value.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        Placeholder::ALL
            .into_iter()
            .all(|token| self.values.contains_key(&token))
    }
}

/// Provisioning parameters.
#[derive(Debug, Clone)]
pub struct FixtureSettings {
    /// Image used for the valid reference and for both containers.
    pub base_image: String,
    /// Registry namespace that never serves images, e.g. `misuse.invalid`.
    pub fake_registry: String,
    /// Long-lived command for the running container.
    pub sleep_command: Vec<String>,
    /// Bound on waiting for a container to reach a state.
    pub timeout: Duration,
    /// Delay between state polls.
    pub poll_interval: Duration,
    /// Attempts at finding an unused nonce.
    pub name_attempts: u32,
}

impl Default for FixtureSettings {
    fn default() -> Self {
        Self {
            base_image: "docker.io/library/busybox:latest".to_string(),
            fake_registry: "misuse.invalid".to_string(),
            sleep_command: vec!["sleep".to_string(), "2147483647".to_string()],
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(200),
            name_attempts: 8,
        }
    }
}

/// A container the provider asked for.
///
/// It is tracked by name before the runtime is asked to create it, so a
/// prepare interrupted while the container starts still releases it.
#[derive(Debug, Clone)]
struct TrackedContainer {
    name: String,
    id: Option<String>,
}

impl TrackedContainer {
    /// Id once known, name before that; the runtime accepts either.
    fn handle(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// Containers created by the provider and not yet removed.
#[derive(Debug, Default)]
struct Tracked {
    running: Option<TrackedContainer>,
    stopped: Option<TrackedContainer>,
}

impl Tracked {
    fn is_empty(&self) -> bool {
        self.running.is_none() && self.stopped.is_none()
    }
}

/// Creates, verifies and releases fixtures.
pub struct FixtureProvider {
    runtime: DynContainerRuntime,
    settings: FixtureSettings,
    tracked: Tracked,
    snapshot: Option<Arc<FixtureSnapshot>>,
    generation: u64,
}

impl FixtureProvider {
    /// Creates a provider; nothing is provisioned until [`Self::prepare`].
    pub fn new(runtime: DynContainerRuntime, settings: FixtureSettings) -> Self {
        Self {
            runtime,
            settings,
            tracked: Tracked::default(),
            snapshot: None,
            generation: 0,
        }
    }

    /// Runtime the fixtures live in.
    #[must_use]
    pub fn runtime(&self) -> DynContainerRuntime {
        self.runtime.clone()
    }

    /// The currently prepared snapshot, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<FixtureSnapshot>> {
        self.snapshot.clone()
    }

    /// Returns true while the provider holds live containers.
    #[must_use]
    pub fn holds_resources(&self) -> bool {
        !self.tracked.is_empty()
    }

    /// Provisions every fixture and returns the frozen snapshot.
    ///
    /// # Errors
    ///
    /// Returns `FixtureUnavailable` when the runtime is unreachable, an
    /// identity cannot be produced, or a previous prepare left resources
    /// behind that have not been released.
    pub async fn prepare(&mut self) -> Result<Arc<FixtureSnapshot>> {
        if let Some(snapshot) = self.snapshot.clone() {
            self.verify(&snapshot).await.map_err(unavailable)?;
            tracing::debug!(
                "Reusing fixtures generation {}",
                snapshot.generation()
            );
            return Ok(snapshot);
        }

        if self.holds_resources() {
            return Err(HarnessError::fixture(
                "containers from an earlier prepare are still tracked; release them first",
            ));
        }

        self.runtime.ping().await.map_err(|e| {
            HarnessError::fixture(format!("{} runtime unreachable: {e}", self.runtime.name()))
        })?;

        let generation = self.generation + 1;
        let snapshot = Arc::new(self.provision(generation).await.map_err(unavailable)?);

        self.generation = generation;
        self.snapshot = Some(snapshot.clone());
        tracing::info!("Fixtures generation {} ready", generation);
        Ok(snapshot)
    }

    async fn provision(&mut self, generation: u64) -> Result<FixtureSnapshot> {
        let image = self.ensure_image().await?;
        let running = self.start_running(&image).await?;
        let stopped = self.start_stopped(&image).await?;
        let absent_name = self.unused_name("misuse-absent").await?;
        let absent_image = self.absent_image().await?;

        Ok(FixtureSnapshot::new(generation)
            .with(Placeholder::ValidImageReference, image)
            .with(Placeholder::AbsentImageReference, absent_image)
            .with(Placeholder::RunningProcessId, running)
            .with(Placeholder::StoppedProcessId, stopped)
            .with(Placeholder::AbsentName, absent_name))
    }

    /// Removes every container the provider created.
    ///
    /// Each removal is attempted independently. Containers that could not be
    /// removed stay tracked so a later release can retry; the returned errors
    /// describe them. Safe to call when nothing was provisioned.
    pub async fn release(&mut self) -> Vec<HarnessError> {
        self.snapshot = None;
        let mut errors = Vec::new();

        for slot in [&mut self.tracked.running, &mut self.tracked.stopped] {
            let Some(container) = slot.take() else {
                continue;
            };
            let handle = short_id(container.handle()).to_string();
            match self.runtime.remove(container.handle()).await {
                Ok(()) => tracing::info!("Removed fixture container {}", handle),
                Err(e) => {
                    tracing::warn!("Failed to remove fixture container {}: {}", handle, e);
                    errors.push(e);
                    *slot = Some(container);
                }
            }
        }

        errors
    }

    async fn verify(&self, snapshot: &FixtureSnapshot) -> Result<()> {
        let expect = [
            (Placeholder::RunningProcessId, ContainerState::Running),
            (Placeholder::StoppedProcessId, ContainerState::Exited),
        ];
        for (token, wanted) in expect {
            let id = snapshot
                .get(token)
                .ok_or(HarnessError::UnresolvedToken(token))?;
            let state = self.runtime.state(id).await?;
            if state != wanted {
                return Err(HarnessError::fixture(format!(
                    "{token} {} is {state:?}, expected {wanted:?}; release and prepare again",
                    short_id(id)
                )));
            }
        }

        if let Some(reference) = snapshot.get(Placeholder::AbsentImageReference) {
            if self.runtime.image_exists(reference).await? {
                return Err(HarnessError::fixture(format!(
                    "absent image reference {reference} now resolves"
                )));
            }
        }
        if let Some(name) = snapshot.get(Placeholder::AbsentName) {
            if self.runtime.name_in_use(name).await? {
                return Err(HarnessError::fixture(format!(
                    "absent name {name} is now in use"
                )));
            }
        }
        Ok(())
    }

    async fn ensure_image(&self) -> Result<String> {
        let image = self.settings.base_image.clone();
        if self.runtime.image_exists(&image).await? {
            tracing::debug!("Image {} already present", image);
            return Ok(image);
        }

        tracing::info!("Pulling {}", image);
        self.runtime
            .pull_image(&image)
            .await
            .map_err(|e| HarnessError::fixture(format!("cannot pull {image}: {e}")))?;

        if !self.runtime.image_exists(&image).await? {
            return Err(HarnessError::fixture(format!(
                "{image} still missing after pull"
            )));
        }
        Ok(image)
    }

    async fn start_running(&mut self, image: &str) -> Result<String> {
        let name = self.unused_name("misuse-running").await?;
        let id = self
            .create(&name, image, |tracked| &mut tracked.running)
            .await?;

        self.wait_for(&id, ContainerState::Running).await?;
        tracing::info!("Running fixture container {}", short_id(&id));
        Ok(id)
    }

    async fn start_stopped(&mut self, image: &str) -> Result<String> {
        let name = self.unused_name("misuse-stopped").await?;
        let id = self
            .create(&name, image, |tracked| &mut tracked.stopped)
            .await?;

        self.runtime
            .stop(&id)
            .await
            .map_err(|e| HarnessError::fixture(format!("cannot stop {name}: {e}")))?;
        self.wait_for(&id, ContainerState::Exited).await?;
        tracing::info!("Stopped fixture container {}", short_id(&id));
        Ok(id)
    }

    async fn create(
        &mut self,
        name: &str,
        image: &str,
        slot: fn(&mut Tracked) -> &mut Option<TrackedContainer>,
    ) -> Result<String> {
        *slot(&mut self.tracked) = Some(TrackedContainer {
            name: name.to_string(),
            id: None,
        });
        let id = self
            .runtime
            .run_detached(name, image, &self.settings.sleep_command)
            .await
            .map_err(|e| HarnessError::fixture(format!("cannot start {name}: {e}")))?;
        if let Some(container) = slot(&mut self.tracked) {
            container.id = Some(id.clone());
        }
        Ok(id)
    }

    async fn wait_for(&self, id: &str, wanted: ContainerState) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.settings.timeout;
        loop {
            let state = self.runtime.state(id).await?;
            if state == wanted {
                return Ok(());
            }
            if state == ContainerState::Absent || tokio::time::Instant::now() >= deadline {
                return Err(HarnessError::fixture(format!(
                    "container {} is {state:?}, wanted {wanted:?} within {:?}",
                    short_id(id),
                    self.settings.timeout
                )));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn unused_name(&self, prefix: &str) -> Result<String> {
        for _ in 0..self.settings.name_attempts {
            let name = format!("{prefix}-{}", nonce());
            if !self.runtime.name_in_use(&name).await? {
                return Ok(name);
            }
            tracing::debug!("Name {} taken, retrying", name);
        }
        Err(HarnessError::fixture(format!(
            "no unused {prefix} name after {} attempts",
            self.settings.name_attempts
        )))
    }

    async fn absent_image(&self) -> Result<String> {
        for _ in 0..self.settings.name_attempts {
            let reference = format!(
                "{}/absent-{}:v{}",
                self.settings.fake_registry,
                nonce(),
                &nonce()[..6]
            );
            if !self.runtime.image_exists(&reference).await? {
                return Ok(reference);
            }
            tracing::debug!("Image {} unexpectedly present, retrying", reference);
        }
        Err(HarnessError::fixture(format!(
            "no absent image reference under {} after {} attempts",
            self.settings.fake_registry, self.settings.name_attempts
        )))
    }
}

fn unavailable(err: HarnessError) -> HarnessError {
    if err.is_fixture_error() {
        err
    } else {
        HarnessError::fixture(err.to_string())
    }
}

/// Lower-case nonce for names and tags.
fn nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
