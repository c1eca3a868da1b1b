//! Shared helpers for misuse-core integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use misuse_core::error::Result;
use misuse_core::{ContainerRuntime, ContainerState, FixtureSettings, HarnessError, Invoker};
use misuse_error::CommonError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

pub const BASE_IMAGE: &str = "docker.io/library/busybox:latest";

#[derive(Debug)]
struct FakeContainer {
    name: String,
    state: ContainerState,
}

#[derive(Debug, Default)]
struct FakeState {
    images: BTreeSet<String>,
    containers: BTreeMap<String, FakeContainer>,
    next_id: u64,
    pulls: usize,
}

/// In-memory runtime with switchable failures.
#[derive(Debug, Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    pub unreachable: AtomicBool,
    pub fail_pull: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_remove: AtomicBool,
    /// Delay after a container is created and before its id is returned.
    pub start_delay_ms: AtomicU64,
    /// The next this many name lookups report the name as taken.
    pub taken_names: AtomicUsize,
    /// The next this many lookups of a fake-registry reference report it present.
    pub phantom_images: AtomicUsize,
    /// Every `image_exists` call.
    pub image_lookups: AtomicUsize,
}

impl FakeRuntime {
    /// A reachable runtime with the base image already present.
    pub fn with_base_image() -> Self {
        let runtime = Self::default();
        runtime.add_image(BASE_IMAGE);
        runtime
    }

    pub fn add_image(&self, reference: &str) {
        self.state.lock().unwrap().images.insert(reference.to_string());
    }

    pub fn set(&self, flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    pub fn set_count(&self, counter: &AtomicUsize, value: usize) {
        counter.store(value, Ordering::SeqCst);
    }

    pub fn count(&self, counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    /// Containers that still exist.
    pub fn live_containers(&self) -> Vec<String> {
        self.state.lock().unwrap().containers.keys().cloned().collect()
    }

    pub fn pulls(&self) -> usize {
        self.state.lock().unwrap().pulls
    }

    /// Names of the containers that still exist.
    pub fn live_names(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .containers
            .values()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Changes a container behind the provider's back.
    pub fn force_state(&self, id: &str, state: ContainerState) {
        let mut guard = self.state.lock().unwrap();
        if let Some(key) = Self::lookup(&guard, id) {
            if let Some(container) = guard.containers.get_mut(&key) {
                container.state = state;
            }
        }
    }

    /// Resolves an id or a name, the way the docker CLI does.
    fn lookup(state: &FakeState, id_or_name: &str) -> Option<String> {
        if state.containers.contains_key(id_or_name) {
            return Some(id_or_name.to_string());
        }
        state
            .containers
            .iter()
            .find(|(_, c)| c.name == id_or_name)
            .map(|(id, _)| id.clone())
    }

    fn consume(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn failing(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(CommonError::internal(format!("injected {what} failure")).into());
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn ping(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CommonError::command_failed("fake version", "exit status: 1", "Cannot connect").into());
        }
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        self.image_lookups.fetch_add(1, Ordering::SeqCst);
        if reference.contains("/absent-") && Self::consume(&self.phantom_images) {
            return Ok(true);
        }
        Ok(self.state.lock().unwrap().images.contains(reference))
    }

    async fn pull_image(&self, reference: &str) -> Result<()> {
        Self::failing(&self.fail_pull, "pull")?;
        let mut state = self.state.lock().unwrap();
        state.pulls += 1;
        state.images.insert(reference.to_string());
        Ok(())
    }

    async fn name_in_use(&self, name: &str) -> Result<bool> {
        if Self::consume(&self.taken_names) {
            return Ok(true);
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .containers
            .values()
            .any(|c| c.name == name))
    }

    async fn run_detached(&self, name: &str, image: &str, _command: &[String]) -> Result<String> {
        let id = {
            let mut state = self.state.lock().unwrap();
            if !state.images.contains(image) {
                return Err(HarnessError::Common(CommonError::command_failed(
                    format!("fake run {image}"),
                    "exit status: 125",
                    format!("Unable to find image '{image}' locally"),
                )));
            }
            state.next_id += 1;
            let id = format!("{:064x}", state.next_id);
            state.containers.insert(
                id.clone(),
                FakeContainer {
                    name: name.to_string(),
                    state: ContainerState::Running,
                },
            );
            id
        };
        let delay = self.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(id)
    }

    async fn stop(&self, id: &str) -> Result<()> {
        Self::failing(&self.fail_stop, "stop")?;
        self.force_state(id, ContainerState::Exited);
        Ok(())
    }

    async fn state(&self, id: &str) -> Result<ContainerState> {
        let state = self.state.lock().unwrap();
        Ok(Self::lookup(&state, id)
            .and_then(|key| state.containers.get(&key))
            .map_or(ContainerState::Absent, |c| c.state))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        Self::failing(&self.fail_remove, "remove")?;
        let mut state = self.state.lock().unwrap();
        if let Some(key) = Self::lookup(&state, id) {
            state.containers.remove(&key);
        }
        Ok(())
    }
}

/// Fast polling settings for the fake runtime.
pub fn fast_settings() -> FixtureSettings {
    FixtureSettings {
        base_image: BASE_IMAGE.to_string(),
        timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(1),
        ..FixtureSettings::default()
    }
}

/// A shell script standing in for the tool under test.
///
/// The script runs through `/bin/sh`, so `$1` is the subcommand.
pub struct FakeTool {
    _dir: TempDir,
    script: PathBuf,
}

impl FakeTool {
    pub fn new(body: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-tool.sh");
        std::fs::write(&script, format!("#!/bin/sh\n{body}\n")).unwrap();
        Self { _dir: dir, script }
    }

    pub fn invoker(&self) -> Invoker {
        Invoker::new("/bin/sh")
            .with_global_args(vec![self.script.display().to_string()])
            .with_kill_grace(Duration::from_millis(300))
    }
}

/// Mimics the docker diagnostics the sample cases look for.
pub const DOCKERISH: &str = r#"
case "$1" in
  attach)
    echo '"attach" requires exactly 1 argument.' >&2
    echo "See 'docker attach --help'." >&2
    exit 1 ;;
  load)
    echo 'flag needs an argument: --input' >&2
    exit 125 ;;
  tag)
    echo "Error response from daemon: No such image: $3" >&2
    exit 1 ;;
  hang)
    exec sleep 30 ;;
  crash)
    echo 'panic: runtime error: index out of range' >&2
    kill -SEGV $$ ;;
  read)
    cat
    exit 2 ;;
  *)
    echo "unknown command: $1" >&2
    exit 125 ;;
esac
"#;
