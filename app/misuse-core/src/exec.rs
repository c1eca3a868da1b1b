//! Invocation of the tool under test.

use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use serde::Serialize;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::{HarnessError, Result};

/// Captured outcome of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct InvocationResult {
    /// Arguments passed to the program (without the program itself).
    pub argv: Vec<String>,
    /// Exit code; `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Terminating signal, if any.
    pub signal: Option<i32>,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Wall time from spawn to reap.
    pub elapsed: Duration,
    /// True if the harness killed the process at the deadline.
    pub timed_out: bool,
}

impl InvocationResult {
    /// Returns true if the process exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    fn from_status(
        argv: Vec<String>,
        status: ExitStatus,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        elapsed: Duration,
        timed_out: bool,
    ) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            argv,
            exit_code: status.code(),
            signal,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            elapsed,
            timed_out,
        }
    }
}

/// Spawns the target tool.
#[derive(Debug, Clone)]
pub struct Invoker {
    program: PathBuf,
    global_args: Vec<String>,
    kill_grace: Duration,
}

impl Invoker {
    /// Creates an invoker for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            global_args: Vec::new(),
            kill_grace: Duration::from_secs(2),
        }
    }

    /// Arguments placed before the subcommand on every invocation.
    #[must_use]
    pub fn with_global_args(mut self, args: Vec<String>) -> Self {
        self.global_args = args;
        self
    }

    /// How long a timed-out process gets between SIGTERM and SIGKILL.
    #[must_use]
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }

    /// Builds `global_args + [subcommand] + arguments`; an empty subcommand is omitted.
    #[must_use]
    pub fn argv(&self, subcommand: &str, arguments: &[String]) -> Vec<String> {
        let mut argv = self.global_args.clone();
        if !subcommand.is_empty() {
            argv.push(subcommand.to_string());
        }
        argv.extend(arguments.iter().cloned());
        argv
    }

    /// Runs one invocation with stdin closed.
    pub async fn run(
        &self,
        subcommand: &str,
        arguments: &[String],
        timeout: Duration,
    ) -> Result<InvocationResult> {
        self.run_with_input(subcommand, arguments, None, timeout)
            .await
    }

    /// Runs one invocation, feeding `input` on stdin when given.
    ///
    /// A timeout is not an error: the process is terminated and the result
    /// comes back with `timed_out` set. Only a failure to spawn or reap is.
    ///
    /// The tool runs as the leader of its own process group. Signals go to
    /// the whole group, and whatever is left of it after the leader exits
    /// is killed, so helpers it forked cannot outlive the case.
    pub async fn run_with_input(
        &self,
        subcommand: &str,
        arguments: &[String],
        input: Option<&str>,
        timeout: Duration,
    ) -> Result<InvocationResult> {
        let argv = self.argv(subcommand, arguments);
        tracing::debug!("exec {} {:?}", self.program.display(), argv);

        let mut cmd = Command::new(&self.program);
        cmd.args(&argv)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd.process_group(0);

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| self.execution_error(source))?;
        let mut group = ProcessGroup::of(&child);

        let stdout = Capture::spawn(child.stdout.take());
        let stderr = Capture::spawn(child.stderr.take());
        if let (Some(text), Some(mut pipe)) = (input, child.stdin.take()) {
            let text = text.to_string();
            tokio::spawn(async move {
                // The tool may exit without reading; a broken pipe is expected.
                let _ = pipe.write_all(text.as_bytes()).await;
            });
        }

        let (status, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => (status.map_err(|source| self.execution_error(source))?, false),
            Err(_) => {
                tracing::warn!(
                    "{} {:?} exceeded {:?}, terminating",
                    self.program.display(),
                    argv,
                    timeout
                );
                let status = self
                    .terminate(&mut child, &group)
                    .await
                    .map_err(|source| self.execution_error(source))?;
                (status, true)
            }
        };
        let elapsed = started.elapsed();
        group.finish();

        let stdout = stdout.collect(self.kill_grace).await;
        let stderr = stderr.collect(self.kill_grace).await;
        tracing::debug!(
            "exit={:?} stdout={}B stderr={}B elapsed={:?}",
            status.code(),
            stdout.len(),
            stderr.len(),
            elapsed
        );

        Ok(InvocationResult::from_status(
            argv, status, stdout, stderr, elapsed, timed_out,
        ))
    }

    /// SIGTERM to the group, bounded grace, then SIGKILL. Always reaps.
    async fn terminate(
        &self,
        child: &mut Child,
        group: &ProcessGroup,
    ) -> std::io::Result<ExitStatus> {
        if group.terminate() {
            if let Ok(status) = tokio::time::timeout(self.kill_grace, child.wait()).await {
                return status;
            }
            tracing::warn!(
                "{} ignored SIGTERM, sending SIGKILL",
                self.program.display()
            );
            group.kill();
        }

        child.kill().await?;
        child.wait().await
    }

    fn execution_error(&self, source: std::io::Error) -> HarnessError {
        HarnessError::Execution {
            program: self.program.display().to_string(),
            source,
        }
    }
}

/// Process group led by a spawned tool.
///
/// Dropping it kills the group, which covers an invocation whose task is
/// aborted mid-flight.
#[derive(Debug)]
struct ProcessGroup {
    leader: Option<Pid>,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self {
            leader: child
                .id()
                .and_then(|pid| i32::try_from(pid).ok())
                .map(Pid::from_raw),
        }
    }

    /// Sends SIGTERM; false if nothing in the group could be signalled.
    fn terminate(&self) -> bool {
        self.signal(Signal::SIGTERM)
    }

    fn kill(&self) {
        self.signal(Signal::SIGKILL);
    }

    /// Kills what is left of the group and forgets it.
    fn finish(&mut self) {
        self.kill();
        self.leader = None;
    }

    fn signal(&self, signal: Signal) -> bool {
        let Some(leader) = self.leader else {
            return false;
        };
        match killpg(leader, signal) {
            Ok(()) => true,
            // Nothing left in the group.
            Err(Errno::ESRCH) => false,
            Err(e) => {
                tracing::debug!("{} to group {} failed: {}", signal, leader, e);
                false
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Output read from one pipe, kept as it arrives.
struct Capture {
    bytes: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl Capture {
    fn spawn<R: AsyncRead + Unpin + Send + 'static>(pipe: Option<R>) -> Self {
        let bytes = Arc::new(Mutex::new(Vec::new()));
        let sink = bytes.clone();
        let reader = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => lock(&sink).extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        tracing::debug!("read error after {} bytes: {}", lock(&sink).len(), e);
                        break;
                    }
                }
            }
        });
        Self { bytes, reader }
    }

    /// Waits for end of file, bounded by `grace`.
    ///
    /// A process that escaped the group can hold the pipe open; what was read
    /// before the deadline is returned either way.
    async fn collect(mut self, grace: Duration) -> Vec<u8> {
        match tokio::time::timeout(grace, &mut self.reader).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("output reader failed: {}", e),
            Err(_) => {
                self.reader.abort();
                tracing::warn!("output still open after exit; keeping what was read");
            }
        }
        std::mem::take(&mut *lock(&self.bytes))
    }
}

fn lock(bytes: &Mutex<Vec<u8>>) -> MutexGuard<'_, Vec<u8>> {
    bytes.lock().unwrap_or_else(PoisonError::into_inner)
}
