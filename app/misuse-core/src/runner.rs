//! Ordered case execution and aggregation.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::assertion::{self, Outcome, Verdict};
use crate::case::TestCase;
use crate::error::{HarnessError, Result};
use crate::exec::Invoker;
use crate::fixture::{FixtureProvider, FixtureSnapshot};
use crate::runtime::DynContainerRuntime;
use crate::token::Placeholder;

/// Verdict counts. `TimedOut` is counted as failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SuiteSummary {
    /// Cases that produced a verdict.
    pub total: usize,
    /// Cases whose every check held.
    pub passed: usize,
    /// Cases with a failed check, including timeouts.
    pub failed: usize,
    /// Cases that could not be judged: unresolved tokens, spawn failures,
    /// fixtures that stopped being absent.
    pub errored: usize,
}

impl SuiteSummary {
    fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Passed => self.passed += 1,
            Outcome::Failed | Outcome::TimedOut => self.failed += 1,
            Outcome::Errored => self.errored += 1,
        }
    }
}

/// Result of one suite run.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// Fixture generation every case was resolved against.
    pub generation: u64,
    /// Verdicts in execution order.
    pub verdicts: Vec<Verdict>,
    /// Counts over `verdicts`.
    pub summary: SuiteSummary,
    /// True if the run stopped before every case executed.
    pub cancelled: bool,
    /// Fixture teardown problems; they never change a verdict.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub teardown_errors: Vec<String>,
}

impl SuiteReport {
    fn new(generation: u64) -> Self {
        Self {
            generation,
            verdicts: Vec::new(),
            summary: SuiteSummary::default(),
            cancelled: false,
            teardown_errors: Vec::new(),
        }
    }

    fn push(&mut self, verdict: Verdict) {
        self.summary.record(verdict.outcome);
        self.verdicts.push(verdict);
    }

    /// Returns true if the run completed and every case passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.summary.passed == self.summary.total
    }
}

/// Runs cases against one tool.
#[derive(Clone)]
pub struct SuiteRunner {
    invoker: Invoker,
    runtime: Option<DynContainerRuntime>,
}

impl fmt::Debug for SuiteRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SuiteRunner")
            .field("invoker", &self.invoker)
            .field("runtime", &self.runtime.as_ref().map(|r| r.name()))
            .finish()
    }
}

impl SuiteRunner {
    /// Creates a runner invoking through `invoker`.
    #[must_use]
    pub fn new(invoker: Invoker) -> Self {
        Self {
            invoker,
            runtime: None,
        }
    }

    /// Re-checks absent identities against `runtime` right before each
    /// case that uses them.
    ///
    /// Without a runtime the snapshot is trusted as prepared.
    #[must_use]
    pub fn with_runtime(mut self, runtime: DynContainerRuntime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Resolves, executes and judges a single case.
    ///
    /// Never fails: resolution and spawn errors become an `Errored` verdict.
    pub async fn run_case(&self, case: &TestCase, snapshot: &FixtureSnapshot) -> Verdict {
        let verdict = match self.try_run_case(case, snapshot).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!("Case {} errored: {}", case.id, e);
                Verdict::errored(&case.id, e)
            }
        };
        verdict.with_generation(snapshot.generation())
    }

    async fn try_run_case(&self, case: &TestCase, snapshot: &FixtureSnapshot) -> Result<Verdict> {
        let arguments = case.resolve_arguments(snapshot)?;
        let expectation = case.expectation(snapshot)?;
        self.confirm_absent(case, snapshot).await?;
        let result = self
            .invoker
            .run_with_input(
                &case.subcommand,
                &arguments,
                case.stdin.as_deref(),
                case.timeout,
            )
            .await?;
        Ok(assertion::evaluate(&case.id, result, &expectation))
    }

    /// Fails if an absent identity the case references now exists.
    async fn confirm_absent(&self, case: &TestCase, snapshot: &FixtureSnapshot) -> Result<()> {
        let Some(runtime) = &self.runtime else {
            return Ok(());
        };

        for token in case.placeholders() {
            let Some(value) = snapshot.get(token) else {
                continue;
            };
            let present = match token {
                Placeholder::AbsentImageReference => runtime.image_exists(value).await?,
                Placeholder::AbsentName => runtime.name_in_use(value).await?,
                _ => continue,
            };
            if present {
                return Err(HarnessError::fixture(format!(
                    "{token} {value} is no longer absent"
                )));
            }
        }
        Ok(())
    }

    /// Runs every case in order against `snapshot`.
    pub async fn run_suite(&self, cases: &[TestCase], snapshot: Arc<FixtureSnapshot>) -> SuiteReport {
        self.run_suite_until(cases, snapshot, &CancellationToken::new())
            .await
    }

    /// Runs cases in order until done or `cancel` fires.
    ///
    /// Each case runs on its own task so a panic is contained to that case.
    /// Cancellation aborts the case in flight, which kills its process, and
    /// skips the rest.
    pub async fn run_suite_until(
        &self,
        cases: &[TestCase],
        snapshot: Arc<FixtureSnapshot>,
        cancel: &CancellationToken,
    ) -> SuiteReport {
        let mut report = SuiteReport::new(snapshot.generation());

        for case in cases {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            tracing::info!("Running case {}", case.id);

            let runner = self.clone();
            let task_case = case.clone();
            let task_snapshot = snapshot.clone();
            let mut handle = tokio::spawn(async move {
                runner.run_case(&task_case, &task_snapshot).await
            });

            let verdict = tokio::select! {
                joined = &mut handle => match joined {
                    Ok(verdict) => verdict,
                    Err(e) => {
                        tracing::error!("Case {} panicked: {}", case.id, e);
                        Verdict::errored(&case.id, format!("case task failed: {e}"))
                            .with_generation(snapshot.generation())
                    }
                },
                () = cancel.cancelled() => {
                    handle.abort();
                    tracing::warn!("Cancelled during case {}", case.id);
                    report.cancelled = true;
                    break;
                }
            };

            tracing::info!("Case {}: {:?}", case.id, verdict.outcome);
            report.push(verdict);
        }

        report
    }

    /// Prepares fixtures, runs the cases and always releases.
    ///
    /// Absent identities are re-checked against the provider's runtime unless
    /// the runner already has one. Preparation is not interrupted by `cancel`:
    /// it runs to completion, bounded by the fixture timeout, so everything it
    /// created is known when the release happens. A cancelled run then skips
    /// every case.
    ///
    /// # Errors
    ///
    /// Returns `FixtureUnavailable` if fixtures cannot be prepared. Anything
    /// created before the failure is released first.
    pub async fn run_with_fixtures(
        &self,
        provider: &mut FixtureProvider,
        cases: &[TestCase],
        cancel: &CancellationToken,
    ) -> Result<SuiteReport> {
        let runner = match self.runtime {
            Some(_) => self.clone(),
            None => self.clone().with_runtime(provider.runtime()),
        };

        let snapshot = match provider.prepare().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                for teardown in provider.release().await {
                    tracing::warn!("Teardown after failed prepare: {}", teardown);
                }
                return Err(e);
            }
        };

        let mut report = runner.run_suite_until(cases, snapshot, cancel).await;
        report.teardown_errors = provider
            .release()
            .await
            .into_iter()
            .map(|e| e.to_string())
            .collect();
        Ok(report)
    }
}
