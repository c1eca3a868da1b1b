//! Core engine for misuse, a negative-usage conformance harness.
//!
//! A suite is a set of deliberately malformed invocations of a target tool
//! (by default the `docker` CLI) together with the exit status and
//! diagnostics the tool is expected to produce. The engine is split into:
//!
//! 1. **Fixtures** ([`fixture`], [`runtime`]) - live identities such as a
//!    running container or an image reference that is guaranteed absent
//! 2. **Substitution** ([`token`], [`resolve`]) - `%(token)s` markers in
//!    arguments and patterns replaced with fixture values
//! 3. **Execution** ([`exec`]) - one bounded invocation per case
//! 4. **Assertion** ([`assertion`]) - exit code and regex checks into a
//!    [`Verdict`]
//! 5. **Running** ([`runner`]) - ordered, isolated execution into a
//!    [`SuiteReport`]

pub mod assertion;
pub mod case;
pub mod config;
pub mod error;
pub mod exec;
pub mod fixture;
pub mod resolve;
pub mod runner;
pub mod runtime;
pub mod token;

pub use assertion::{Check, CheckKind, Expectation, Outcome, Verdict};
pub use case::{Argument, CaseDefaults, SuiteDefinition, TestCase};
pub use config::Config;
pub use error::{HarnessError, Result};
pub use exec::{InvocationResult, Invoker};
pub use fixture::{FixtureProvider, FixtureSettings, FixtureSnapshot};
pub use runner::{SuiteReport, SuiteRunner, SuiteSummary};
pub use runtime::{ContainerRuntime, ContainerState, DockerCli, DynContainerRuntime};
pub use token::Placeholder;
