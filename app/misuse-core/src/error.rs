//! Error types for the harness engine.

use misuse_error::CommonError;
use thiserror::Error;

use crate::token::Placeholder;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors that can occur while loading, provisioning or running a suite.
///
/// Load-time (`Common(Config)`, `InvalidCase`, token errors found while
/// loading) and fixture errors abort the suite. Everything raised while a
/// single case runs is turned into an errored verdict by the runner.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Common errors (I/O, config, timeouts, failed helper commands).
    #[error(transparent)]
    Common(#[from] CommonError),

    /// A case definition is malformed or has nothing to assert.
    #[error("invalid case `{case}`: {reason}")]
    InvalidCase {
        /// Case id.
        case: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The environment cannot produce a required fixture.
    #[error("fixture unavailable: {0}")]
    FixtureUnavailable(String),

    /// A `%(name)s` marker names a token outside the vocabulary.
    #[error("unknown placeholder token `{0}`")]
    UnknownToken(String),

    /// The token is known but the snapshot has no value for it.
    #[error("placeholder `{0}` has no value in the fixture snapshot")]
    UnresolvedToken(Placeholder),

    /// A `%(` marker is never closed with `)s`.
    #[error("unterminated placeholder marker in `{0}`")]
    MalformedTemplate(String),

    /// The target tool could not be spawned at all.
    #[error("failed to execute `{program}`: {source}")]
    Execution {
        /// Program that was being spawned.
        program: String,
        /// Underlying spawn or wait error.
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Common(CommonError::config(msg))
    }

    /// Creates a new invalid case error.
    #[must_use]
    pub fn invalid_case(case: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCase {
            case: case.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new fixture unavailable error.
    #[must_use]
    pub fn fixture(msg: impl Into<String>) -> Self {
        Self::FixtureUnavailable(msg.into())
    }

    /// Returns true if the error is detected while loading a suite.
    #[must_use]
    pub const fn is_load_error(&self) -> bool {
        matches!(
            self,
            Self::Common(CommonError::Config(_))
                | Self::InvalidCase { .. }
                | Self::UnknownToken(_)
                | Self::MalformedTemplate(_)
        )
    }

    /// Returns true if the environment could not provide fixtures.
    #[must_use]
    pub const fn is_fixture_error(&self) -> bool {
        matches!(self, Self::FixtureUnavailable(_))
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        Self::Common(CommonError::from(err))
    }
}

impl From<figment::Error> for HarnessError {
    fn from(err: figment::Error) -> Self {
        Self::config(err.to_string())
    }
}
