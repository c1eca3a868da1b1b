//! Common error types shared across misuse crates.

use thiserror::Error;

/// Common errors that occur across multiple misuse crates.
///
/// Crate-specific errors should wrap this type using the `#[from]` attribute.
#[derive(Debug, Error)]
pub enum CommonError {
    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    ///
    /// Malformed configuration or suite files, degenerate case definitions
    /// and values that fail validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A helper command ran but exited unsuccessfully.
    #[error("command `{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed stderr of the command.
        stderr: String,
    },

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommonError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new timeout error.
    #[must_use]
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Creates a new command failure.
    #[must_use]
    pub fn command_failed(
        command: impl Into<String>,
        status: impl Into<String>,
        stderr: impl AsRef<str>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            status: status.into(),
            stderr: stderr.as_ref().trim().to_string(),
        }
    }

    /// Creates a new internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
