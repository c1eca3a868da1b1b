//! Placeholder vocabulary.
//!
//! The set of tokens is closed. Case definitions refer to them with
//! `%(name)s` markers, e.g. `%(running-process-id)s`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HarnessError;

/// A symbolic name resolved to a live fixture value at run time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Placeholder {
    /// An image reference that is present locally.
    ValidImageReference,
    /// A syntactically valid image reference that does not resolve.
    AbsentImageReference,
    /// Id of a container that stays running for the whole suite.
    RunningProcessId,
    /// Id of a container whose stop has been confirmed.
    StoppedProcessId,
    /// A container name that is not assigned to anything.
    AbsentName,
}

impl Placeholder {
    /// Every token, in snapshot order.
    pub const ALL: [Self; 5] = [
        Self::ValidImageReference,
        Self::AbsentImageReference,
        Self::RunningProcessId,
        Self::StoppedProcessId,
        Self::AbsentName,
    ];

    /// Name used inside `%(...)s` markers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ValidImageReference => "valid-image-reference",
            Self::AbsentImageReference => "absent-image-reference",
            Self::RunningProcessId => "running-process-id",
            Self::StoppedProcessId => "stopped-process-id",
            Self::AbsentName => "absent-name",
        }
    }

    /// The full marker, e.g. `%(absent-name)s`.
    #[must_use]
    pub fn marker(self) -> String {
        format!("%({})s", self.name())
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Placeholder {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|token| token.name() == s)
            .ok_or_else(|| HarnessError::UnknownToken(s.to_string()))
    }
}
