//! Common error types for misuse.
//!
//! Errors that several misuse crates can produce live here so every crate
//! reports I/O, configuration, timeout and helper command failures the same
//! way.
//!
//! # Usage
//!
//! ```rust
//! use misuse_error::CommonError;
//!
//! fn load() -> Result<(), CommonError> {
//!     Err(CommonError::config("suite file has no cases"))
//! }
//! ```
//!
//! # Crate-Specific Errors
//!
//! Crates wrap `CommonError` in their own enum:
//!
//! ```rust,ignore
//! use misuse_error::CommonError;
//! use thiserror::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum HarnessError {
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//!
//!     #[error("fixture unavailable: {0}")]
//!     FixtureUnavailable(String),
//! }
//! ```

mod common;

pub use common::CommonError;
