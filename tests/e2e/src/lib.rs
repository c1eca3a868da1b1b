//! End-to-end tests for misuse.
//!
//! These tests run the bundled suites against a real docker daemon. They are
//! `#[ignore]`d by default; run them with `cargo test -p misuse-e2e -- --ignored`.
//! Tests skip themselves when docker is not reachable.

pub mod harness;

pub use harness::{TestConfig, TestHarness, docker_available};
