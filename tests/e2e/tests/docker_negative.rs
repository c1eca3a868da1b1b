//! Runs the bundled docker suite against a real daemon.

use anyhow::Result;
use misuse_core::{Outcome, Placeholder};
use misuse_e2e::{TestConfig, TestHarness, docker_available};

/// Skip test if docker is not reachable.
fn skip_if_no_docker() -> bool {
    let config = TestConfig::default();
    if !docker_available(&config.docker_binary) {
        eprintln!(
            "Skipping test: docker not reachable via {}",
            config.docker_binary.display()
        );
        return true;
    }
    false
}

#[test]
fn test_bundled_suite_loads() -> Result<()> {
    let config = TestConfig::default();
    let cases = misuse_core::SuiteDefinition::load(&config.suite_path)?
        .into_cases(misuse_core::CaseDefaults::default())?;

    let ids: Vec<_> = cases.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "op1", "op2", "ov1", "ov2", "ov3", "uf1", "uc1", "ip1", "ip2", "in1", "in2", "st1",
            "st2", "st3", "st4", "pl1"
        ]
    );
    Ok(())
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn test_sample_cases_pass() -> Result<()> {
    if skip_if_no_docker() {
        return Ok(());
    }
    let harness = TestHarness::with_defaults()?;

    let report = harness.run(&["op1", "ov1", "ip1"]).await?;

    for verdict in &report.verdicts {
        assert_eq!(
            verdict.outcome,
            Outcome::Passed,
            "{}",
            serde_json::to_string_pretty(verdict)?
        );
    }
    assert!(report.teardown_errors.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn test_full_suite() -> Result<()> {
    if skip_if_no_docker() {
        return Ok(());
    }
    let harness = TestHarness::with_defaults()?;

    let report = harness.run(&[]).await?;

    let failed: Vec<_> = report.verdicts.iter().filter(|v| !v.passed()).collect();
    assert!(
        failed.is_empty(),
        "{}",
        serde_json::to_string_pretty(&failed)?
    );
    Ok(())
}

#[tokio::test]
#[ignore = "requires a docker daemon"]
async fn test_fixtures_leave_no_residue() -> Result<()> {
    if skip_if_no_docker() {
        return Ok(());
    }
    let harness = TestHarness::with_defaults()?;
    let mut provider = harness.provider();

    let first = provider.prepare().await?;
    let running = first.get(Placeholder::RunningProcessId).unwrap().to_string();
    let stopped = first.get(Placeholder::StoppedProcessId).unwrap().to_string();
    assert!(harness.container_exists(&running));
    assert!(harness.container_exists(&stopped));
    assert!(!harness.container_exists(first.get(Placeholder::AbsentName).unwrap()));

    assert!(provider.release().await.is_empty());
    assert!(!harness.container_exists(&running));
    assert!(!harness.container_exists(&stopped));

    let second = provider.prepare().await?;
    assert_eq!(second.generation(), first.generation() + 1);
    assert!(second.is_complete());
    assert!(provider.release().await.is_empty());
    Ok(())
}

#[test]
#[ignore = "requires a built misuse binary and a docker daemon"]
fn test_cli_exit_codes() -> Result<()> {
    if skip_if_no_docker() {
        return Ok(());
    }
    let config = TestConfig::default();
    if !config.misuse_binary.exists() {
        eprintln!("Skipping test: {} not built", config.misuse_binary.display());
        return Ok(());
    }

    let status = std::process::Command::new(&config.misuse_binary)
        .arg("check")
        .arg(&config.suite_path)
        .status()?;
    assert_eq!(status.code(), Some(0));

    let status = std::process::Command::new(&config.misuse_binary)
        .args(["run", "/nonexistent/suite.toml"])
        .status()?;
    assert_eq!(status.code(), Some(2));

    let output = std::process::Command::new(&config.misuse_binary)
        .args(["run", "--format", "json", "--case", "op1"])
        .arg(&config.suite_path)
        .output()?;
    assert_eq!(output.status.code(), Some(0));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["summary"]["passed"], 1);
    Ok(())
}
