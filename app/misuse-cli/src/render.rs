//! Table rendering.

use misuse_core::{Argument, FixtureSnapshot, Outcome, SuiteReport, TestCase, Verdict};

pub fn print_cases(cases: &[TestCase]) {
    println!("{:<12} {:<12} {:<6} {}", "CASE", "SUBCOMMAND", "EXIT", "ARGUMENTS");
    for case in cases {
        let arguments: Vec<&str> = case
            .arguments
            .iter()
            .map(|argument| match argument {
                Argument::Literal(text) | Argument::Template(text) => text.as_str(),
            })
            .collect();
        let subcommand = if case.subcommand.is_empty() {
            "-"
        } else {
            case.subcommand.as_str()
        };
        println!(
            "{:<12} {:<12} {:<6} {}",
            case.id,
            subcommand,
            case.expected_exit_code,
            arguments.join(" ")
        );
    }
}

pub fn print_snapshot(snapshot: &FixtureSnapshot) {
    println!("Generation: {}", snapshot.generation());
    for (token, value) in snapshot.iter() {
        println!("  {:<24} {}", token.to_string(), value);
    }
}

pub fn print_report(report: &SuiteReport) {
    println!("{:<12} {:<10} {}", "CASE", "RESULT", "DETAIL");
    for verdict in &report.verdicts {
        println!(
            "{:<12} {:<10} {}",
            verdict.case_id,
            outcome_label(verdict.outcome),
            detail(verdict)
        );
    }

    for verdict in report.verdicts.iter().filter(|v| !v.passed()) {
        print_failure(verdict);
    }

    println!();
    let summary = &report.summary;
    println!(
        "{} cases: {} passed, {} failed, {} errored (fixtures generation {})",
        summary.total, summary.passed, summary.failed, summary.errored, report.generation
    );
    if report.cancelled {
        println!("Run cancelled before all cases completed");
    }
    for error in &report.teardown_errors {
        println!("Teardown: {error}");
    }
}

fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Passed => "ok",
        Outcome::Failed => "FAILED",
        Outcome::TimedOut => "TIMEOUT",
        Outcome::Errored => "ERROR",
    }
}

fn detail(verdict: &Verdict) -> String {
    if let Some(error) = &verdict.error {
        return error.clone();
    }
    match verdict.failed.first() {
        Some(check) => format!("{:?}: expected {}", check.kind, check.expected),
        None => format!("{} checks", verdict.matched.len()),
    }
}

fn print_failure(verdict: &Verdict) {
    println!();
    println!("--- {} ---", verdict.case_id);
    if let Some(evidence) = &verdict.evidence {
        println!("argv:   {}", evidence.argv.join(" "));
        println!(
            "status: {:?} (signal {:?}) after {:?}",
            evidence.exit_code, evidence.signal, evidence.elapsed
        );
    }
    for check in &verdict.failed {
        println!("{:?}: expected {:?}", check.kind, check.expected);
        println!("  got {:?}", check.actual);
    }
    if let Some(evidence) = &verdict.evidence {
        if !evidence.stderr.is_empty() {
            println!("stderr:\n{}", evidence.stderr.trim_end());
        }
        if !evidence.stdout.is_empty() {
            println!("stdout:\n{}", evidence.stdout.trim_end());
        }
    }
}
