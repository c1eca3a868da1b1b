//! Verdicts from exit codes and output patterns.
//!
//! Every specified check is evaluated even after one fails, so a failing
//! verdict always carries the complete picture. Patterns use search
//! semantics: `A|B` passes when either alternative appears anywhere in the
//! stream.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::exec::InvocationResult;

/// Go runtime crash output, as printed by docker and similar tools.
static CRASH_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^(panic: .*|goroutine \d+ \[.*\]:?)$").expect("crash signature regex")
});

/// What a case expects from its invocation.
#[derive(Debug, Clone)]
pub struct Expectation {
    /// Exact exit code.
    pub exit_code: i32,
    /// Pattern searched for in stderr, if checked.
    pub stderr: Option<Regex>,
    /// Pattern searched for in stdout, if checked.
    pub stdout: Option<Regex>,
    /// Also fail when either stream contains a runtime crash trace.
    pub fail_on_crash: bool,
}

impl Expectation {
    /// Expects only an exit code.
    #[must_use]
    pub fn exit_code(code: i32) -> Self {
        Self {
            exit_code: code,
            stderr: None,
            stdout: None,
            fail_on_crash: false,
        }
    }
}

/// Which property a check looked at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    /// Process exit code.
    ExitCode,
    /// Standard error pattern.
    Stderr,
    /// Standard output pattern.
    Stdout,
    /// Runtime crash trace in either stream.
    Crash,
}

/// One evaluated assertion.
#[derive(Debug, Clone, Serialize)]
pub struct Check {
    /// Property checked.
    pub kind: CheckKind,
    /// Expected value or pattern.
    pub expected: String,
    /// Matched text when passed; the observed value when failed.
    pub actual: String,
    /// Whether the check held.
    pub passed: bool,
}

/// Overall result of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// All checks held.
    Passed,
    /// At least one check failed.
    Failed,
    /// The invocation hit its deadline and was killed.
    TimedOut,
    /// The case could not be resolved or executed.
    Errored,
}

impl Outcome {
    /// Returns true only for [`Outcome::Passed`].
    #[must_use]
    pub const fn is_pass(self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Outcome of one case plus the evidence behind it.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    /// Case id.
    pub case_id: String,
    /// Overall outcome.
    pub outcome: Outcome,
    /// Checks that held.
    pub matched: Vec<Check>,
    /// Checks that did not hold.
    pub failed: Vec<Check>,
    /// Raw invocation, kept only when the case did not pass.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<InvocationResult>,
    /// Harness error for errored cases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fixture generation the case was resolved against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
}

impl Verdict {
    /// Verdict for a case that never produced a judgeable invocation.
    #[must_use]
    pub fn errored(case_id: impl Into<String>, error: impl ToString) -> Self {
        Self {
            case_id: case_id.into(),
            outcome: Outcome::Errored,
            matched: Vec::new(),
            failed: Vec::new(),
            evidence: None,
            error: Some(error.to_string()),
            generation: None,
        }
    }

    /// Records the fixture generation.
    #[must_use]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Returns true if the case passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome.is_pass()
    }
}

/// `\r\n` becomes `\n`; nothing else is altered.
#[must_use]
pub fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Judges an invocation against an expectation.
#[must_use]
pub fn evaluate(case_id: &str, result: InvocationResult, expectation: &Expectation) -> Verdict {
    let stdout = normalize_line_endings(&result.stdout);
    let stderr = normalize_line_endings(&result.stderr);
    let mut checks = Vec::with_capacity(4);

    checks.push(Check {
        kind: CheckKind::ExitCode,
        expected: expectation.exit_code.to_string(),
        actual: describe_exit(&result),
        passed: result.exit_code == Some(expectation.exit_code),
    });

    if let Some(pattern) = &expectation.stderr {
        checks.push(search(CheckKind::Stderr, pattern, &stderr));
    }
    if let Some(pattern) = &expectation.stdout {
        checks.push(search(CheckKind::Stdout, pattern, &stdout));
    }
    if expectation.fail_on_crash {
        checks.push(crash_check(&stderr, &stdout));
    }

    let (matched, failed): (Vec<_>, Vec<_>) = checks.into_iter().partition(|c| c.passed);
    let outcome = if result.timed_out {
        Outcome::TimedOut
    } else if failed.is_empty() {
        Outcome::Passed
    } else {
        Outcome::Failed
    };

    Verdict {
        case_id: case_id.to_string(),
        outcome,
        matched,
        failed,
        evidence: (!outcome.is_pass()).then_some(result),
        error: None,
        generation: None,
    }
}

fn search(kind: CheckKind, pattern: &Regex, text: &str) -> Check {
    match pattern.find(text) {
        Some(m) => Check {
            kind,
            expected: pattern.as_str().to_string(),
            actual: m.as_str().to_string(),
            passed: true,
        },
        None => Check {
            kind,
            expected: pattern.as_str().to_string(),
            actual: text.to_string(),
            passed: false,
        },
    }
}

fn crash_check(stderr: &str, stdout: &str) -> Check {
    let found = CRASH_SIGNATURE
        .find(stderr)
        .or_else(|| CRASH_SIGNATURE.find(stdout));
    Check {
        kind: CheckKind::Crash,
        expected: "no runtime crash trace".to_string(),
        actual: found.map_or_else(String::new, |m| m.as_str().to_string()),
        passed: found.is_none(),
    }
}

fn describe_exit(result: &InvocationResult) -> String {
    match (result.exit_code, result.signal) {
        (Some(code), _) => code.to_string(),
        (None, Some(signal)) if result.timed_out => format!("timed out (signal {signal})"),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn result(exit_code: i32, stdout: &str, stderr: &str) -> InvocationResult {
        InvocationResult {
            argv: vec!["attach".into(), "--no-stdin".into()],
            exit_code: Some(exit_code),
            signal: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
            elapsed: Duration::from_millis(12),
            timed_out: false,
        }
    }

    fn expect(code: i32, stderr: Option<&str>, stdout: Option<&str>) -> Expectation {
        Expectation {
            exit_code: code,
            stderr: stderr.map(|p| Regex::new(p).unwrap()),
            stdout: stdout.map(|p| Regex::new(p).unwrap()),
            fail_on_crash: false,
        }
    }

    #[test]
    fn test_exit_code_only_ignores_output() {
        let verdict = evaluate("x1", result(1, "anything", "at all"), &Expectation::exit_code(1));
        assert!(verdict.passed());
        assert!(verdict.evidence.is_none());

        let verdict = evaluate("x1", result(0, "", ""), &Expectation::exit_code(1));
        assert_eq!(verdict.outcome, Outcome::Failed);
        assert_eq!(verdict.failed[0].kind, CheckKind::ExitCode);
        assert_eq!(verdict.failed[0].actual, "0");
        assert!(verdict.evidence.is_some());
    }

    #[test]
    fn test_attach_requires_argument() {
        let expectation = expect(1, Some(r#""attach" requires( exactly)? 1 argument"#), None);
        for stderr in [
            "\"attach\" requires exactly 1 argument.\nSee 'docker attach --help'.",
            "docker: \"attach\" requires 1 argument.",
        ] {
            let verdict = evaluate("op1", result(1, "", stderr), &expectation);
            assert!(verdict.passed(), "{stderr}");
        }
        let verdict = evaluate("op1", result(1, "", "Usage: docker attach"), &expectation);
        assert_eq!(verdict.outcome, Outcome::Failed);
    }

    #[test]
    fn test_alternation_any_branch() {
        let expectation = expect(1, Some("no such id:|No such image:"), None);
        let a = evaluate("ip1", result(1, "", "Error: no such id: abc"), &expectation);
        let b = evaluate("ip1", result(1, "", "Error: No such image: x"), &expectation);
        let c = evaluate("ip1", result(1, "", "Error: no such image: x"), &expectation);
        assert!(a.passed());
        assert!(b.passed());
        assert!(!c.passed(), "matching is case-sensitive");
        assert_eq!(b.matched[1].actual, "No such image:");
    }

    #[test]
    fn test_all_checks_reported_after_failure() {
        let expectation = expect(125, Some("flag needs an argument"), Some("^$"));
        let verdict = evaluate("ov1", result(0, "loaded\n", ""), &expectation);
        assert_eq!(verdict.outcome, Outcome::Failed);
        let kinds: Vec<_> = verdict.failed.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![CheckKind::ExitCode, CheckKind::Stderr, CheckKind::Stdout]
        );
    }

    #[test]
    fn test_crlf_normalized_for_anchored_patterns() {
        let expectation = expect(1, Some("(?m)^unknown flag: --bogus$"), None);
        let verdict = evaluate("uf1", result(1, "", "unknown flag: --bogus\r\n"), &expectation);
        assert!(verdict.passed());
    }

    #[test]
    fn test_timed_out_is_failing() {
        let mut timed_out = result(0, "", "");
        timed_out.exit_code = None;
        timed_out.signal = Some(9);
        timed_out.timed_out = true;

        let verdict = evaluate("hang", timed_out, &Expectation::exit_code(125));
        assert_eq!(verdict.outcome, Outcome::TimedOut);
        assert_eq!(verdict.failed[0].actual, "timed out (signal 9)");
        assert!(verdict.evidence.unwrap().timed_out);
    }

    #[test]
    fn test_crash_check_opt_in() {
        let stderr = "panic: runtime error: slice bounds out of range\n\ngoroutine 1 [running]:\n";
        let verdict = evaluate("c1", result(2, "", stderr), &Expectation::exit_code(2));
        assert!(verdict.passed());

        let mut expectation = Expectation::exit_code(2);
        expectation.fail_on_crash = true;
        let verdict = evaluate("c1", result(2, "", stderr), &expectation);
        assert_eq!(verdict.outcome, Outcome::Failed);
        assert_eq!(verdict.failed[0].kind, CheckKind::Crash);
        assert!(verdict.failed[0].actual.starts_with("panic: runtime error"));
    }
}
