//! Case definitions and the suite file.
//!
//! ## Example Suite File
//!
//! ```toml
//! [defaults]
//! exit_code = 125
//!
//! [cases.op1]
//! subcommand = "attach"
//! subargs = "--no-stdin,--sig-proxy"
//! exit_code = 1
//! stderr = '"attach" requires( exactly)? 1 argument'
//!
//! [cases.ip1]
//! subcommand = "tag"
//! subargs = "%(running-process-id)s,%(absent-image-reference)s"
//! exit_code = 1
//! stderr = "no such id:|No such image:"
//! ```
//!
//! Everything that can be checked without fixtures is checked while
//! loading: unknown tokens, malformed markers, regex syntax and cases that
//! assert nothing.

use figment::{
    Figment,
    providers::{Format, Toml},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::assertion::Expectation;
use crate::error::{HarnessError, Result};
use crate::fixture::FixtureSnapshot;
use crate::resolve;
use crate::token::Placeholder;

/// `subargs` as written: a comma-separated string or a TOML array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubArgs {
    /// `"--no-stdin,--sig-proxy"`
    Csv(String),
    /// `["--no-stdin", "--sig-proxy"]`
    List(Vec<String>),
}

impl SubArgs {
    /// Trimmed, non-empty items.
    #[must_use]
    pub fn items(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Self::Csv(csv) => csv.split(',').collect(),
            Self::List(list) => list.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// One `[cases.<id>]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaseDefinition {
    /// Tool verb; omitted for top-level invocations.
    #[serde(default)]
    pub subcommand: Option<String>,
    /// Arguments after the subcommand.
    #[serde(default)]
    pub subargs: Option<SubArgs>,
    /// Expected exit code.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Pattern searched for in stderr.
    #[serde(default)]
    pub stderr: Option<String>,
    /// Pattern searched for in stdout.
    #[serde(default)]
    pub stdout: Option<String>,
    /// Text fed on stdin.
    #[serde(default)]
    pub stdin: Option<String>,
    /// Per-case invocation timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// The `[defaults]` table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteDefaults {
    /// Overrides the policy exit code for this suite.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Overrides the execution timeout for this suite.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// A parsed suite file, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteDefinition {
    /// Suite-wide defaults.
    #[serde(default)]
    pub defaults: SuiteDefaults,
    /// Cases keyed by id.
    #[serde(default)]
    pub cases: BTreeMap<String, CaseDefinition>,
    /// Case ids in the order their tables appear in the file.
    #[serde(skip)]
    order: Vec<String>,
}

/// `[cases.<id>]` table headers, bare or quoted.
static CASE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*\[[ \t]*cases[ \t]*\.[ \t]*"?([A-Za-z0-9_-]+)"?[ \t]*\]"#)
        .expect("invalid regex")
});

fn declared_order(toml: &str) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    for captures in CASE_HEADER.captures_iter(toml) {
        let id = &captures[1];
        if !order.iter().any(|seen| seen == id) {
            order.push(id.to_string());
        }
    }
    order
}

/// Values a case falls back to.
#[derive(Debug, Clone, Copy)]
pub struct CaseDefaults {
    /// Exit code expected when a case does not name one.
    pub exit_code: i32,
    /// Invocation timeout.
    pub timeout: Duration,
    /// Whether crash traces fail a case.
    pub fail_on_crash: bool,
}

impl Default for CaseDefaults {
    fn default() -> Self {
        Self {
            exit_code: 125,
            timeout: Duration::from_secs(30),
            fail_on_crash: false,
        }
    }
}

impl SuiteDefinition {
    /// Reads a suite file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(HarnessError::config(format!(
                "suite file {} does not exist",
                path.display()
            )));
        }
        let mut suite: Self = Figment::from(Toml::file(path)).extract()?;
        suite.order = declared_order(&std::fs::read_to_string(path)?);
        Ok(suite)
    }

    /// Parses suite TOML from a string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let mut suite: Self = Figment::from(Toml::string(toml)).extract()?;
        suite.order = declared_order(toml);
        Ok(suite)
    }

    /// Keeps only the listed case ids.
    pub fn select(mut self, ids: &[String]) -> Result<Self> {
        if ids.is_empty() {
            return Ok(self);
        }
        if let Some(missing) = ids.iter().find(|id| !self.cases.contains_key(*id)) {
            return Err(HarnessError::config(format!("no case named `{missing}`")));
        }
        self.cases.retain(|id, _| ids.contains(id));
        Ok(self)
    }

    /// Validates every case, in file order.
    ///
    /// Cases declared without a `[cases.<id>]` header, as dotted keys or
    /// inline tables, follow in ascending id order.
    pub fn into_cases(self, defaults: CaseDefaults) -> Result<Vec<TestCase>> {
        let Self {
            defaults: suite_defaults,
            cases,
            order,
        } = self;
        let defaults = CaseDefaults {
            exit_code: suite_defaults.exit_code.unwrap_or(defaults.exit_code),
            timeout: suite_defaults
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
            fail_on_crash: defaults.fail_on_crash,
        };
        if cases.is_empty() {
            return Err(HarnessError::config("suite defines no cases"));
        }

        let mut cases: Vec<(String, CaseDefinition)> = cases.into_iter().collect();
        cases.sort_by_key(|(id, _)| {
            order
                .iter()
                .position(|seen| seen == id)
                .unwrap_or(usize::MAX)
        });
        cases
            .into_iter()
            .map(|(id, definition)| TestCase::from_definition(id, definition, &defaults))
            .collect()
    }
}

/// One argument token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// Passed through as is (`%%` already collapsed).
    Literal(String),
    /// Contains at least one placeholder marker.
    Template(String),
}

/// A validated negative-usage case.
#[derive(Debug, Clone)]
pub struct TestCase {
    /// Short unique id.
    pub id: String,
    /// Tool verb; empty for top-level invocations.
    pub subcommand: String,
    /// Arguments after the subcommand.
    pub arguments: Vec<Argument>,
    /// Exact exit code expected.
    pub expected_exit_code: i32,
    /// Stderr pattern template.
    pub expected_stderr_pattern: Option<String>,
    /// Stdout pattern template.
    pub expected_stdout_pattern: Option<String>,
    /// Text fed on stdin; stdin is closed when absent.
    pub stdin: Option<String>,
    /// Invocation deadline.
    pub timeout: Duration,
    /// Fail on runtime crash traces.
    pub fail_on_crash: bool,
}

impl TestCase {
    /// Validates a definition.
    pub fn from_definition(
        id: String,
        definition: CaseDefinition,
        defaults: &CaseDefaults,
    ) -> Result<Self> {
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(HarnessError::invalid_case(
                &id,
                "id must be non-empty and contain no whitespace",
            ));
        }
        let invalid = |e: HarnessError| HarnessError::invalid_case(&id, e.to_string());

        let mut arguments = Vec::new();
        for item in definition.subargs.as_ref().map(SubArgs::items).unwrap_or_default() {
            if resolve::scan(&item).map_err(invalid)?.is_empty() {
                let literal = resolve::resolve(&item, &FixtureSnapshot::default()).map_err(invalid)?;
                arguments.push(Argument::Literal(literal));
            } else {
                arguments.push(Argument::Template(item));
            }
        }

        let sample = FixtureSnapshot::sample();
        for pattern in [&definition.stderr, &definition.stdout].into_iter().flatten() {
            let resolved = resolve::resolve_pattern(pattern, &sample).map_err(invalid)?;
            Regex::new(&resolved).map_err(|e| {
                HarnessError::invalid_case(&id, format!("bad pattern `{pattern}`: {e}"))
            })?;
        }

        let expected_exit_code = definition.exit_code.unwrap_or(defaults.exit_code);
        if definition.stderr.is_none()
            && definition.stdout.is_none()
            && expected_exit_code == defaults.exit_code
        {
            return Err(HarnessError::invalid_case(
                &id,
                "nothing to assert: no stderr or stdout pattern and the default exit code",
            ));
        }

        Ok(Self {
            subcommand: definition.subcommand.unwrap_or_default().trim().to_string(),
            arguments,
            expected_exit_code,
            expected_stderr_pattern: definition.stderr,
            expected_stdout_pattern: definition.stdout,
            stdin: definition.stdin,
            timeout: definition
                .timeout_secs
                .map_or(defaults.timeout, Duration::from_secs),
            fail_on_crash: defaults.fail_on_crash,
            id,
        })
    }

    /// Every placeholder the case references, deduplicated and sorted.
    #[must_use]
    pub fn placeholders(&self) -> Vec<Placeholder> {
        let templates = self
            .arguments
            .iter()
            .filter_map(|argument| match argument {
                Argument::Template(text) => Some(text.as_str()),
                Argument::Literal(_) => None,
            })
            .chain(self.expected_stderr_pattern.as_deref())
            .chain(self.expected_stdout_pattern.as_deref());

        let mut tokens: Vec<Placeholder> = templates
            .filter_map(|template| resolve::scan(template).ok())
            .flatten()
            .collect();
        tokens.sort();
        tokens.dedup();
        tokens
    }

    /// Resolves arguments against `snapshot`.
    pub fn resolve_arguments(&self, snapshot: &FixtureSnapshot) -> Result<Vec<String>> {
        self.arguments
            .iter()
            .map(|argument| match argument {
                Argument::Literal(text) => Ok(text.clone()),
                Argument::Template(text) => resolve::resolve(text, snapshot),
            })
            .collect()
    }

    /// Resolves and compiles the expectation against `snapshot`.
    pub fn expectation(&self, snapshot: &FixtureSnapshot) -> Result<Expectation> {
        let compile = |template: &Option<String>| -> Result<Option<Regex>> {
            template
                .as_deref()
                .map(|template| {
                    let pattern = resolve::resolve_pattern(template, snapshot)?;
                    Regex::new(&pattern).map_err(|e| {
                        HarnessError::invalid_case(&self.id, format!("bad pattern `{pattern}`: {e}"))
                    })
                })
                .transpose()
        };

        Ok(Expectation {
            exit_code: self.expected_exit_code,
            stderr: compile(&self.expected_stderr_pattern)?,
            stdout: compile(&self.expected_stdout_pattern)?,
            fail_on_crash: self.fail_on_crash,
        })
    }
}
