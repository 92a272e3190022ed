// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `atf` interface adapter.
//!
//! ATF-style test programs speak three dialects of one CLI: `-l` prints a
//! typed metadata stream describing every test case; `-r <file> ... <case>`
//! runs a body and makes it write its outcome to the result file; and
//! `... <case>:cleanup` runs the optional cleanup routine. This module owns
//! argv construction for all three, the list-output parser, and the
//! derivation of a final result from the result file plus the child's
//! termination status.

use crate::{
    config::RunnerConfig,
    errors::{ListParseError, RunError},
    model::{ExitStatus, MetadataBuilder, RequiredUser, TestCase, TestMetadata, TestProgram,
            TestResult, DEFAULT_TIMEOUT},
    results,
    runner::supervisor::{self, OutputSpec, SpawnSpec},
    runner::workdir::WorkDirectory,
    signal::InterruptShield,
};
use bytesize::ByteSize;
use camino::Utf8Path;
use std::collections::BTreeMap;
use tracing::debug;

/// Name of the result file within the control directory.
pub(crate) const RESULT_FILE: &str = "result.txt";

/// Header identifying the test-case list format.
const LIST_HEADER: &str = "Content-Type: application/X-atf-tp; version=\"1\"";

/// Environment variable ATF test programs use to detect that a runner is
/// driving them.
const RUNNER_COOKIE_VAR: &str = "__RUNNING_INSIDE_ATF_RUN";
const RUNNER_COOKIE_VALUE: &str = "internal-yes-value";

pub(super) fn child_env() -> Vec<(String, String)> {
    vec![(RUNNER_COOKIE_VAR.to_owned(), RUNNER_COOKIE_VALUE.to_owned())]
}

/// Shared `-s`/`-v` argument prefix of the run and cleanup dialects.
fn common_args(program: &TestProgram, config: &RunnerConfig) -> Vec<String> {
    let srcdir = program
        .absolute_path()
        .parent()
        .map(Utf8Path::to_owned)
        .unwrap_or_else(|| program.root().to_owned());

    let mut args = vec![format!("-s{srcdir}")];
    for (name, value) in config.suite_vars(program.test_suite()) {
        args.push(format!("-v{name}={value}"));
    }
    args
}

pub(super) fn body_args(
    program: &TestProgram,
    test_case: &TestCase,
    config: &RunnerConfig,
    result_file: &Utf8Path,
) -> Vec<String> {
    let mut args = vec![format!("-r{result_file}")];
    args.extend(common_args(program, config));
    args.push(test_case.name().to_owned());
    args
}

pub(super) fn cleanup_args(
    program: &TestProgram,
    test_case: &TestCase,
    config: &RunnerConfig,
) -> Vec<String> {
    let mut args = common_args(program, config);
    args.push(format!("{}:cleanup", test_case.name()));
    args
}

/// Derives the body's result from the result file and termination status.
///
/// A missing result file is judged by the exit evidence alone: a timeout
/// stays a timeout, anything else is a premature exit. Otherwise the file
/// is parsed and reconciled the usual way.
pub(super) fn compute_result(status: Option<&ExitStatus>, result_file: &Utf8Path) -> TestResult {
    if !result_file.exists() {
        return match status {
            None => TestResult::Broken("Test case body timed out".to_owned()),
            Some(status) => TestResult::Broken(format!("Premature exit: {status}")),
        };
    }

    let raw = results::load(result_file);
    let raw = results::reconcile(raw, status, status.is_none());
    raw.externalize()
}

/// Invokes the program's list operation and parses its output.
pub(super) async fn list_test_cases(
    program: &TestProgram,
    config: &RunnerConfig,
) -> Result<Vec<TestCase>, RunError> {
    debug!(program = %program.binary(), "listing atf test cases");

    let workdir = WorkDirectory::new().map_err(RunError::Workdir)?;
    let mut shield = InterruptShield::new()?;
    let child = supervisor::spawn(SpawnSpec {
        program: program.absolute_path(),
        args: vec!["-l".to_owned()],
        work_directory: workdir.work().to_owned(),
        env: child_env(),
        output: OutputSpec::Piped,
    })?;
    let (status, output) = child.wait_with_output(DEFAULT_TIMEOUT, &mut shield).await?;

    match status {
        Some(ExitStatus::Exited(0)) => {}
        Some(status) => {
            return Err(ListParseError::new(format!(
                "Test program did not exit cleanly: {status}"
            ))
            .into());
        }
        None => {
            return Err(
                ListParseError::new("Test program timed out while listing test cases").into(),
            );
        }
    }

    Ok(parse_test_list(&output.stdout)?)
}

/// Splits a `name: value` property line.
fn split_prop_line(line: &str) -> Result<(&str, &str), ListParseError> {
    line.split_once(": ").ok_or_else(|| {
        ListParseError::new("Invalid property line; expecting line of the form 'name: value'")
    })
}

/// Reads consecutive property lines until a blank line or the end of the
/// input; neither terminator is an error.
fn parse_properties<'a>(
    lines: &mut impl Iterator<Item = &'a str>,
) -> Result<BTreeMap<&'a str, &'a str>, ListParseError> {
    let mut properties = BTreeMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = split_prop_line(line)?;
        if properties.insert(name, value).is_some() {
            return Err(ListParseError::new(format!(
                "Duplicate value for property {name}"
            )));
        }
    }
    Ok(properties)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ListParseError> {
    match value {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(ListParseError::new(format!(
            "Invalid boolean value '{value}' for property '{name}'"
        ))),
    }
}

fn parse_seconds(name: &str, value: &str) -> Result<u64, ListParseError> {
    value.parse().map_err(|_| {
        ListParseError::new(format!(
            "Invalid numeric value '{value}' for property '{name}'"
        ))
    })
}

fn parse_bytes(name: &str, value: &str) -> Result<u64, ListParseError> {
    value
        .parse::<ByteSize>()
        .map(|size| size.as_u64())
        .map_err(|_| {
            ListParseError::new(format!(
                "Invalid bytes value '{value}' for property '{name}'"
            ))
        })
}

/// Splits a whitespace-separated list property, rejecting empty lists.
fn parse_list<'a>(name: &str, value: &'a str) -> Result<Vec<&'a str>, ListParseError> {
    let words: Vec<_> = value.split_whitespace().collect();
    if words.is_empty() {
        return Err(ListParseError::new(format!(
            "Invalid empty value for property '{name}'"
        )));
    }
    Ok(words)
}

/// Builds a metadata record from one test case's raw properties.
fn parse_metadata(properties: &BTreeMap<&str, &str>) -> Result<TestMetadata, ListParseError> {
    let mut builder = MetadataBuilder::new();

    for (&name, &value) in properties {
        match name {
            "descr" => {
                builder.set_description(value);
            }
            "has.cleanup" => {
                builder.set_has_cleanup(parse_bool(name, value)?);
            }
            "require.arch" => {
                for arch in parse_list(name, value)? {
                    builder.add_allowed_architecture(arch);
                }
            }
            "require.config" => {
                for var in parse_list(name, value)? {
                    builder.add_required_config(var);
                }
            }
            "require.files" => {
                for file in parse_list(name, value)? {
                    if !Utf8Path::new(file).is_absolute() {
                        return Err(ListParseError::new(format!(
                            "Relative path '{file}' not allowed in property '{name}'"
                        )));
                    }
                    builder.add_required_file(file);
                }
            }
            "require.machine" => {
                for platform in parse_list(name, value)? {
                    builder.add_allowed_platform(platform);
                }
            }
            "require.memory" => {
                builder.set_required_memory(parse_bytes(name, value)?);
            }
            "require.progs" => {
                for prog in parse_list(name, value)? {
                    builder.add_required_program(prog);
                }
            }
            "require.user" => {
                let user: RequiredUser = value.parse().map_err(|_| {
                    ListParseError::new(format!(
                        "Invalid user value '{value}' for property '{name}'"
                    ))
                })?;
                builder.set_required_user(user);
            }
            "timeout" => {
                builder.set_timeout(std::time::Duration::from_secs(parse_seconds(
                    name, value,
                )?));
            }
            _ if name.starts_with("X-") && name.len() > 2 => {
                builder.add_custom(name, value);
            }
            _ => {
                return Err(ListParseError::new(format!(
                    "Unknown test case metadata property '{name}'"
                )));
            }
        }
    }

    Ok(builder.build())
}

/// Parses the test-case list printed by an ATF test program.
pub(crate) fn parse_test_list(input: &str) -> Result<Vec<TestCase>, ListParseError> {
    let mut lines = input.lines();

    match lines.next() {
        Some(LIST_HEADER) => {}
        other => {
            return Err(ListParseError::new(format!(
                "Invalid header for test case list; expecting Content-Type for \
                 application/X-atf-tp version 1, got '{}'",
                other.unwrap_or("")
            )));
        }
    }
    match lines.next() {
        Some("") => {}
        other => {
            return Err(ListParseError::new(format!(
                "Invalid header for test case list; expecting a blank line, got '{}'",
                other.unwrap_or("")
            )));
        }
    }

    let mut test_cases = Vec::new();
    while let Some(line) = lines.next() {
        let (name, ident) = split_prop_line(line)?;
        if name != "ident" || ident.is_empty() {
            return Err(ListParseError::new(
                "Invalid test case definition; must be preceded by the identifier",
            ));
        }
        let properties = parse_properties(&mut lines)?;
        test_cases.push(TestCase::new(ident, parse_metadata(&properties)?));
    }

    if test_cases.is_empty() {
        return Err(ListParseError::new("No test cases"));
    }
    Ok(test_cases)
}
