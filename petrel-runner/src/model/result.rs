// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Externally visible test results and child termination statuses.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The caller-visible classification of a test-case execution.
///
/// This is the narrow, external taxonomy: the finer-grained "expected"
/// variants tracked internally by the result parser are coalesced into
/// [`TestResult::ExpectedFailure`] when a result is externalized.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case", tag = "result", content = "reason")]
pub enum TestResult {
    /// The test ran to completion and succeeded.
    Passed,
    /// The test reported a failure.
    Failed(String),
    /// The test was not run, with the reason why.
    Skipped(String),
    /// The test failed in a way it had declared it would.
    ExpectedFailure(String),
    /// The test misbehaved: what it declared and what happened disagree.
    Broken(String),
}

impl TestResult {
    /// Whether the result denotes an acceptable outcome.
    ///
    /// Skips and expected failures count as good: the test suite as a whole
    /// is not invalidated by them.
    pub fn good(&self) -> bool {
        match self {
            TestResult::Passed | TestResult::Skipped(_) | TestResult::ExpectedFailure(_) => true,
            TestResult::Failed(_) | TestResult::Broken(_) => false,
        }
    }

    /// The human-readable reason attached to the result; empty for a pass.
    pub fn reason(&self) -> &str {
        match self {
            TestResult::Passed => "",
            TestResult::Failed(reason)
            | TestResult::Skipped(reason)
            | TestResult::ExpectedFailure(reason)
            | TestResult::Broken(reason) => reason,
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TestResult::Passed => f.write_str("passed"),
            TestResult::Failed(reason) => write!(f, "failed: {reason}"),
            TestResult::Skipped(reason) => write!(f, "skipped: {reason}"),
            TestResult::ExpectedFailure(reason) => write!(f, "expected_failure: {reason}"),
            TestResult::Broken(reason) => write!(f, "broken: {reason}"),
        }
    }
}

/// How a child process terminated.
///
/// The supervisor reports `Option<ExitStatus>`, with `None` standing for a
/// timed-out child that had to be killed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitStatus {
    /// The process exited on its own with the given code.
    Exited(i32),
    /// The process was terminated by a signal.
    Signaled {
        /// Number of the terminating signal.
        signal: i32,
        /// Whether the kernel produced a core dump.
        core_dumped: bool,
    },
    /// The wait status was neither a clean exit nor a termination signal.
    Unknown,
}

impl ExitStatus {
    /// Whether this status is a clean exit with code 0.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;

        if let Some(code) = status.code() {
            ExitStatus::Exited(code)
        } else if let Some(signal) = status.signal() {
            ExitStatus::Signaled {
                signal,
                core_dumped: status.core_dumped(),
            }
        } else {
            ExitStatus::Unknown
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exited with code {code}"),
            ExitStatus::Signaled {
                signal,
                core_dumped,
            } => {
                write!(f, "received signal {signal}")?;
                if *core_dumped {
                    f.write_str(" (core dumped)")?;
                }
                Ok(())
            }
            ExitStatus::Unknown => f.write_str("terminated in an unknown manner"),
        }
    }
}
