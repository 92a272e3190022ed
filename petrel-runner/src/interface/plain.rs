// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `plain` interface adapter.
//!
//! A plain test program is any binary whose exit status alone determines
//! success or failure. It exposes exactly one test case, takes no
//! arguments, writes no result file, and has no cleanup phase.

use crate::model::{ExitStatus, TestCase, TestMetadata, TestResult};

/// The name of the single test case every plain program exposes.
const MAIN_CASE: &str = "main";

pub(super) fn list_test_cases() -> Vec<TestCase> {
    vec![TestCase::new(MAIN_CASE, TestMetadata::default())]
}

/// Derives the result from the termination status alone.
pub(super) fn compute_result(status: Option<&ExitStatus>) -> TestResult {
    match status {
        None => TestResult::Broken("Test case timed out".to_owned()),
        Some(ExitStatus::Exited(0)) => TestResult::Passed,
        Some(ExitStatus::Exited(code)) => {
            TestResult::Failed(format!("Returned non-success exit status {code}"))
        }
        Some(ExitStatus::Signaled { signal, .. }) => {
            TestResult::Broken(format!("Received signal {signal}"))
        }
        Some(ExitStatus::Unknown) => {
            TestResult::Broken("Terminated in an unknown manner".to_owned())
        }
    }
}
