// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::model::{TestMetadata, TestResult};
use camino::Utf8PathBuf;
use std::fmt;

/// The stable identifier of a test case within a run.
///
/// The pair orders lexicographically: first by program path, then by case
/// name.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TestCaseId {
    program: Utf8PathBuf,
    name: String,
}

impl TestCaseId {
    /// Creates an identifier from a test-suite-relative program path and a
    /// case name.
    pub fn new(program: impl Into<Utf8PathBuf>, name: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            name: name.into(),
        }
    }

    /// The test program's path, relative to the test-suite root.
    pub fn program(&self) -> &Utf8PathBuf {
        &self.program
    }

    /// The name of the test case within its program.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.program, self.name)
    }
}

/// A single test case: a name, its metadata, and optionally a pre-recorded
/// result.
///
/// Fake test cases (name of the form `__name__`) stand in for programs
/// whose case list could not be enumerated; executing one returns the
/// recorded result without spawning anything.
#[derive(Clone, Debug)]
pub struct TestCase {
    name: String,
    metadata: TestMetadata,
    fake_result: Option<TestResult>,
}

impl TestCase {
    /// Creates a regular test case.
    pub fn new(name: impl Into<String>, metadata: TestMetadata) -> Self {
        Self {
            name: name.into(),
            metadata,
            fake_result: None,
        }
    }

    /// Creates a fake test case that yields `result` when executed.
    ///
    /// The name must be of the `__name__` form so fake cases are
    /// recognizable in reports.
    pub fn new_fake(
        name: impl Into<String>,
        description: impl Into<String>,
        result: TestResult,
    ) -> Self {
        let name = name.into();
        debug_assert!(
            name.len() > 4 && name.starts_with("__") && name.ends_with("__"),
            "fake test case names must be wrapped in '__'"
        );
        let mut builder = TestMetadata::builder();
        builder.set_description(description);
        Self {
            name,
            metadata: builder.build(),
            fake_result: Some(result),
        }
    }

    /// The name of the test case.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The metadata declared by the test case.
    pub fn metadata(&self) -> &TestMetadata {
        &self.metadata
    }

    /// The pre-recorded result, if this is a fake test case.
    pub fn fake_result(&self) -> Option<&TestResult> {
        self.fake_result.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_orders_by_program_then_name() {
        let a = TestCaseId::new("suite/first", "zz");
        let b = TestCaseId::new("suite/second", "aa");
        let c = TestCaseId::new("suite/second", "bb");
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn id_display() {
        let id = TestCaseId::new("bin/fs_test", "mkdir_ok");
        assert_eq!(id.to_string(), "bin/fs_test:mkdir_ok");
    }

    #[test]
    fn fake_case_carries_result() {
        let case = TestCase::new_fake(
            "__list__",
            "stand-in",
            TestResult::Broken("cannot list".into()),
        );
        assert_eq!(
            case.fake_result(),
            Some(&TestResult::Broken("cannot list".into()))
        );
        assert_eq!(case.metadata().description(), "stand-in");
    }
}
