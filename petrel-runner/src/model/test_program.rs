// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    config::RunnerConfig,
    errors::RunError,
    interface::TestInterface,
    model::{TestCase, TestCaseId},
};
use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::OnceCell;
use tracing::warn;

/// Name given to the fake test case synthesized when a program's case list
/// cannot be enumerated.
const LIST_FAILURE_CASE: &str = "__test_cases_list__";

/// A test program: a binary within a test suite that contains one or more
/// test cases.
///
/// The case list is loaded lazily on first request by invoking the
/// program's list operation, and memoized for the lifetime of the program.
/// Test cases do not hold a back-reference to their program; callers pass
/// the `(program, case)` pair to the executor, which keeps the ownership
/// graph acyclic.
#[derive(Debug)]
pub struct TestProgram {
    interface: TestInterface,
    binary: Utf8PathBuf,
    root: Utf8PathBuf,
    test_suite: String,
    test_cases: OnceCell<Vec<TestCase>>,
}

impl TestProgram {
    /// Creates a test program whose case list will be loaded on demand.
    pub fn new(
        interface: TestInterface,
        binary: impl Into<Utf8PathBuf>,
        root: impl Into<Utf8PathBuf>,
        test_suite: impl Into<String>,
    ) -> Self {
        Self {
            interface,
            binary: binary.into(),
            root: root.into(),
            test_suite: test_suite.into(),
            test_cases: OnceCell::new(),
        }
    }

    /// Creates a test program with an eagerly provided case list.
    pub fn with_test_cases(
        interface: TestInterface,
        binary: impl Into<Utf8PathBuf>,
        root: impl Into<Utf8PathBuf>,
        test_suite: impl Into<String>,
        test_cases: Vec<TestCase>,
    ) -> Self {
        Self {
            interface,
            binary: binary.into(),
            root: root.into(),
            test_suite: test_suite.into(),
            test_cases: OnceCell::new_with(Some(test_cases)),
        }
    }

    /// The convention this program follows.
    pub fn interface(&self) -> TestInterface {
        self.interface
    }

    /// The program's path relative to the test-suite root.
    pub fn binary(&self) -> &Utf8Path {
        &self.binary
    }

    /// The root of the test suite containing the program.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// The name of the test suite this program belongs to.
    pub fn test_suite(&self) -> &str {
        &self.test_suite
    }

    /// The absolute path to the program's binary.
    pub fn absolute_path(&self) -> Utf8PathBuf {
        if self.binary.is_absolute() {
            self.binary.clone()
        } else {
            self.root.join(&self.binary)
        }
    }

    /// The identifier of one of this program's test cases.
    pub fn case_id(&self, test_case: &TestCase) -> TestCaseId {
        TestCaseId::new(self.binary.clone(), test_case.name())
    }

    /// The program's test cases, enumerating them on first call.
    ///
    /// Enumeration failures do not abort the run: they synthesize a single
    /// fake test case carrying a broken result, so the failure is reported
    /// through the normal result channel. Interruptions and signal-setup
    /// failures still propagate as errors.
    pub async fn test_cases(&self, config: &RunnerConfig) -> Result<&[TestCase], RunError> {
        let cases = self
            .test_cases
            .get_or_try_init(|| async {
                match self.interface.list_test_cases(self, config).await {
                    Ok(cases) => Ok(cases),
                    Err(err @ (RunError::Interrupted(_) | RunError::SignalSetup(_))) => Err(err),
                    Err(err) => {
                        warn!(program = %self.binary, "failed to list test cases: {err}");
                        Ok(vec![TestCase::new_fake(
                            LIST_FAILURE_CASE,
                            "Represents the failure to load the test case list",
                            crate::model::TestResult::Broken(format!(
                                "Failed to load the list of test cases: {err}"
                            )),
                        )])
                    }
                }
            })
            .await?;
        Ok(cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestMetadata;

    #[test]
    fn absolute_path_joins_relative_binaries() {
        let program = TestProgram::new(TestInterface::Plain, "bin/t_cp", "/suite", "coreutils");
        assert_eq!(program.absolute_path(), Utf8PathBuf::from("/suite/bin/t_cp"));
    }

    #[test]
    fn absolute_path_keeps_absolute_binaries() {
        let program = TestProgram::new(TestInterface::Plain, "/opt/t_cp", "/suite", "coreutils");
        assert_eq!(program.absolute_path(), Utf8PathBuf::from("/opt/t_cp"));
    }

    #[test]
    fn case_id_uses_relative_binary() {
        let program = TestProgram::new(TestInterface::Atf, "bin/t_fs", "/suite", "fs");
        let case = TestCase::new("mkdir_ok", TestMetadata::default());
        assert_eq!(program.case_id(&case).to_string(), "bin/t_fs:mkdir_ok");
    }

    #[tokio::test]
    async fn eager_case_list_is_returned_as_is() {
        let program = TestProgram::with_test_cases(
            TestInterface::Plain,
            "bin/t_cp",
            "/suite",
            "coreutils",
            vec![TestCase::new("main", TestMetadata::default())],
        );
        let config = RunnerConfig::default();
        let cases = program.test_cases(&config).await.unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name(), "main");
    }
}
