// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test-program interface adapters.
//!
//! A test program follows one of a small, closed set of conventions. The
//! `atf` convention uses the single-line result-file protocol, a metadata
//! list operation and optional cleanup routines; the `plain` convention is
//! just "run the binary, look at the exit status". Everything
//! convention-specific (argv construction, result derivation, list
//! parsing) hangs off [`TestInterface`] so the executor stays generic.

mod atf;
mod plain;

use crate::{
    config::RunnerConfig,
    errors::RunError,
    model::{ExitStatus, TestCase, TestProgram, TestResult},
};
use camino::Utf8Path;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub(crate) use atf::RESULT_FILE;

/// The convention a test program follows.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TestInterface {
    /// Result-file protocol with metadata listing and cleanup support.
    Atf,
    /// Exit-status-only protocol; one test case per binary.
    Plain,
}

impl TestInterface {
    /// The canonical name of the interface.
    pub fn name(self) -> &'static str {
        match self {
            TestInterface::Atf => "atf",
            TestInterface::Plain => "plain",
        }
    }

    /// Whether programs with this interface can declare cleanup phases.
    pub fn supports_cleanup(self) -> bool {
        match self {
            TestInterface::Atf => true,
            TestInterface::Plain => false,
        }
    }

    /// The argv (excluding argv[0]) for running a test case's body.
    pub(crate) fn body_args(
        self,
        program: &TestProgram,
        test_case: &TestCase,
        config: &RunnerConfig,
        result_file: &Utf8Path,
    ) -> Vec<String> {
        match self {
            TestInterface::Atf => atf::body_args(program, test_case, config, result_file),
            TestInterface::Plain => Vec::new(),
        }
    }

    /// The argv (excluding argv[0]) for running a test case's cleanup, or
    /// `None` when the interface has no cleanup phase.
    pub(crate) fn cleanup_args(
        self,
        program: &TestProgram,
        test_case: &TestCase,
        config: &RunnerConfig,
    ) -> Option<Vec<String>> {
        match self {
            TestInterface::Atf => Some(atf::cleanup_args(program, test_case, config)),
            TestInterface::Plain => None,
        }
    }

    /// Extra environment variables the convention requires in the child.
    pub(crate) fn child_env(self) -> Vec<(String, String)> {
        match self {
            TestInterface::Atf => atf::child_env(),
            TestInterface::Plain => Vec::new(),
        }
    }

    /// Derives the body's externally visible result from its termination
    /// status and (for interfaces that use one) the result file.
    pub(crate) fn compute_result(
        self,
        status: Option<&ExitStatus>,
        result_file: &Utf8Path,
    ) -> TestResult {
        match self {
            TestInterface::Atf => atf::compute_result(status, result_file),
            TestInterface::Plain => plain::compute_result(status),
        }
    }

    /// Enumerates the test cases of a program by invoking its list
    /// operation.
    pub(crate) async fn list_test_cases(
        self,
        program: &TestProgram,
        config: &RunnerConfig,
    ) -> Result<Vec<TestCase>, RunError> {
        match self {
            TestInterface::Atf => atf::list_test_cases(program, config).await,
            TestInterface::Plain => Ok(plain::list_test_cases()),
        }
    }
}

impl fmt::Display for TestInterface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestInterface {
    type Err = UnknownInterface;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "atf" => Ok(TestInterface::Atf),
            "plain" => Ok(TestInterface::Plain),
            other => Err(UnknownInterface(other.to_owned())),
        }
    }
}

/// Error parsing a [`TestInterface`] name.
#[derive(Clone, Debug)]
pub struct UnknownInterface(String);

impl fmt::Display for UnknownInterface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unknown test interface '{}'", self.0)
    }
}

impl std::error::Error for UnknownInterface {}
