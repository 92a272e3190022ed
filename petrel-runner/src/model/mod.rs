// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The data model for test suites: programs, cases, metadata and results.

mod metadata;
mod result;
mod test_case;
mod test_program;

pub use metadata::{
    InvalidRequiredUser, MetadataBuilder, RequiredUser, TestMetadata, DEFAULT_TIMEOUT,
};
pub use result::{ExitStatus, TestResult};
pub use test_case::{TestCase, TestCaseId};
pub use test_program::TestProgram;
