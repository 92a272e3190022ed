// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core runner library for petrel.
//!
//! This crate contains the execution engine used to run individual test
//! cases belonging to external test programs: process isolation, deadline
//! supervision, result-file adjudication, and work-directory management.
//! Front-ends (command-line drivers, manifest loaders, reporters) live
//! elsewhere and consume this crate through [`runner::Executor`].
//!
//! The engine is POSIX-only: process groups, signal dispositions and uid
//! checks are integral to how tests are isolated and torn down.

#![warn(missing_docs)]

#[cfg(not(unix))]
compile_error!("petrel-runner requires a Unix-like target");

pub mod config;
pub mod errors;
pub mod interface;
pub mod model;
pub mod reqs;
pub mod results;
pub mod runner;
mod signal;
mod time;

pub use crate::{
    config::RunnerConfig,
    interface::TestInterface,
    model::{TestCase, TestCaseId, TestMetadata, TestProgram, TestResult},
    runner::{ExecutionSummary, Executor},
};
