// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test-case execution: isolation, supervision and orchestration.

mod executor;
pub(crate) mod isolation;
pub(crate) mod supervisor;
pub(crate) mod workdir;

pub use executor::{ExecutionSummary, Executor};
