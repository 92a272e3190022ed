// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time measurement helpers.

mod stopwatch;

pub(crate) use stopwatch::{stopwatch, StopwatchStart};
