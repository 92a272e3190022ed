// Copyright (c) The petrel Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for timing test-case executions.
//!
//! Executions are stamped with a realtime start (`SystemTime` via chrono)
//! and measured with a monotonic clock, so the reported duration is immune
//! to wall-clock adjustments made while a test runs.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// A running stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            // The two clock reads happen imperceptibly close to each other,
            // which is good enough for stamping test runs.
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

/// A snapshot of a stopwatch at a point in time.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<Local>,
    pub(crate) duration: Duration,
}

impl StopwatchSnapshot {
    pub(crate) fn end_time(&self) -> DateTime<Local> {
        self.start_time
            + chrono::Duration::from_std(self.duration).unwrap_or(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_measures_elapsed_time() {
        let start = stopwatch();
        std::thread::sleep(Duration::from_millis(50));
        let snapshot = start.snapshot();
        assert!(
            snapshot.duration >= Duration::from_millis(50),
            "expected at least 50ms elapsed, got {:?}",
            snapshot.duration
        );
        assert!(snapshot.end_time() >= snapshot.start_time);
    }
}
