// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stopwatch for tracking how long runs, steps and individual tests take.
//!
//! A stopwatch records both a `DateTime` (realtime clock, for display) and an `Instant` (monotonic
//! clock, for durations).

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart::new()
}

/// The start state of a stopwatch.
#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<Local>,
    instant: Instant,
}

impl StopwatchStart {
    fn new() -> Self {
        Self {
            start_time: Local::now(),
            instant: Instant::now(),
        }
    }

    pub(crate) fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }
}
