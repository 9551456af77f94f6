// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    aggregator::RunOutcome,
    target::BuildTarget,
    test_results::{TestResultSummary, TestResults},
};
use chrono::{DateTime, Local};
use newtype_uuid::{TypedUuid, TypedUuidKind, TypedUuidTag};
use std::time::Duration;

/// The kind of UUID used to correlate the start and end of an individual test.
pub enum TestCorrelationKind {}

impl TypedUuidKind for TestCorrelationKind {
    fn tag() -> TypedUuidTag {
        const TAG: TypedUuidTag = TypedUuidTag::new("test_correlation");
        TAG
    }
}

/// A UUID that ties [`TestEventKind::TestCaseStarted`] to the matching
/// [`TestEventKind::TestCaseFinished`].
pub type TestCorrelationUuid = TypedUuid<TestCorrelationKind>;

/// A test event.
///
/// Events are posted to an [`EventBus`](super::EventBus) as the run progresses. Posting never
/// blocks, and nothing waits for events to be consumed.
#[derive(Clone, Debug)]
pub struct TestEvent {
    /// The time at which the event was generated.
    pub timestamp: DateTime<Local>,

    /// The amount of time elapsed since the event bus was created.
    pub elapsed: Duration,

    /// The kind of test event this is.
    pub kind: TestEventKind,
}

/// A status message reported by a test rule while its tests run, for example "starting emulator".
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestStatusMessage {
    /// The text of the message.
    pub message: String,

    /// When the message was reported.
    pub timestamp: DateTime<Local>,
}

impl TestStatusMessage {
    /// Creates a new status message timestamped now.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timestamp: Local::now(),
        }
    }
}

/// The kind of test event this is.
///
/// Forms part of [`TestEvent`].
#[derive(Clone, Debug)]
pub enum TestEventKind {
    /// The test run started.
    RunStarted {
        /// Every target in the run, in input order.
        targets: Vec<BuildTarget>,

        /// True if every test is being run.
        run_all_tests: bool,

        /// The test selectors in effect.
        test_selectors: Vec<String>,
    },

    /// A target's tests were scheduled to be executed rather than replayed.
    ///
    /// This is posted while runs are prepared, before the pipeline starts. Runs in the serial
    /// group may begin executing long after this event.
    TargetStarted {
        /// The target.
        target: BuildTarget,
    },

    /// The steps for a target started running.
    StepsStarted {
        /// The target.
        target: BuildTarget,

        /// The number of steps. Zero if results are being replayed.
        step_count: usize,
    },

    /// The steps for a target finished running, successfully or not.
    StepsFinished {
        /// The target.
        target: BuildTarget,
    },

    /// A status message was opened.
    StatusMessageStarted {
        /// The target that reported the message.
        target: BuildTarget,

        /// The message.
        message: TestStatusMessage,
    },

    /// The open status message was closed.
    StatusMessageFinished {
        /// The target that reported the message.
        target: BuildTarget,

        /// The message that opened the status.
        started: TestStatusMessage,

        /// The message that closed the status.
        finished: TestStatusMessage,

        /// How long the status was open.
        elapsed: Duration,
    },

    /// An individual test started.
    TestCaseStarted {
        /// The target the test belongs to.
        target: BuildTarget,

        /// The UUID correlating this event with the matching `TestCaseFinished`.
        id: TestCorrelationUuid,

        /// The name of the test case.
        test_case_name: String,

        /// The name of the test.
        test_name: String,
    },

    /// An individual test finished.
    TestCaseFinished {
        /// The target the test belongs to.
        target: BuildTarget,

        /// The UUID correlating this event with the matching `TestCaseStarted`.
        id: TestCorrelationUuid,

        /// The result of the test.
        summary: TestResultSummary,

        /// How long it took between the start and finish notifications.
        elapsed: Duration,
    },

    /// A target's results resolved, with their sequence number assigned.
    TargetFinished {
        /// The results.
        results: TestResults,
    },

    /// The test run finished.
    RunFinished {
        /// Every result, parallel group first, then the serial group in input order.
        results: Vec<TestResults>,

        /// The outcome of the run.
        outcome: RunOutcome,
    },
}
