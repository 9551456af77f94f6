// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{EventBus, TestCorrelationUuid, TestEventKind, TestStatusMessage};
use crate::{
    stopwatch::{StopwatchStart, stopwatch},
    target::BuildTarget,
    test_results::{TestCaseSummary, TestResultSummary},
};
use std::{
    collections::{HashMap, hash_map::Entry},
    sync::{Mutex, MutexGuard},
};
use tracing::debug;

/// Notifications sent by a rule's steps while its tests run.
///
/// Rules that support streaming call these as their tests run. For other rules, the runner calls
/// them once the final results are known.
pub trait TestReportingCallback: Send + Sync {
    /// The rule's tests began.
    fn tests_did_begin(&self);

    /// A status message was opened. At most one status message may be open at a time.
    fn status_did_begin(&self, message: TestStatusMessage);

    /// The open status message was closed.
    fn status_did_end(&self, message: TestStatusMessage);

    /// An individual test began.
    fn test_did_begin(&self, test_case_name: &str, test_name: &str);

    /// An individual test ended. It must have begun earlier.
    fn test_did_end(&self, summary: &TestResultSummary);

    /// The rule's tests ended.
    fn tests_did_end(&self, test_cases: &[TestCaseSummary]);
}

/// Pairs begin and end notifications for one test run into timed events.
///
/// The notification protocol is checked as it's followed. Violations are bugs in the execution
/// layer, and panic:
///
/// * opening a status message while another is open;
/// * closing a status message when none is open;
/// * beginning a test that has already begun and not ended;
/// * ending a test that hasn't begun.
#[derive(Debug)]
pub struct StatusEventCorrelator {
    target: BuildTarget,
    bus: EventBus,
    state: Mutex<CorrelatorState>,
}

#[derive(Debug, Default)]
struct CorrelatorState {
    status: StatusSlot,
    open_tests: HashMap<TestKey, OpenTest>,
}

#[derive(Debug, Default)]
enum StatusSlot {
    #[default]
    Idle,
    MessageOpen {
        started: TestStatusMessage,
        stopwatch: StopwatchStart,
    },
}

#[derive(Debug, Eq, PartialEq, Hash)]
struct TestKey {
    test_case_name: String,
    test_name: String,
}

impl TestKey {
    fn new(test_case_name: &str, test_name: &str) -> Self {
        Self {
            test_case_name: test_case_name.to_owned(),
            test_name: test_name.to_owned(),
        }
    }
}

#[derive(Debug)]
struct OpenTest {
    id: TestCorrelationUuid,
    stopwatch: StopwatchStart,
}

impl StatusEventCorrelator {
    /// Creates a new correlator for `target`, posting events to `bus`.
    pub fn new(target: BuildTarget, bus: EventBus) -> Self {
        Self {
            target,
            bus,
            state: Mutex::new(CorrelatorState::default()),
        }
    }

    /// Returns the number of tests that have begun but not ended.
    pub fn open_test_count(&self) -> usize {
        self.lock_state().open_tests.len()
    }

    /// Returns true if a status message is currently open.
    pub fn is_status_open(&self) -> bool {
        matches!(self.lock_state().status, StatusSlot::MessageOpen { .. })
    }

    fn lock_state(&self) -> MutexGuard<'_, CorrelatorState> {
        // A poisoned lock means a protocol violation already panicked. The state is still
        // consistent since every transition is a single assignment.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TestReportingCallback for StatusEventCorrelator {
    fn tests_did_begin(&self) {
        debug!(target = %self.target, "tests began");
    }

    fn status_did_begin(&self, message: TestStatusMessage) {
        debug!(target = %self.target, message = %message.message, "status did begin");
        let mut state = self.lock_state();
        if let StatusSlot::MessageOpen { started, .. } = &state.status {
            panic!(
                "illegal state transition for {}: received begin status `{}` \
                 while status `{}` was open",
                self.target, message.message, started.message,
            )
        }
        state.status = StatusSlot::MessageOpen {
            started: message.clone(),
            stopwatch: stopwatch(),
        };
        drop(state);

        self.bus.post(TestEventKind::StatusMessageStarted {
            target: self.target.clone(),
            message,
        });
    }

    fn status_did_end(&self, message: TestStatusMessage) {
        debug!(target = %self.target, message = %message.message, "status did end");
        let previous = std::mem::take(&mut self.lock_state().status);
        match previous {
            StatusSlot::MessageOpen { started, stopwatch } => {
                self.bus.post(TestEventKind::StatusMessageFinished {
                    target: self.target.clone(),
                    started,
                    finished: message,
                    elapsed: stopwatch.elapsed(),
                });
            }
            StatusSlot::Idle => {
                panic!(
                    "illegal state transition for {}: received end status `{}` \
                     with no status open",
                    self.target, message.message,
                )
            }
        }
    }

    fn test_did_begin(&self, test_case_name: &str, test_name: &str) {
        debug!(target = %self.target, test_case_name, test_name, "test began");
        let id = TestCorrelationUuid::new_v4();
        match self
            .lock_state()
            .open_tests
            .entry(TestKey::new(test_case_name, test_name))
        {
            Entry::Vacant(entry) => {
                entry.insert(OpenTest {
                    id,
                    stopwatch: stopwatch(),
                });
            }
            Entry::Occupied(_) => {
                panic!(
                    "illegal state transition for {}: test {test_case_name}:{test_name} \
                     began twice without ending",
                    self.target,
                )
            }
        }

        self.bus.post(TestEventKind::TestCaseStarted {
            target: self.target.clone(),
            id,
            test_case_name: test_case_name.to_owned(),
            test_name: test_name.to_owned(),
        });
    }

    fn test_did_end(&self, summary: &TestResultSummary) {
        debug!(
            target = %self.target,
            test_case_name = %summary.test_case_name,
            test_name = %summary.test_name,
            result = %summary.result_type,
            "test ended",
        );
        let key = TestKey::new(&summary.test_case_name, &summary.test_name);
        let open = self.lock_state().open_tests.remove(&key);
        let Some(open) = open else {
            panic!(
                "illegal state transition for {}: test {}:{} ended without beginning",
                self.target, summary.test_case_name, summary.test_name,
            )
        };

        self.bus.post(TestEventKind::TestCaseFinished {
            target: self.target.clone(),
            id: open.id,
            summary: summary.clone(),
            elapsed: open.stopwatch.elapsed(),
        });
    }

    fn tests_did_end(&self, test_cases: &[TestCaseSummary]) {
        debug!(
            target = %self.target,
            test_cases = test_cases.len(),
            "tests ended",
        );
    }
}
