// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::ReportingInfo;
use crate::{
    errors::{DisplayErrorChain, ExecutionError},
    reporter::{EventBus, TestEventKind, TestReportingCallback},
    rule::TestResultsFn,
    test_results::{ResultType, TestCaseSummary, TestResultSummary, TestResults},
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};
use tracing::{debug, warn};

/// Hands out sequence numbers in the order results resolve, starting at 1.
#[derive(Clone, Debug, Default)]
pub struct SequenceCounter(Arc<AtomicU32>);

impl SequenceCounter {
    /// Creates a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next sequence number.
    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// State shared by both phases of a run.
#[derive(Clone, Debug)]
pub struct RunContext {
    bus: EventBus,
    sequence: SequenceCounter,
    total_number_of_tests: usize,
}

impl RunContext {
    /// Creates a new run context for a run of `total_number_of_tests` targets.
    pub fn new(bus: EventBus, total_number_of_tests: usize) -> Self {
        Self {
            bus,
            sequence: SequenceCounter::new(),
            total_number_of_tests,
        }
    }
}

/// Marks results as replayed from a previous run if the tests didn't need to run.
pub fn caching_status_transforming(run_required: bool, results_fn: TestResultsFn) -> TestResultsFn {
    if run_required {
        return results_fn;
    }
    results_fn.map(|mut results| {
        results.test_cases = results
            .test_cases
            .iter()
            .map(TestCaseSummary::to_cached)
            .collect();
        results
    })
}

/// Turns the outcome of a test run into well-formed, sequenced results.
///
/// * For rules that don't stream, test events are synthesized from the final results.
/// * An execution error becomes a single failing result named after the target.
/// * The results are stamped with the next sequence number and the run's total, then published
///   as [`TestEventKind::TargetFinished`].
pub fn transform_test_results(
    cx: &RunContext,
    reporting: &ReportingInfo,
    res: Result<TestResults, ExecutionError>,
) -> TestResults {
    let results = match res {
        Ok(results) => results,
        Err(error) => {
            warn!(
                target = %reporting.target,
                "test run failed: {}",
                DisplayErrorChain::new(&error),
            );
            failure_results(reporting, &error)
        }
    };

    if !reporting.supports_streaming_tests {
        report_summary(&**reporting.callback, &results.test_cases);
    }

    let sequence_number = cx.sequence.next();
    debug!(target = %reporting.target, sequence_number, "test results resolved");
    let results = results.with_sequence(sequence_number, cx.total_number_of_tests);
    cx.bus.post(TestEventKind::TargetFinished {
        results: results.clone(),
    });
    results
}

fn failure_results(reporting: &ReportingInfo, error: &ExecutionError) -> TestResults {
    let name = reporting.target.as_str();
    let mut result = TestResultSummary::new(name, name, ResultType::Failure, Duration::ZERO);
    result.message = Some(error.to_string());
    result.stack_trace = Some(DisplayErrorChain::new(error).to_string());

    TestResults::new(
        reporting.target.clone(),
        vec![TestCaseSummary::new(name, vec![result])],
        reporting.contacts.clone(),
        reporting.labels.clone(),
    )
}

fn report_summary(callback: &dyn TestReportingCallback, test_cases: &[TestCaseSummary]) {
    callback.tests_did_begin();
    for case in test_cases {
        for result in &case.results {
            callback.test_did_begin(&result.test_case_name, &result.test_name);
            callback.test_did_end(result);
        }
    }
    callback.tests_did_end(test_cases);
}
