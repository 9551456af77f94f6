// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunContext, transform_test_results};
use crate::{
    reporter::TestReportingCallback,
    rule::{TestResultsFn, TestRule},
    step::{Step, StepRunner},
    target::BuildTarget,
    test_results::TestResults,
};
use debug_ignore::DebugIgnore;
use futures::future::BoxFuture;
use std::{collections::BTreeSet, sync::Arc};

/// Everything needed to run the tests for one target, or to replay their cached results.
///
/// Created once per target per invocation. A `TestRun` is consumed by the pipeline when it's
/// scheduled.
#[derive(Debug)]
pub struct TestRun {
    steps: Vec<Box<dyn Step>>,
    results_fn: TestResultsFn,
    reporting: ReportingInfo,
    run_separately: bool,
}

impl TestRun {
    /// Creates a new test run for `rule`.
    ///
    /// `steps` is empty if the results are replayed from a previous run.
    pub fn new(
        rule: &dyn TestRule,
        steps: Vec<Box<dyn Step>>,
        results_fn: TestResultsFn,
        callback: Arc<dyn TestReportingCallback>,
    ) -> Self {
        Self {
            steps,
            results_fn,
            reporting: ReportingInfo {
                target: rule.target().clone(),
                contacts: rule.contacts().clone(),
                labels: rule.labels().clone(),
                supports_streaming_tests: rule.supports_streaming_tests(),
                callback: DebugIgnore(callback),
            },
            run_separately: rule.run_test_separately(),
        }
    }

    /// Returns the target this run is for.
    pub fn target(&self) -> &BuildTarget {
        &self.reporting.target
    }

    /// Returns the number of steps this run will execute.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if this run must not run alongside any other.
    pub fn run_separately(&self) -> bool {
        self.run_separately
    }

    /// Returns a future that runs the steps, then transforms the results.
    ///
    /// The future never fails: execution errors are turned into failing results.
    pub(crate) fn execute(
        self,
        step_runner: &dyn StepRunner,
        cx: RunContext,
    ) -> BoxFuture<'static, TestResults> {
        let Self {
            steps,
            results_fn,
            reporting,
            ..
        } = self;
        let fut =
            step_runner.run_steps_and_yield_result(steps, results_fn, reporting.target.clone());
        Box::pin(async move {
            let res = fut.await;
            transform_test_results(&cx, &reporting, res)
        })
    }
}

/// The parts of a rule needed to report its results.
#[derive(Debug)]
pub struct ReportingInfo {
    /// The target.
    pub target: BuildTarget,

    /// People to contact about failures.
    pub contacts: BTreeSet<String>,

    /// Labels attached to the rule.
    pub labels: BTreeSet<String>,

    /// True if the rule's steps report test events themselves.
    pub supports_streaming_tests: bool,

    /// The callback events are reported through.
    pub callback: DebugIgnore<Arc<dyn TestReportingCallback>>,
}
