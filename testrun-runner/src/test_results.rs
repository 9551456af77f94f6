// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The results produced by running a test target.
//!
//! A [`TestResults`] is produced exactly once per test run: by actually executing the target's
//! tests, by replaying results cached from a previous run, or by turning an execution error into a
//! failing result.

use crate::{helpers::duration_millis, target::BuildTarget};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt, time::Duration};

/// The kind of result an individual test produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultType {
    /// The test passed.
    Success,

    /// The test failed.
    Failure,

    /// The test was skipped because one of its assumptions didn't hold.
    AssumptionViolation,

    /// The test is disabled in source.
    Disabled,

    /// The test was excluded by a test selector.
    Excluded,

    /// The test was not run because this is a dry run.
    DryRun,
}

impl ResultType {
    /// Returns true if this result counts as a failure.
    ///
    /// Only [`ResultType::Failure`] is a failure: skipped, disabled and excluded tests don't fail a
    /// run.
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failure)
    }

    /// Returns a short, uppercase label for this result type.
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "PASS",
            Self::Failure => "FAIL",
            Self::AssumptionViolation => "ASSUME",
            Self::Disabled => "DISABLED",
            Self::Excluded => "EXCLUDED",
            Self::DryRun => "DRYRUN",
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The result of a single test.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestResultSummary {
    /// The name of the test case (suite) this test belongs to.
    pub test_case_name: String,

    /// The name of the test.
    pub test_name: String,

    /// The kind of result.
    pub result_type: ResultType,

    /// How long the test took.
    #[serde(with = "duration_millis", rename = "time-ms")]
    pub time: Duration,

    /// The failure message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// The stack trace, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    /// Captured standard output, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,

    /// Captured standard error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl TestResultSummary {
    /// Creates a new summary with no message, stack trace or captured output.
    pub fn new(
        test_case_name: impl Into<String>,
        test_name: impl Into<String>,
        result_type: ResultType,
        time: Duration,
    ) -> Self {
        Self {
            test_case_name: test_case_name.into(),
            test_name: test_name.into(),
            result_type,
            time,
            message: None,
            stack_trace: None,
            stdout: None,
            stderr: None,
        }
    }

    /// Returns true if this test did not fail.
    pub fn is_success(&self) -> bool {
        !self.result_type.is_failure()
    }
}

/// The results of all tests in a test case.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestCaseSummary {
    /// The name of the test case.
    pub test_case_name: String,

    /// The individual results, in the order they were reported.
    pub results: Vec<TestResultSummary>,

    /// True if these results were replayed from a previous run.
    #[serde(default)]
    pub is_cached: bool,
}

impl TestCaseSummary {
    /// Creates a new test case summary.
    pub fn new(test_case_name: impl Into<String>, results: Vec<TestResultSummary>) -> Self {
        Self {
            test_case_name: test_case_name.into(),
            results,
            is_cached: false,
        }
    }

    /// Returns true if every result in this test case passed.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|result| result.is_success())
    }

    /// Returns the sum of the time taken by every result.
    pub fn total_time(&self) -> Duration {
        self.results.iter().map(|result| result.time).sum()
    }

    /// Returns the number of failing results.
    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|result| !result.is_success()).count()
    }

    /// Returns a copy of this summary marked as replayed from a previous run.
    pub fn to_cached(&self) -> Self {
        Self {
            is_cached: true,
            ..self.clone()
        }
    }
}

/// The results of running a single test target.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestResults {
    /// The target these results are for.
    pub target: BuildTarget,

    /// The test cases, in the order they were reported.
    pub test_cases: Vec<TestCaseSummary>,

    /// People to contact about failures in this target.
    #[serde(default)]
    pub contacts: BTreeSet<String>,

    /// Labels attached to this target.
    #[serde(default)]
    pub labels: BTreeSet<String>,

    /// The order in which this result resolved within the run, starting at 1.
    ///
    /// 0 means that no sequence number has been assigned yet.
    #[serde(default)]
    pub sequence_number: u32,

    /// The total number of test targets in the run, as known when the run started.
    #[serde(default)]
    pub total_number_of_tests: usize,
}

impl TestResults {
    /// Creates a new `TestResults` without a sequence number.
    pub fn new(
        target: BuildTarget,
        test_cases: Vec<TestCaseSummary>,
        contacts: BTreeSet<String>,
        labels: BTreeSet<String>,
    ) -> Self {
        Self {
            target,
            test_cases,
            contacts,
            labels,
            sequence_number: 0,
            total_number_of_tests: 0,
        }
    }

    /// Returns true if every test case in these results passed.
    pub fn is_success(&self) -> bool {
        self.test_cases.iter().all(|case| case.is_success())
    }

    /// Returns the total number of failing tests across all test cases.
    pub fn failure_count(&self) -> usize {
        self.test_cases.iter().map(|case| case.failure_count()).sum()
    }

    /// Returns the total number of individual tests.
    pub fn test_count(&self) -> usize {
        self.test_cases.iter().map(|case| case.results.len()).sum()
    }

    /// Returns true if any test case was replayed from a previous run.
    pub fn is_cached(&self) -> bool {
        self.test_cases.iter().any(|case| case.is_cached)
    }

    /// Returns the sum of the time taken by every test case.
    pub fn total_time(&self) -> Duration {
        self.test_cases.iter().map(|case| case.total_time()).sum()
    }

    /// Returns these results stamped with a sequence number and the total number of tests.
    pub fn with_sequence(self, sequence_number: u32, total_number_of_tests: usize) -> Self {
        Self {
            sequence_number,
            total_number_of_tests,
            ..self
        }
    }
}
