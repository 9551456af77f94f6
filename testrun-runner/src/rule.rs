// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The contract between the runner and test rules.
//!
//! A [`TestRule`] knows how to produce the [`Step`]s that run its tests, and how to interpret the
//! results those steps leave behind. The runner decides *whether* the steps run, and when.

use crate::{
    coverage::{CoverageOptions, LibraryUnderTest},
    errors::ExecutionError,
    reporter::TestReportingCallback,
    step::Step,
    target::BuildTarget,
    test_results::TestResults,
};
use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

/// Per-invocation context shared by every step.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    /// True if a debugger is expected to attach to the test process.
    pub debug_enabled: bool,

    /// The root of the workspace. Relative paths are resolved against it.
    pub workspace_root: Utf8PathBuf,
}

impl ExecutionContext {
    /// Creates a new `ExecutionContext`.
    pub fn new(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            debug_enabled: false,
            workspace_root: workspace_root.into(),
        }
    }

    /// Sets whether debugging is enabled.
    pub fn with_debug_enabled(mut self, debug_enabled: bool) -> Self {
        self.debug_enabled = debug_enabled;
        self
    }
}

/// Options controlling one test run.
#[derive(Clone, Debug, Default)]
pub struct TestRunningOptions {
    /// True if every test should run, as opposed to a subset picked by the user.
    pub run_all_tests: bool,

    /// Selectors restricting which tests run. Non-empty selectors bypass the results cache.
    pub test_selectors: Vec<String>,

    /// Environment variables to set for every test. Non-empty overrides bypass the results cache.
    pub environment_overrides: BTreeMap<String, String>,

    /// Whether results from a previous run may be replayed.
    pub results_cache_enabled: bool,

    /// If true, rules report what would run without running anything.
    pub dry_run: bool,

    /// Write an XML report of all results to this path.
    pub xml_output_path: Option<Utf8PathBuf>,

    /// Generate a coverage report for libraries under test.
    pub coverage: Option<CoverageOptions>,
}

impl TestRunningOptions {
    /// Returns true if explicit test selectors are in effect.
    pub fn is_using_test_selectors(&self) -> bool {
        !self.test_selectors.is_empty()
    }

    /// Returns true if any environment override is configured.
    pub fn has_environment_overrides(&self) -> bool {
        !self.environment_overrides.is_empty()
    }
}

/// A one-shot computation that produces the results for a target once its steps have run.
pub struct TestResultsFn(
    DebugIgnore<Box<dyn FnOnce() -> Result<TestResults, ExecutionError> + Send>>,
);

impl TestResultsFn {
    /// Creates a new `TestResultsFn` from a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<TestResults, ExecutionError> + Send + 'static,
    {
        Self(DebugIgnore(Box::new(f)))
    }

    /// Returns a `TestResultsFn` that transforms the results produced by `self`.
    pub fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(TestResults) -> TestResults + Send + 'static,
    {
        Self::new(move || self.call().map(f))
    }

    /// Runs the computation.
    pub fn call(self) -> Result<TestResults, ExecutionError> {
        (self.0.0)()
    }
}

impl fmt::Debug for TestResultsFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TestResultsFn").field(&self.0).finish()
    }
}

/// A rule that knows how to run the tests for one target.
pub trait TestRule: fmt::Debug + Send + Sync {
    /// The target this rule tests.
    fn target(&self) -> &BuildTarget;

    /// The directory the rule writes its outputs, including result files, to.
    fn output_dir(&self) -> &Utf8Path;

    /// People to contact about failures.
    fn contacts(&self) -> &BTreeSet<String>;

    /// Labels attached to this rule.
    fn labels(&self) -> &BTreeSet<String>;

    /// True if the rule's steps report individual test events live through the
    /// [`TestReportingCallback`].
    ///
    /// Rules that return false only report a final summary; the runner synthesizes the events for
    /// them.
    fn supports_streaming_tests(&self) -> bool;

    /// True if this rule must not run alongside any other rule.
    fn run_test_separately(&self) -> bool;

    /// True if result files from a previous run exist on disk.
    fn has_test_result_files(&self) -> bool;

    /// The libraries whose code coverage is measured by this rule's tests.
    fn libraries_under_test(&self) -> Vec<LibraryUnderTest> {
        Vec::new()
    }

    /// Returns the steps that run this rule's tests.
    fn run_tests(
        &self,
        cx: &ExecutionContext,
        options: &TestRunningOptions,
        callback: Arc<dyn TestReportingCallback>,
    ) -> Vec<Box<dyn Step>>;

    /// Returns a computation that reads the results left behind by the steps.
    fn interpret_test_results(
        &self,
        cx: &ExecutionContext,
        using_test_selectors: bool,
        dry_run: bool,
    ) -> TestResultsFn;
}
