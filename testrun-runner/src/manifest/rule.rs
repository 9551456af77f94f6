// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::TargetDefinition;
use crate::{
    coverage::LibraryUnderTest,
    errors::ExecutionError,
    reporter::TestReportingCallback,
    rule::{ExecutionContext, TestResultsFn, TestRule, TestRunningOptions},
    step::{MakeCleanDirectoryStep, Step, TestCommandStep},
    target::BuildTarget,
    test_results::{ResultType, TestCaseSummary, TestResultSummary, TestResults},
};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Duration,
};
use xxhash_rust::xxh3::xxh3_64;

/// Environment variable listing the test selectors in effect, one per line.
pub const TEST_SELECTORS_ENV: &str = "TESTRUN_TEST_SELECTORS";

/// Environment variable set to `1` when a debugger is expected to attach.
pub const DEBUG_ENV: &str = "TESTRUN_DEBUG";

/// Environment variable holding the target's output directory.
pub const OUTPUT_DIR_ENV: &str = "TESTRUN_OUTPUT_DIR";

/// Environment variable holding the target's name.
pub const TARGET_ENV: &str = "TESTRUN_TARGET";

/// A test rule for a target declared in a manifest.
///
/// The rule's steps clean its output directory and then run the target's command through a
/// [`TestCommandStep`], which leaves the results behind in
/// [`results.json`](Self::RESULTS_FILE_NAME).
#[derive(Clone, Debug)]
pub struct ManifestTestRule {
    definition: TargetDefinition,
    output_dir: Utf8PathBuf,
}

impl ManifestTestRule {
    /// The name of the result file inside the rule's output directory.
    pub const RESULTS_FILE_NAME: &'static str = "results.json";

    /// Creates a new rule for `definition`, with outputs in a directory under `store_dir`.
    pub fn new(definition: TargetDefinition, store_dir: &Utf8Path) -> Self {
        let output_dir = store_dir.join(output_dir_name(&definition.name));
        Self {
            definition,
            output_dir,
        }
    }

    /// Returns the definition this rule was created from.
    pub fn definition(&self) -> &TargetDefinition {
        &self.definition
    }

    /// Returns the path to the rule's result file.
    pub fn results_path(&self) -> Utf8PathBuf {
        self.output_dir.join(Self::RESULTS_FILE_NAME)
    }

    fn program(&self, cx: &ExecutionContext) -> String {
        let command = Utf8Path::new(&self.definition.command);
        // Bare program names are looked up on PATH.
        if command.is_relative() && command.components().count() > 1 {
            command
                .components()
                .filter(|component| !matches!(component, Utf8Component::CurDir))
                .fold(cx.workspace_root.clone(), |path, component| path.join(component))
                .into_string()
        } else {
            self.definition.command.clone()
        }
    }

    fn test_env(
        &self,
        cx: &ExecutionContext,
        options: &TestRunningOptions,
    ) -> BTreeMap<String, String> {
        let mut env = self.definition.env.clone();
        env.extend(options.environment_overrides.clone());
        env.insert(TARGET_ENV.to_owned(), self.definition.name.to_string());
        env.insert(OUTPUT_DIR_ENV.to_owned(), self.output_dir.to_string());
        if options.is_using_test_selectors() {
            env.insert(TEST_SELECTORS_ENV.to_owned(), options.test_selectors.join("\n"));
        }
        if cx.debug_enabled {
            env.insert(DEBUG_ENV.to_owned(), "1".to_owned());
        }
        env
    }
}

impl TestRule for ManifestTestRule {
    fn target(&self) -> &BuildTarget {
        &self.definition.name
    }

    fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    fn contacts(&self) -> &BTreeSet<String> {
        &self.definition.contacts
    }

    fn labels(&self) -> &BTreeSet<String> {
        &self.definition.labels
    }

    fn supports_streaming_tests(&self) -> bool {
        self.definition.streaming
    }

    fn run_test_separately(&self) -> bool {
        self.definition.run_separately
    }

    fn has_test_result_files(&self) -> bool {
        self.results_path().is_file()
    }

    fn libraries_under_test(&self) -> Vec<LibraryUnderTest> {
        self.definition.under_test.iter().map(Into::into).collect()
    }

    fn run_tests(
        &self,
        cx: &ExecutionContext,
        options: &TestRunningOptions,
        callback: Arc<dyn TestReportingCallback>,
    ) -> Vec<Box<dyn Step>> {
        if options.dry_run {
            return Vec::new();
        }

        let test_step = TestCommandStep::new(
            self.definition.name.clone(),
            self.program(cx),
            self.definition.args.iter().cloned(),
            self.results_path(),
            callback,
        )
        .envs(self.test_env(cx, options))
        .streaming(self.definition.streaming);

        vec![
            Box::new(MakeCleanDirectoryStep::new(self.output_dir.clone())) as Box<dyn Step>,
            Box::new(test_step),
        ]
    }

    fn interpret_test_results(
        &self,
        _cx: &ExecutionContext,
        using_test_selectors: bool,
        dry_run: bool,
    ) -> TestResultsFn {
        let target = self.definition.name.clone();
        let contacts = self.definition.contacts.clone();
        let labels = self.definition.labels.clone();

        if dry_run {
            return TestResultsFn::new(move || {
                let result = TestResultSummary::new(
                    target.as_str(),
                    target.as_str(),
                    ResultType::DryRun,
                    Duration::ZERO,
                );
                let test_cases = vec![TestCaseSummary::new(target.as_str(), vec![result])];
                Ok(TestResults::new(target, test_cases, contacts, labels))
            });
        }

        let path = self.results_path();
        TestResultsFn::new(move || {
            let contents = std::fs::read_to_string(&path).map_err(|error| {
                ExecutionError::ReadResults {
                    target: target.clone(),
                    path: path.clone(),
                    error,
                }
            })?;
            let mut test_cases: Vec<TestCaseSummary> =
                serde_json::from_str(&contents).map_err(|error| ExecutionError::ParseResults {
                    target: target.clone(),
                    path: path.clone(),
                    error,
                })?;

            if using_test_selectors {
                // Cases the selectors filtered out entirely are noise.
                test_cases.retain(|case| {
                    !case
                        .results
                        .iter()
                        .all(|result| result.result_type == ResultType::Excluded)
                });
            }

            Ok(TestResults::new(target, test_cases, contacts, labels))
        })
    }
}

/// Returns a file-system friendly directory name for `target` that's unique to it.
fn output_dir_name(target: &BuildTarget) -> String {
    let sanitized: String = target
        .as_str()
        .trim_start_matches('/')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let hash = xxh3_64(target.as_str().as_bytes());
    format!("{sanitized}-{:08x}", hash & 0xFFFFFFFF)
}
