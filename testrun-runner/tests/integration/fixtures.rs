// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino::{Utf8Path, Utf8PathBuf};
use debug_ignore::DebugIgnore;
use futures::future::BoxFuture;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use testrun_runner::{
    aggregator::FinishedRun,
    cache::{BuildEngine, BuildResult, BuildRuleSuccessType, RuleKey, RuleKeyFileHelper},
    config::TestThreads,
    coverage::LibraryUnderTest,
    errors::{ExecutionError, TestRunnerExecuteError},
    reporter::{EventBus, TestEvent, TestEventKind, TestReportingCallback},
    rule::{ExecutionContext, TestResultsFn, TestRule, TestRunningOptions},
    runner::TestRunnerBuilder,
    signal::SignalHandlerKind,
    step::{DefaultStepRunner, Step},
    target::BuildTarget,
    test_results::{ResultType, TestCaseSummary, TestResultSummary, TestResults},
};

pub(crate) fn test_init() {
    // Installing more than once fails, which is fine.
    let _ = color_eyre::install();
}

/// What a fake rule's step does when it runs.
#[derive(Clone, Copy, Debug)]
pub(crate) enum FakeBehavior {
    /// Sleep for the given duration, then succeed.
    Pass(Duration),

    /// Fail with an execution error.
    FailStep,

    /// Never finish.
    Hang,

    /// End a test that never began, violating the reporting protocol.
    BreakProtocol,
}

/// Tracks how many fake steps are running at once.
#[derive(Clone, Debug, Default)]
pub(crate) struct ConcurrencyTracker {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
    executed: Arc<Mutex<Vec<BuildTarget>>>,
}

impl ConcurrencyTracker {
    pub(crate) fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }

    pub(crate) fn executed(&self) -> Vec<BuildTarget> {
        self.executed.lock().expect("lock not poisoned").clone()
    }

    fn enter(&self, target: &BuildTarget) {
        self.executed
            .lock()
            .expect("lock not poisoned")
            .push(target.clone());
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(current, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub(crate) struct FakeRule {
    target: BuildTarget,
    output_dir: Utf8PathBuf,
    contacts: BTreeSet<String>,
    labels: BTreeSet<String>,
    behavior: FakeBehavior,
    run_separately: bool,
    has_result_files: bool,
    libraries: Vec<LibraryUnderTest>,
    tracker: ConcurrencyTracker,
}

impl FakeRule {
    pub(crate) fn new(name: &str, store_dir: &Utf8Path, tracker: &ConcurrencyTracker) -> Self {
        let target = BuildTarget::new(name);
        let output_dir = store_dir.join(name.trim_start_matches('/').replace([':', '/'], "_"));
        Self {
            target,
            output_dir,
            contacts: BTreeSet::new(),
            labels: BTreeSet::new(),
            behavior: FakeBehavior::Pass(Duration::ZERO),
            run_separately: false,
            has_result_files: false,
            libraries: Vec::new(),
            tracker: tracker.clone(),
        }
    }

    pub(crate) fn behavior(mut self, behavior: FakeBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub(crate) fn run_separately(mut self) -> Self {
        self.run_separately = true;
        self
    }

    pub(crate) fn with_result_files(mut self) -> Self {
        self.has_result_files = true;
        self
    }

    pub(crate) fn with_library(mut self, library: LibraryUnderTest) -> Self {
        self.libraries.push(library);
        self
    }
}

impl TestRule for FakeRule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    fn contacts(&self) -> &BTreeSet<String> {
        &self.contacts
    }

    fn labels(&self) -> &BTreeSet<String> {
        &self.labels
    }

    fn supports_streaming_tests(&self) -> bool {
        false
    }

    fn run_test_separately(&self) -> bool {
        self.run_separately
    }

    fn has_test_result_files(&self) -> bool {
        self.has_result_files
    }

    fn libraries_under_test(&self) -> Vec<LibraryUnderTest> {
        self.libraries.clone()
    }

    fn run_tests(
        &self,
        _cx: &ExecutionContext,
        _options: &TestRunningOptions,
        callback: Arc<dyn TestReportingCallback>,
    ) -> Vec<Box<dyn Step>> {
        vec![Box::new(FakeStep {
            target: self.target.clone(),
            output_dir: self.output_dir.clone(),
            behavior: self.behavior,
            callback: DebugIgnore(callback),
            tracker: self.tracker.clone(),
        })]
    }

    fn interpret_test_results(
        &self,
        _cx: &ExecutionContext,
        _using_test_selectors: bool,
        _dry_run: bool,
    ) -> TestResultsFn {
        let results = TestResults::new(
            self.target.clone(),
            vec![TestCaseSummary::new(
                "Suite",
                vec![TestResultSummary::new(
                    "Suite",
                    "works",
                    ResultType::Success,
                    Duration::from_millis(1),
                )],
            )],
            self.contacts.clone(),
            self.labels.clone(),
        );
        TestResultsFn::new(move || Ok(results))
    }
}

#[derive(Debug)]
struct FakeStep {
    target: BuildTarget,
    output_dir: Utf8PathBuf,
    behavior: FakeBehavior,
    callback: DebugIgnore<Arc<dyn TestReportingCallback>>,
    tracker: ConcurrencyTracker,
}

impl Step for FakeStep {
    fn short_name(&self) -> &str {
        "fake"
    }

    fn description(&self, _cx: &ExecutionContext) -> String {
        format!("fake step for {} ({:?})", self.target, self.behavior)
    }

    fn execute<'a>(
        &'a self,
        _cx: &'a ExecutionContext,
    ) -> BoxFuture<'a, Result<(), ExecutionError>> {
        Box::pin(async move {
            self.tracker.enter(&self.target);
            let res = match self.behavior {
                FakeBehavior::Pass(duration) => {
                    tokio::time::sleep(duration).await;
                    std::fs::create_dir_all(&self.output_dir).map_err(|error| {
                        ExecutionError::Io {
                            step: "fake".to_owned(),
                            error,
                        }
                    })
                }
                FakeBehavior::FailStep => Err(ExecutionError::Io {
                    step: "fake".to_owned(),
                    error: std::io::Error::other("disk on fire"),
                }),
                FakeBehavior::Hang => futures::future::pending().await,
                FakeBehavior::BreakProtocol => {
                    let summary =
                        TestResultSummary::new("Suite", "never-began", ResultType::Success, Duration::ZERO);
                    self.callback.test_did_end(&summary);
                    Ok(())
                }
            };
            self.tracker.exit();
            res
        })
    }
}

/// A build engine where every registered target matched its existing artifacts.
#[derive(Debug, Default)]
pub(crate) struct FakeBuildEngine {
    rule_keys: HashMap<BuildTarget, RuleKey>,
}

impl FakeBuildEngine {
    pub(crate) fn with_rule_key(mut self, target: &str, rule_key: &str) -> Self {
        self.rule_keys
            .insert(BuildTarget::new(target), RuleKey::new(rule_key));
        self
    }
}

impl BuildEngine for FakeBuildEngine {
    fn build_rule_result(&self, target: &BuildTarget) -> Option<BuildResult> {
        self.rule_keys.contains_key(target).then_some(BuildResult {
            success: BuildRuleSuccessType::MatchingRuleKey,
        })
    }

    fn rule_key(&self, target: &BuildTarget) -> Option<RuleKey> {
        self.rule_keys.get(target).cloned()
    }
}

/// Writes the rule key marker for `rule`, as a previous run would have.
pub(crate) fn write_rule_key(rule: &dyn TestRule, rule_key: &str) {
    let path = RuleKeyFileHelper::rule_key_path(rule);
    std::fs::create_dir_all(rule.output_dir()).expect("output dir created");
    std::fs::write(path, format!("{rule_key}\n")).expect("rule key written");
}

pub(crate) struct RunOutput {
    pub(crate) res: Result<FinishedRun, TestRunnerExecuteError>,
    pub(crate) events: Vec<TestEvent>,
}

impl RunOutput {
    pub(crate) fn kinds(&self) -> impl Iterator<Item = &TestEventKind> {
        self.events.iter().map(|event| &event.kind)
    }

    /// Returns the index of the first event matching `f`.
    pub(crate) fn position(&self, f: impl Fn(&TestEventKind) -> bool) -> Option<usize> {
        self.kinds().position(f)
    }
}

pub(crate) struct RunSetup<'a> {
    pub(crate) workspace_root: &'a Utf8Path,
    pub(crate) options: TestRunningOptions,
    pub(crate) test_threads: TestThreads,
    pub(crate) signal_handler: SignalHandlerKind,
}

impl<'a> RunSetup<'a> {
    pub(crate) fn new(workspace_root: &'a Utf8Path) -> Self {
        Self {
            workspace_root,
            options: TestRunningOptions {
                run_all_tests: true,
                results_cache_enabled: true,
                ..Default::default()
            },
            test_threads: TestThreads::Count(4),
            signal_handler: SignalHandlerKind::Noop,
        }
    }

    pub(crate) fn run(self, rules: Vec<Arc<dyn TestRule>>, build_engine: &dyn BuildEngine) -> RunOutput {
        let cx = ExecutionContext::new(self.workspace_root);
        let (bus, mut receiver) = EventBus::new();
        let step_runner = Arc::new(DefaultStepRunner::new(cx.clone(), bus.clone()));

        let mut builder = TestRunnerBuilder::default();
        builder.set_test_threads(self.test_threads);
        let runner = builder
            .build(self.options, cx, step_runner, bus, self.signal_handler)
            .expect("runner built");
        let res = runner.run_tests(&rules, build_engine);

        RunOutput {
            res,
            events: receiver.drain(),
        }
    }
}

pub(crate) fn into_rules(rules: Vec<FakeRule>) -> Vec<Arc<dyn TestRule>> {
    rules
        .into_iter()
        .map(|rule| Arc::new(rule) as Arc<dyn TestRule>)
        .collect()
}
