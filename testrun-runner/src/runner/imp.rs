// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{RunContext, TestRun, caching_status_transforming, pipeline::Pipeline};
use crate::{
    aggregator::{FinishedRun, finish_run},
    cache::{BuildEngine, CacheDecisionInputs, RuleKeyFileHelper, is_test_run_required},
    config::TestThreads,
    coverage::LibraryUnderTest,
    errors::{TestRunnerBuildError, TestRunnerExecuteError},
    reporter::{EventBus, StatusEventCorrelator, TestEventKind},
    rule::{ExecutionContext, TestRule, TestRunningOptions},
    signal::{SignalHandler, SignalHandlerKind},
    step::{MakeCleanDirectoryStep, StepRunner},
    stopwatch::stopwatch,
};
use debug_ignore::DebugIgnore;
use std::sync::Arc;
use tokio::{runtime::Runtime, sync::broadcast};
use tracing::{debug, info};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    test_threads: Option<TestThreads>,
}

impl TestRunnerBuilder {
    /// Sets the number of test runs to execute simultaneously in the parallel group.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Creates a new test runner.
    pub fn build(
        self,
        options: TestRunningOptions,
        cx: ExecutionContext,
        step_runner: Arc<dyn StepRunner>,
        bus: EventBus,
        signal_handler: SignalHandlerKind,
    ) -> Result<TestRunner, TestRunnerBuildError> {
        let test_threads = self
            .test_threads
            .unwrap_or(TestThreads::NumCpus)
            .compute()
            .max(1);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("testrun-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = signal_handler.build()?;

        Ok(TestRunner {
            options,
            cx,
            step_runner: DebugIgnore(step_runner),
            bus,
            test_threads,
            runtime,
            signal_handler,
        })
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner {
    options: TestRunningOptions,
    cx: ExecutionContext,
    step_runner: DebugIgnore<Arc<dyn StepRunner>>,
    bus: EventBus,
    test_threads: usize,
    runtime: Runtime,
    signal_handler: SignalHandler,
}

impl TestRunner {
    /// Returns the number of runs the parallel group executes simultaneously.
    pub fn test_threads(&self) -> usize {
        self.test_threads
    }

    /// Runs the tests for `rules`, replaying cached results where possible.
    ///
    /// Failing tests are not errors: they're reported through the returned results and exit code.
    /// Returns an error if the run could not be completed, for example because it was interrupted.
    pub fn run_tests(
        self,
        rules: &[Arc<dyn TestRule>],
        build_engine: &dyn BuildEngine,
    ) -> Result<FinishedRun, TestRunnerExecuteError> {
        let Self {
            options,
            cx,
            step_runner: DebugIgnore(step_runner),
            bus,
            test_threads,
            runtime,
            mut signal_handler,
        } = self;
        let watch = stopwatch();

        let libraries: Vec<LibraryUnderTest> = rules
            .iter()
            .flat_map(|rule| rule.libraries_under_test())
            .collect();

        if let Some(coverage) = &options.coverage {
            if !libraries.is_empty() {
                let step = MakeCleanDirectoryStep::new(coverage.output_dir.clone());
                runtime
                    .block_on(step_runner.run_step(&step))
                    .map_err(TestRunnerExecuteError::CoverageSetup)?;
            }
        }

        bus.post(TestEventKind::RunStarted {
            targets: rules.iter().map(|rule| rule.target().clone()).collect(),
            run_all_tests: options.run_all_tests,
            test_selectors: options.test_selectors.clone(),
        });

        let runs = rules
            .iter()
            .map(|rule| prepare_run(rule.as_ref(), &options, &cx, &bus, build_engine))
            .collect();

        let (cancel_tx, _cancel_rx) = broadcast::channel(1);
        let pipeline = Pipeline {
            handle: runtime.handle().clone(),
            step_runner: step_runner.clone(),
            test_threads,
            cancel_tx: cancel_tx.clone(),
        };
        let run_cx = RunContext::new(bus.clone(), rules.len());

        let res = runtime.block_on(async {
            let results = tokio::select! {
                res = pipeline.run(runs, run_cx) => res?,
                Some(event) = signal_handler.recv() => {
                    info!("received {event}, cancelling test runs");
                    // Failure to send means every run has already finished.
                    let _ = cancel_tx.send(());
                    return Err(TestRunnerExecuteError::Interrupted(event));
                }
            };

            let outcome = finish_run(
                &results,
                &options,
                &libraries,
                &cx,
                &*step_runner,
                &bus,
            )
            .await?;
            Ok::<_, TestRunnerExecuteError>(FinishedRun {
                results,
                outcome,
                start_time: watch.start_time(),
                elapsed: watch.elapsed(),
            })
        });

        // Child processes may be holding on to worker threads. Shut the runtime down without
        // waiting for them.
        runtime.shutdown_background();
        res
    }
}

fn prepare_run(
    rule: &dyn TestRule,
    options: &TestRunningOptions,
    cx: &ExecutionContext,
    bus: &EventBus,
    build_engine: &dyn BuildEngine,
) -> TestRun {
    let target = rule.target();
    let inputs = CacheDecisionInputs::gather(cx, options, rule, build_engine);
    let run_required = is_test_run_required(&inputs);
    let callback = Arc::new(StatusEventCorrelator::new(target.clone(), bus.clone()));

    let steps = if run_required {
        bus.post(TestEventKind::TargetStarted {
            target: target.clone(),
        });
        let mut steps = rule.run_tests(cx, options, callback.clone());
        // Record the rule key only once the steps have produced fresh results.
        if !steps.is_empty() {
            if let Some(step) =
                RuleKeyFileHelper::new(build_engine).create_rule_key_in_dir_step(rule)
            {
                steps.push(step);
            }
        }
        steps
    } else {
        debug!(%target, "replaying cached test results");
        Vec::new()
    };

    let results_fn = caching_status_transforming(
        run_required,
        rule.interpret_test_results(cx, options.is_using_test_selectors(), options.dry_run),
    );
    TestRun::new(rule, steps, results_fn, callback)
}
