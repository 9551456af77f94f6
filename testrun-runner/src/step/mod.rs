// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Steps: the individual units of work a test rule asks the runner to perform.
//!
//! A [`StepRunner`] runs a rule's steps in order and then interprets the results they produced.

mod command;
mod fs;
mod test_command;

pub use command::*;
pub use fs::*;
pub use test_command::*;

use crate::{
    errors::ExecutionError,
    reporter::{EventBus, TestEventKind},
    rule::{ExecutionContext, TestResultsFn},
    target::BuildTarget,
    test_results::TestResults,
};
use futures::future::BoxFuture;
use std::fmt;
use tracing::debug;

/// A single unit of work.
pub trait Step: fmt::Debug + Send + Sync {
    /// A short, machine-friendly name for this step, for example `make_clean_dir`.
    fn short_name(&self) -> &str;

    /// A human-readable description of what this step does.
    fn description(&self, cx: &ExecutionContext) -> String;

    /// Runs this step.
    fn execute<'a>(&'a self, cx: &'a ExecutionContext)
    -> BoxFuture<'a, Result<(), ExecutionError>>;
}

/// Runs steps on behalf of the test runner.
pub trait StepRunner: Send + Sync {
    /// Runs `steps` in order, then calls `results_fn` to produce the results for `target`.
    ///
    /// Stops at the first failing step, in which case `results_fn` isn't called.
    fn run_steps_and_yield_result(
        &self,
        steps: Vec<Box<dyn Step>>,
        results_fn: TestResultsFn,
        target: BuildTarget,
    ) -> BoxFuture<'static, Result<TestResults, ExecutionError>>;

    /// Runs a single step that isn't associated with any target.
    fn run_step<'a>(&'a self, step: &'a dyn Step) -> BoxFuture<'a, Result<(), ExecutionError>>;
}

/// The standard step runner.
///
/// Posts [`StepsStarted`](TestEventKind::StepsStarted) and
/// [`StepsFinished`](TestEventKind::StepsFinished) around every target's steps.
#[derive(Clone, Debug)]
pub struct DefaultStepRunner {
    cx: ExecutionContext,
    bus: EventBus,
}

impl DefaultStepRunner {
    /// Creates a new `DefaultStepRunner`.
    pub fn new(cx: ExecutionContext, bus: EventBus) -> Self {
        Self { cx, bus }
    }
}

impl StepRunner for DefaultStepRunner {
    fn run_steps_and_yield_result(
        &self,
        steps: Vec<Box<dyn Step>>,
        results_fn: TestResultsFn,
        target: BuildTarget,
    ) -> BoxFuture<'static, Result<TestResults, ExecutionError>> {
        let cx = self.cx.clone();
        let bus = self.bus.clone();

        Box::pin(async move {
            debug!(%target, "test steps will run");
            bus.post(TestEventKind::StepsStarted {
                target: target.clone(),
                step_count: steps.len(),
            });

            let res = run_steps(&cx, &steps).await;

            debug!(%target, "test steps did run");
            bus.post(TestEventKind::StepsFinished {
                target: target.clone(),
            });

            res?;
            results_fn.call()
        })
    }

    fn run_step<'a>(&'a self, step: &'a dyn Step) -> BoxFuture<'a, Result<(), ExecutionError>> {
        Box::pin(async move {
            debug!(step = step.short_name(), "running {}", step.description(&self.cx));
            step.execute(&self.cx).await
        })
    }
}

async fn run_steps(cx: &ExecutionContext, steps: &[Box<dyn Step>]) -> Result<(), ExecutionError> {
    for step in steps {
        debug!(step = step.short_name(), "running {}", step.description(cx));
        step.execute(cx).await?;
    }
    Ok(())
}
