// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reduces the results of a run to an exit code, and performs the run's final side effects.

use crate::{
    coverage::{CoverageOptions, CoverageReportCommand, LibraryUnderTest},
    errors::{CoverageError, DisplayErrorChain, WriteXmlError},
    reporter::{EventBus, TestEventKind, write_xml_file},
    rule::{ExecutionContext, TestRunningOptions},
    step::StepRunner,
    test_results::TestResults,
};
use chrono::{DateTime, Local};
use std::time::Duration;
use testrun_metadata::TestRunExitCode;
use tracing::{debug, error, info};

/// The outcome of a test run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunOutcome {
    /// True if any result failed.
    pub any_failure: bool,

    /// The exit code testrun should exit with.
    pub exit_code: i32,
}

/// A completed test run.
#[derive(Clone, Debug)]
pub struct FinishedRun {
    /// Every result: the parallel group in resolution order, then the serial group in input order.
    pub results: Vec<TestResults>,

    /// The outcome of the run.
    pub outcome: RunOutcome,

    /// When the run started.
    pub start_time: DateTime<Local>,

    /// How long the run took.
    pub elapsed: Duration,
}

/// Reduces results to an outcome.
///
/// A result is a failure if it isn't a success. Any failure yields
/// [`TestRunExitCode::TEST_FAILURES`].
pub fn reduce(results: &[TestResults]) -> RunOutcome {
    let any_failure = results.iter().any(|results| {
        let failed = !results.is_success();
        if failed {
            debug!(target = %results.target, "result is a failure");
        }
        failed
    });
    RunOutcome {
        any_failure,
        exit_code: if any_failure {
            TestRunExitCode::TEST_FAILURES
        } else {
            TestRunExitCode::OK
        },
    }
}

/// Writes the XML report and the coverage report, if requested, then posts
/// [`TestEventKind::RunFinished`].
///
/// A coverage report failure is logged and turns the exit code into
/// [`TestRunExitCode::INFRASTRUCTURE_FAILURE`]. An XML write failure is returned as an error.
pub(crate) async fn finish_run(
    results: &[TestResults],
    options: &TestRunningOptions,
    libraries: &[LibraryUnderTest],
    cx: &ExecutionContext,
    step_runner: &dyn StepRunner,
    bus: &EventBus,
) -> Result<RunOutcome, WriteXmlError> {
    let mut outcome = reduce(results);

    if let Some(path) = &options.xml_output_path {
        let path = cx.workspace_root.join(path);
        write_xml_file(results, &path)?;
        info!(%path, "wrote XML report");
    }

    if let Some(coverage) = &options.coverage {
        if libraries.is_empty() {
            debug!("no libraries under test, skipping coverage report");
        } else if let Err(err) = generate_coverage_report(coverage, libraries, cx, step_runner).await
        {
            error!("{}", DisplayErrorChain::new(err));
            outcome.exit_code = TestRunExitCode::INFRASTRUCTURE_FAILURE;
        }
    }

    bus.post(TestEventKind::RunFinished {
        results: results.to_vec(),
        outcome,
    });
    Ok(outcome)
}

async fn generate_coverage_report(
    coverage: &CoverageOptions,
    libraries: &[LibraryUnderTest],
    cx: &ExecutionContext,
    step_runner: &dyn StepRunner,
) -> Result<(), CoverageError> {
    let step = CoverageReportCommand::new(coverage, libraries, &cx.workspace_root)?.into_step();
    step_runner
        .run_step(&step)
        .await
        .map_err(CoverageError::Report)
}
