// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The scheduling pipeline: a bounded parallel phase, then a sequential serial phase.

use super::{RunContext, TestRun};
use crate::{errors::TestRunnerExecuteError, step::StepRunner, test_results::TestResults};
use future_queue::{FutureQueueContext, StreamExt as _};
use futures::prelude::*;
use std::sync::Arc;
use tokio::{
    runtime::Handle,
    sync::broadcast,
    task::{JoinError, JoinHandle},
};
use tracing::{debug, error};

pub(super) struct Pipeline {
    pub(super) handle: Handle,
    pub(super) step_runner: Arc<dyn StepRunner>,
    pub(super) test_threads: usize,
    pub(super) cancel_tx: broadcast::Sender<()>,
}

impl Pipeline {
    /// Runs every test run and returns the results: the parallel group in resolution order, then
    /// the serial group in input order.
    ///
    /// No serial run starts before every parallel run has resolved. If waiting for the parallel
    /// group fails, the serial group is not run at all.
    pub(super) async fn run(
        &self,
        runs: Vec<TestRun>,
        cx: RunContext,
    ) -> Result<Vec<TestResults>, TestRunnerExecuteError> {
        let (serial, parallel): (Vec<_>, Vec<_>) =
            runs.into_iter().partition(|run| run.run_separately());
        debug!(
            parallel = parallel.len(),
            serial = serial.len(),
            test_threads = self.test_threads,
            "scheduling test runs",
        );

        let mut results = Vec::with_capacity(parallel.len() + serial.len());

        let parallel_results: Vec<Result<Option<TestResults>, JoinError>> =
            stream::iter(parallel)
                .map(|run| {
                    let cx = cx.clone();
                    (1, move |_: FutureQueueContext| self.spawn_run(run, &cx))
                })
                .future_queue(self.test_threads)
                .collect()
                .await;

        for res in parallel_results {
            match res {
                Ok(Some(run_results)) => results.push(run_results),
                Ok(None) => {}
                Err(join_error) => {
                    error!("parallel tests failed, not running serial tests");
                    return Err(TestRunnerExecuteError::ParallelPhase(join_error));
                }
            }
        }

        for run in serial {
            match self.spawn_run(run, &cx).await {
                Ok(Some(run_results)) => results.push(run_results),
                Ok(None) => {}
                Err(join_error) => return Err(TestRunnerExecuteError::SerialPhase(join_error)),
            }
        }

        Ok(results)
    }

    /// Spawns a run on the runtime. The run stops early, returning `None`, if cancellation is
    /// requested.
    fn spawn_run(
        &self,
        run: TestRun,
        cx: &RunContext,
    ) -> JoinHandle<Option<TestResults>> {
        let target = run.target().clone();
        let fut = run.execute(&*self.step_runner, cx.clone());
        let mut cancel_rx = self.cancel_tx.subscribe();

        self.handle.spawn(async move {
            debug!(%target, "test run started");
            tokio::select! {
                results = fut => Some(results),
                _ = cancel_rx.recv() => {
                    debug!(%target, "test run cancelled");
                    None
                }
            }
        })
    }
}
