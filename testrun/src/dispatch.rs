// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    output::{OutputContext, OutputOpts, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use std::{
    collections::BTreeMap,
    io::{self, BufWriter, Write},
    sync::Arc,
    thread::JoinHandle,
};
use testrun_runner::{
    config::{TestThreads, TestrunConfig},
    manifest::{ManifestBuildEngine, TestManifest},
    reporter::{EventBus, EventReceiver, TestDisplayer, TestEventKind},
    rule::{ExecutionContext, TestRule, TestRunningOptions},
    runner::TestRunnerBuilder,
    signal::SignalHandlerKind,
    step::DefaultStepRunner,
};
use tracing::{debug, info};

/// Runs test targets, replaying results from previous runs where nothing changed.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles::style())]
pub struct TestrunApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(subcommand)]
    command: Command,
}

impl TestrunApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32, ExpectedError> {
        match self.command {
            Command::Run(run_opts) => run_opts.exec(&self.config_opts, output),
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Config file [default: workspace-root/.config/testrun.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, workspace_root: &Utf8Path) -> Result<TestrunConfig, ExpectedError> {
        Ok(TestrunConfig::from_sources(
            workspace_root,
            self.config_file.as_deref(),
        )?)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the targets in a test manifest
    ///
    /// Targets whose inputs haven't changed since their last run have their results replayed
    /// instead of being run again. Exits with 0 if every test passed, 42 if any test failed, and
    /// 1 if the run could not be completed.
    Run(RunOpts),
}

#[derive(Debug, Args)]
struct RunOpts {
    /// Path to the test manifest
    #[arg(long, value_name = "PATH", default_value = "testrun.toml", env = "TESTRUN_MANIFEST")]
    manifest: Utf8PathBuf,

    /// Workspace root [default: the directory containing the manifest]
    ///
    /// Commands, inputs and relative paths in the manifest and config are resolved against it.
    #[arg(long, value_name = "DIR")]
    workspace_root: Option<Utf8PathBuf>,

    #[clap(flatten)]
    runner_opts: TestRunnerOpts,

    /// Run only tests matching this selector (may be repeated)
    ///
    /// Selectors are passed to every target. Cached results are never replayed when selectors
    /// are used.
    #[arg(long = "selector", short = 's', value_name = "SELECTOR")]
    selectors: Vec<String>,

    /// Set an environment variable for every test (may be repeated)
    ///
    /// Cached results are never replayed when environment overrides are used.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_override)]
    env_overrides: Vec<(String, String)>,

    /// Expect a debugger to attach to test processes
    #[arg(long)]
    debug: bool,

    /// Always run tests, never replaying results from a previous run
    #[arg(long)]
    no_results_cache: bool,

    /// Report what would run without running anything
    #[arg(long)]
    dry_run: bool,

    /// Write an XML report to this path, relative to the workspace root
    #[arg(long, value_name = "PATH")]
    xml: Option<Utf8PathBuf>,

    /// Generate a coverage report for libraries under test
    #[arg(long)]
    coverage: bool,
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Runner options")]
struct TestRunnerOpts {
    /// Number of targets to run simultaneously [default: from config]
    ///
    /// Accepts a positive count, a negative count relative to the number of CPUs, or
    /// `num-cpus`.
    #[arg(
        long,
        short = 'j',
        visible_alias = "jobs",
        value_name = "THREADS",
        allow_negative_numbers = true,
        env = "TESTRUN_TEST_THREADS"
    )]
    test_threads: Option<TestThreads>,
}

impl TestRunnerOpts {
    fn to_builder(&self, config: &TestrunConfig) -> TestRunnerBuilder {
        let mut builder = TestRunnerBuilder::default();
        builder.set_test_threads(self.test_threads.unwrap_or_else(|| config.test_threads()));
        builder
    }
}

impl RunOpts {
    fn exec(self, config_opts: &ConfigOpts, output: OutputContext) -> Result<i32, ExpectedError> {
        let manifest = TestManifest::from_path(&self.manifest)?;
        let workspace_root = self.resolve_workspace_root()?;
        debug!(%workspace_root, manifest = %manifest.path(), "loaded manifest");

        let config = config_opts.make_config(&workspace_root)?;
        let store_dir = workspace_root.join(config.store_dir());
        std::fs::create_dir_all(&store_dir).map_err(|err| ExpectedError::StoreDirCreateError {
            store_dir: store_dir.clone(),
            err,
        })?;

        let options = self.to_running_options(&config);
        let cx = ExecutionContext::new(&workspace_root).with_debug_enabled(self.debug);
        let (bus, receiver) = EventBus::new();
        let step_runner = Arc::new(DefaultStepRunner::new(cx.clone(), bus.clone()));

        let runner = self.runner_opts.to_builder(&config).build(
            options,
            cx,
            step_runner,
            bus,
            SignalHandlerKind::Standard,
        )?;
        debug!(test_threads = runner.test_threads(), "built test runner");

        let rules: Vec<Arc<dyn TestRule>> = manifest
            .rules(&workspace_root, config.store_dir())
            .into_iter()
            .map(|rule| rule as Arc<dyn TestRule>)
            .collect();
        let build_engine = ManifestBuildEngine::new(&manifest, &workspace_root);

        let display_thread = spawn_displayer(receiver, output);
        let finished = runner.run_tests(&rules, &build_engine)?;

        // RunFinished is always posted on success, so the displayer is done or about to be.
        match display_thread.join() {
            Ok(res) => res.map_err(|err| ExpectedError::WriteEventError { err })?,
            Err(panic) => std::panic::resume_unwind(panic),
        }

        info!(
            exit_code = finished.outcome.exit_code,
            "test run finished in {:.3}s",
            finished.elapsed.as_secs_f64(),
        );
        Ok(finished.outcome.exit_code)
    }

    fn resolve_workspace_root(&self) -> Result<Utf8PathBuf, ExpectedError> {
        let workspace_root = match &self.workspace_root {
            Some(workspace_root) => workspace_root.clone(),
            None => match self.manifest.parent() {
                Some(parent) if !parent.as_str().is_empty() => parent.to_owned(),
                _ => Utf8PathBuf::from("."),
            },
        };
        workspace_root
            .canonicalize_utf8()
            .map_err(|err| ExpectedError::WorkspaceRootInvalid {
                workspace_root,
                err,
            })
    }

    fn to_running_options(&self, config: &TestrunConfig) -> TestRunningOptions {
        let environment_overrides: BTreeMap<_, _> = self.env_overrides.iter().cloned().collect();
        TestRunningOptions {
            run_all_tests: self.selectors.is_empty(),
            test_selectors: self.selectors.clone(),
            environment_overrides,
            results_cache_enabled: config.results_cache_enabled() && !self.no_results_cache,
            dry_run: self.dry_run,
            xml_output_path: self
                .xml
                .clone()
                .or_else(|| config.xml_path().map(ToOwned::to_owned)),
            coverage: self.coverage.then(|| config.coverage_options()),
        }
    }
}

/// Writes events to stderr on a separate thread until the run finishes.
///
/// If the run fails without finishing, the thread is left to exit along with the process.
fn spawn_displayer(mut receiver: EventReceiver, output: OutputContext) -> JoinHandle<io::Result<()>> {
    let mut displayer = TestDisplayer::new(output.verbose);
    if output.color.should_colorize(supports_color::Stream::Stderr) {
        displayer.colorize();
    }

    std::thread::spawn(move || {
        let mut writer = BufWriter::new(io::stderr());
        while let Some(event) = receiver.blocking_recv() {
            displayer.write_event(&event, &mut writer)?;
            writer.flush()?;
            if matches!(event.kind, TestEventKind::RunFinished { .. }) {
                break;
            }
        }
        Ok(())
    })
}

fn parse_env_override(input: &str) -> Result<(String, String), String> {
    match input.split_once('=') {
        Some((key, value)) if !key.is_empty() && !key.contains('\0') => {
            Ok((key.to_owned(), value.to_owned()))
        }
        Some(_) => Err(format!("invalid environment variable name in `{input}`")),
        None => Err(format!("expected KEY=VALUE, found `{input}`")),
    }
}
