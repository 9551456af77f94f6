// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by testrun.

use crate::{signal::ShutdownEvent, target::BuildTarget};
use camino::Utf8PathBuf;
use config::ConfigError;
use itertools::Itertools;
use std::{error, fmt, io, process::ExitStatus};
use thiserror::Error;
use tokio::task::JoinError;

/// An error that occurred while running the steps for a test target, or while interpreting its
/// results.
///
/// These errors never abort a run: they're turned into a failing result for the target.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A step's process could not be spawned.
    #[error("step `{step}`: failed to spawn `{command}`")]
    Spawn {
        /// The short name of the step.
        step: String,

        /// The command line that was being spawned.
        command: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A step's process exited unsuccessfully.
    #[error("step `{step}` {exited_with}")]
    StepFailed {
        /// The short name of the step.
        step: String,

        /// A description of how the process exited.
        exited_with: String,
    },

    /// A step failed with an I/O error.
    #[error("step `{step}`: I/O error")]
    Io {
        /// The short name of the step.
        step: String,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// A step could not write a rule key marker.
    #[error("step `{step}`: failed to write rule key")]
    RuleKey {
        /// The short name of the step.
        step: String,

        /// The underlying error.
        #[source]
        error: RuleKeyFileError,
    },

    /// The results for a target could not be read.
    #[error("failed to read test results for `{target}` from `{path}`")]
    ReadResults {
        /// The target whose results were being read.
        target: BuildTarget,

        /// The path that was read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The results for a target could not be parsed.
    #[error("failed to parse test results for `{target}` from `{path}`")]
    ParseResults {
        /// The target whose results were being read.
        target: BuildTarget,

        /// The path that was read.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },
}

impl ExecutionError {
    pub(crate) fn step_failed(step: impl Into<String>, exit_status: ExitStatus) -> Self {
        Self::StepFailed {
            step: step.into(),
            exited_with: crate::helpers::display_exited_with(exit_status),
        }
    }
}

/// An error that occurred while reading or writing a rule key marker file.
#[derive(Debug, Error)]
pub enum RuleKeyFileError {
    /// The marker file could not be read.
    #[error("error reading rule key from `{path}`")]
    Read {
        /// The path to the marker file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The marker file could not be written.
    #[error("error writing rule key to `{path}`")]
    Write {
        /// The path to the marker file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: atomicwrites::Error<io::Error>,
    },
}

/// An error that occurred while creating a [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] io::Error),

    /// An error occurred while setting up signals.
    #[error("error setting up signals")]
    SignalHandlerSetupError(#[from] SignalHandlerSetupError),
}

/// An error occurred while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] io::Error);

/// A fatal, run-level error that occurred while executing tests.
///
/// Failing tests are not errors: they're reported through the results. These errors mean that the
/// run could not be completed.
#[derive(Debug, Error)]
pub enum TestRunnerExecuteError {
    /// The run was interrupted by a signal.
    #[error("test run interrupted by {0}")]
    Interrupted(ShutdownEvent),

    /// The coverage output directory could not be prepared.
    #[error("failed to prepare coverage output directory")]
    CoverageSetup(#[source] ExecutionError),

    /// An infrastructure error occurred while waiting for the parallel group. Serial tests were
    /// not run.
    #[error("parallel tests failed, serial tests were not run")]
    ParallelPhase(#[source] JoinError),

    /// An infrastructure error occurred while waiting for the serial group.
    #[error("error fetching serial test results")]
    SerialPhase(#[source] JoinError),

    /// An error occurred after all tests finished running.
    #[error("error finishing test run")]
    FinishRun(#[from] WriteXmlError),
}

/// An error that occurred while writing the XML report.
#[derive(Debug, Error)]
#[error("error writing XML report to `{path}`")]
pub struct WriteXmlError {
    path: Utf8PathBuf,
    #[source]
    error: atomicwrites::Error<testrun_xml::SerializeError>,
}

impl WriteXmlError {
    pub(crate) fn new(
        path: impl Into<Utf8PathBuf>,
        error: atomicwrites::Error<testrun_xml::SerializeError>,
    ) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }

    /// Returns the path the report was being written to.
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }
}

/// An error that occurred while generating a coverage report.
#[derive(Debug, Error)]
pub enum CoverageError {
    /// A library under test has sources, but no package finder was configured to locate its
    /// source folders.
    #[error(
        "library `{library}` has sources but no source roots or path elements are configured \
         (set `coverage.source-roots` or `coverage.path-elements`)"
    )]
    NoPackageFinder {
        /// The library under test.
        library: BuildTarget,
    },

    /// The coverage report command failed.
    #[error("coverage report generation failed")]
    Report(#[source] ExecutionError),
}

/// An error that occurred while parsing configuration.
#[derive(Debug, Error)]
#[error("failed to parse testrun config at `{config_file}`")]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file that caused the error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// The config sources could not be combined.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// The combined config could not be deserialized.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),
}

/// An error that occurred while reading a test manifest.
#[derive(Debug, Error)]
pub enum ManifestParseError {
    /// The manifest could not be read.
    #[error("failed to read manifest at `{path}`")]
    Read {
        /// The manifest path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: io::Error,
    },

    /// The manifest is not valid TOML or doesn't match the expected shape.
    #[error("failed to parse manifest at `{path}`")]
    Deserialize {
        /// The manifest path.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: Box<toml::de::Error>,
    },

    /// The same target was declared more than once.
    #[error("manifest at `{path}` declares these targets more than once: {}", .targets.iter().join(", "))]
    DuplicateTargets {
        /// The manifest path.
        path: Utf8PathBuf,

        /// The duplicated targets.
        targets: Vec<BuildTarget>,
    },
}

/// An error which indicates that the value for the `test-threads` option could not be parsed.
#[derive(Clone, Debug, Error)]
#[error("error parsing test-threads value `{input}`: {message}")]
pub struct TestThreadsParseError {
    input: String,
    message: String,
}

impl TestThreadsParseError {
    pub(crate) fn new(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            message: message.into(),
        }
    }
}

/// Displays an error along with its chain of sources.
///
/// The first line is the error itself, and every source is listed after a `caused by:` header.
pub struct DisplayErrorChain<E> {
    error: E,
    initial_indent: &'static str,
}

impl<E: error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self {
            error,
            initial_indent: "",
        }
    }

    /// Creates a new `DisplayErrorChain` with every line indented by `initial_indent`.
    pub fn new_with_initial_indent(initial_indent: &'static str, error: E) -> Self {
        Self {
            error,
            initial_indent,
        }
    }
}

impl<E> fmt::Display for DisplayErrorChain<E>
where
    E: error::Error,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.initial_indent, self.error)?;

        let mut source = self.error.source();
        if source.is_some() {
            write!(f, "\n{}caused by:", self.initial_indent)?;
        }
        while let Some(error) = source {
            write!(f, "\n{}  - {}", self.initial_indent, error)?;
            source = error.source();
        }

        Ok(())
    }
}
