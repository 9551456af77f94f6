// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use camino::Utf8PathBuf;
use owo_colors::OwoColorize;
use std::{error::Error, io};
use testrun_metadata::TestRunExitCode;
use testrun_runner::errors::{
    ConfigParseError, ManifestParseError, TestRunnerBuildError, TestRunnerExecuteError,
};
use thiserror::Error;
use tracing::error;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that prevented a test run from completing.
///
/// Failing tests are not errors: they're reported through the exit code returned by
/// [`TestrunApp::exec`](crate::TestrunApp::exec).
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("workspace root is invalid")]
    WorkspaceRootInvalid {
        workspace_root: Utf8PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("manifest parse error")]
    ManifestParseError {
        #[from]
        err: ManifestParseError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("failed to create store directory")]
    StoreDirCreateError {
        store_dir: Utf8PathBuf,
        #[source]
        err: io::Error,
    },
    #[error("test runner build error")]
    TestRunnerBuildError {
        #[from]
        err: TestRunnerBuildError,
    },
    #[error("test run failed")]
    TestRunFailed {
        #[from]
        err: TestRunnerExecuteError,
    },
    #[error("error writing test events")]
    WriteEventError {
        #[source]
        err: io::Error,
    },
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::WorkspaceRootInvalid { .. }
            | Self::ManifestParseError { .. }
            | Self::ConfigParseError { .. }
            | Self::StoreDirCreateError { .. }
            | Self::TestRunnerBuildError { .. }
            | Self::TestRunFailed { .. }
            | Self::WriteEventError { .. } => TestRunExitCode::INFRASTRUCTURE_FAILURE,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::WorkspaceRootInvalid {
                workspace_root,
                err,
            } => {
                error!(
                    "workspace root `{}` is invalid",
                    workspace_root.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::ManifestParseError { err } => {
                match err {
                    ManifestParseError::Read { path, .. } => {
                        error!("failed to read manifest at `{}`", path.style(styles.bold));
                    }
                    ManifestParseError::Deserialize { path, .. } => {
                        error!("failed to parse manifest at `{}`", path.style(styles.bold));
                    }
                    ManifestParseError::DuplicateTargets { path, targets } => {
                        error!(
                            "manifest at `{}` declares {} {} more than once:",
                            path.style(styles.bold),
                            targets.len().style(styles.count),
                            if targets.len() == 1 { "target" } else { "targets" },
                        );
                        for target in targets {
                            error!(target: NO_HEADING_TARGET, "  - {}", target.style(styles.bold));
                        }
                    }
                }
                err.source()
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse testrun config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::StoreDirCreateError { store_dir, err } => {
                error!(
                    "failed to create store directory at `{}`",
                    store_dir.style(styles.bold)
                );
                Some(err as &dyn Error)
            }
            Self::TestRunnerBuildError { err } => {
                error!("failed to build test runner");
                Some(err as &dyn Error)
            }
            Self::TestRunFailed { err } => match err {
                TestRunnerExecuteError::Interrupted(event) => {
                    error!("test run interrupted by {event}, results are incomplete");
                    None
                }
                TestRunnerExecuteError::FinishRun(write_err) => {
                    error!(
                        "failed to write XML report to `{}`",
                        write_err.path().style(styles.bold)
                    );
                    write_err.source()
                }
                other => {
                    error!("{other}");
                    other.source()
                }
            },
            Self::WriteEventError { err } => {
                error!("failed to write test events to stderr");
                Some(err as &dyn Error)
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
