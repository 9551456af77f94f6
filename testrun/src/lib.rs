// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `testrun` command-line interface.
//!
//! `testrun run` reads a manifest of test targets, replays results from previous runs where the
//! targets haven't changed, runs the rest, and exits with a code from
//! [`TestRunExitCode`](testrun_metadata::TestRunExitCode).

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::*;
