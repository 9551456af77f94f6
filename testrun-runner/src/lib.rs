// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for testrun.
//!
//! The basic flow of a test run is:
//!
//! 1. For every [`TestRule`](rule::TestRule), decide whether its tests need to run or whether
//!    results from a previous run can be replayed ([`cache`]).
//! 2. Build one [`TestRun`](runner::TestRun) per rule and hand them all to the
//!    [`TestRunner`](runner::TestRunner), which runs the parallel group through a bounded queue,
//!    then the serial group one at a time.
//! 3. Every result is stamped with a sequence number as it resolves, and execution errors are
//!    turned into failing results.
//! 4. The results are reduced to an exit code, optionally written out as XML, and a coverage report
//!    is generated if requested ([`aggregator`]).

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod coverage;
pub mod errors;
mod helpers;
pub mod manifest;
pub mod reporter;
pub mod rule;
pub mod runner;
pub mod signal;
pub mod step;
mod stopwatch;
pub mod target;
pub mod test_results;
