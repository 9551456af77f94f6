// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decide whether a test target needs to run, or whether its results from a previous run can be
//! replayed.
//!
//! The main entry point is [`is_test_run_required`].

mod decision;
mod rule_key;

pub use decision::*;
pub use rule_key::*;
