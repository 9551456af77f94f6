// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Stable, machine-readable contracts exposed by `testrun`.
//!
//! Scripts driving `testrun` should depend on this crate rather than hardcoding
//! values such as process exit codes.

mod exit_codes;

pub use exit_codes::*;
