// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for testrun.
//!
//! Repository configuration lives in `.config/testrun.toml`, and is layered on top of
//! [the default config](TestrunConfig::DEFAULT_CONFIG).

mod imp;
mod test_threads;

pub use imp::*;
pub use test_threads::*;
