// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test targets described by a TOML manifest, run as external processes.
//!
//! A manifest declares one `[[target]]` per test target:
//!
//! ```toml
//! [[target]]
//! name = "//app:unit"
//! command = "./run-unit-tests.sh"
//! args = ["--fast"]
//! env = { RUST_LOG = "debug" }
//! streaming = true
//! inputs = ["app/src/lib.rs"]
//! ```
//!
//! Every target becomes a [`ManifestTestRule`]. The [`ManifestBuildEngine`] treats every target as
//! prebuilt, and derives rule keys from each target's command line, environment and input files.

mod build_engine;
mod imp;
mod rule;

pub use build_engine::*;
pub use imp::*;
pub use rule::*;
