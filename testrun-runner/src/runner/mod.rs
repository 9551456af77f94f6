// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`].

mod imp;
mod pipeline;
mod test_run;
mod transform;

pub use imp::*;
pub use test_run::*;
pub use transform::*;
