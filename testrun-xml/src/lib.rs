// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Generate and read `testrun` XML reports.
//!
//! The format is intentionally small: a root `<tests>` element containing one `<test>` element
//! per test case, each of which contains one `<testresult>` element per individual test.
//!
//! ```xml
//! <tests>
//!     <test name="com.example.FooTest" status="FAIL" time="200">
//!         <testresult name="testBar" time="200">
//!             <message>expected 1 but was 2</message>
//!             <stacktrace>...</stacktrace>
//!         </testresult>
//!     </test>
//! </tests>
//! ```
//!
//! Times are serialized as whole milliseconds.

mod deserialize;
mod errors;
mod report;
mod serialize;

pub use errors::*;
pub use report::*;
