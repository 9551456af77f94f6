// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `testrun` invocations.
///
/// A run that completes without infrastructure problems exits with either [`OK`](Self::OK)
/// or [`TEST_FAILURES`](Self::TEST_FAILURES). Anything that prevents a complete report from
/// being produced exits with [`INFRASTRUCTURE_FAILURE`](Self::INFRASTRUCTURE_FAILURE).
pub enum TestRunExitCode {}

impl TestRunExitCode {
    /// Every test result was a success.
    pub const OK: i32 = 0;

    /// The run could not complete: the worker pool failed, the run was interrupted, a
    /// report could not be written, or the coverage report step failed.
    pub const INFRASTRUCTURE_FAILURE: i32 = 1;

    /// One or more test results reported a failure.
    pub const TEST_FAILURES: i32 = 42;

    /// Returns a short, human-readable description of an exit code, if it is documented.
    pub fn describe(code: i32) -> Option<&'static str> {
        match code {
            Self::OK => Some("all tests passed"),
            Self::INFRASTRUCTURE_FAILURE => Some("test run did not complete"),
            Self::TEST_FAILURES => Some("one or more tests failed"),
            _ => None,
        }
    }
}
