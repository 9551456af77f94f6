// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    DeserializeError, SerializeError, deserialize::deserialize_report, serialize::serialize_report,
};
use std::{fmt, io, str::FromStr, time::Duration};

/// The root `<tests>` element of a report.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestsReport {
    /// The test cases in this report, in the order they were added.
    pub tests: Vec<TestElement>,
}

impl TestsReport {
    /// Creates a new, empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a test case to this report.
    pub fn add_test(&mut self, test: TestElement) -> &mut Self {
        self.tests.push(test);
        self
    }

    /// Adds several test cases to this report.
    pub fn add_tests(&mut self, tests: impl IntoIterator<Item = TestElement>) -> &mut Self {
        self.tests.extend(tests);
        self
    }

    /// Serializes this report to the given writer.
    ///
    /// The writer is not closed or flushed beyond what the XML writer does itself.
    pub fn serialize(&self, writer: impl io::Write) -> Result<(), SerializeError> {
        serialize_report(self, writer)
    }

    /// Serializes this report to a string.
    pub fn to_string(&self) -> Result<String, SerializeError> {
        let mut buf: Vec<u8> = vec![];
        self.serialize(&mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    /// Reads a report from the given reader.
    pub fn deserialize(reader: impl io::BufRead) -> Result<Self, DeserializeError> {
        deserialize_report(reader)
    }

    /// Reads a report from a string.
    pub fn parse_str(s: &str) -> Result<Self, DeserializeError> {
        Self::deserialize(s.as_bytes())
    }
}

/// The status of a `<test>` element.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TestStatus {
    /// Every result in the test case passed.
    Pass,

    /// At least one result in the test case failed.
    Fail,
}

impl TestStatus {
    /// Returns the string used in the `status` attribute.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }

    /// Returns the status for a success flag.
    pub fn from_success(success: bool) -> Self {
        if success { Self::Pass } else { Self::Fail }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASS" => Ok(Self::Pass),
            "FAIL" => Ok(Self::Fail),
            other => Err(other.to_owned()),
        }
    }
}

/// A `<test>` element: a single test case.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TestElement {
    /// The name of the test case.
    pub name: String,

    /// Whether the test case passed.
    pub status: TestStatus,

    /// The total time taken by the test case.
    ///
    /// This is serialized as a whole number of milliseconds.
    pub time: Duration,

    /// The individual results in this test case.
    pub results: Vec<TestResultElement>,
}

impl TestElement {
    /// Creates a new test case element with no results.
    pub fn new(name: impl Into<String>, status: TestStatus, time: Duration) -> Self {
        Self {
            name: name.into(),
            status,
            time,
            results: vec![],
        }
    }

    /// Adds an individual result to this test case.
    pub fn add_result(&mut self, result: TestResultElement) -> &mut Self {
        self.results.push(result);
        self
    }
}

/// A `<testresult>` element: one individual test within a test case.
///
/// The message and stack trace are always serialized, as empty elements if they're absent.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TestResultElement {
    /// The name of the individual test.
    pub name: String,

    /// The time taken by the test, serialized as a whole number of milliseconds.
    pub time: Duration,

    /// The failure message, or empty.
    pub message: String,

    /// The stack trace, or empty.
    pub stacktrace: String,
}

impl TestResultElement {
    /// Creates a new result element with an empty message and stack trace.
    pub fn new(name: impl Into<String>, time: Duration) -> Self {
        Self {
            name: name.into(),
            time,
            message: String::new(),
            stacktrace: String::new(),
        }
    }

    /// Sets the message.
    pub fn set_message(&mut self, message: impl Into<String>) -> &mut Self {
        self.message = message.into();
        self
    }

    /// Sets the stack trace.
    pub fn set_stacktrace(&mut self, stacktrace: impl Into<String>) -> &mut Self {
        self.stacktrace = stacktrace.into();
        self
    }
}
