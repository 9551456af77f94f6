// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code to generate XML reports from test results.

use crate::{errors::WriteXmlError, test_results::TestResults};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::Utf8Path;
use std::io;
use testrun_xml::{SerializeError, TestElement, TestResultElement, TestStatus, TestsReport};
use tracing::debug;

/// Converts results into an XML report.
///
/// Every test case of every target becomes one `<test>` element, in order.
pub fn to_xml_report(results: &[TestResults]) -> TestsReport {
    let mut report = TestsReport::new();
    for case in results.iter().flat_map(|results| &results.test_cases) {
        let mut test = TestElement::new(
            &case.test_case_name,
            TestStatus::from_success(case.is_success()),
            case.total_time(),
        );
        for result in &case.results {
            let mut element = TestResultElement::new(&result.test_name, result.time);
            if let Some(message) = &result.message {
                element.set_message(message);
            }
            if let Some(stack_trace) = &result.stack_trace {
                element.set_stacktrace(stack_trace);
            }
            test.add_result(element);
        }
        report.add_test(test);
    }
    report
}

/// Writes an XML report for `results` to `writer`.
///
/// The writer is not closed.
pub fn write_xml_output(
    results: &[TestResults],
    writer: impl io::Write,
) -> Result<(), SerializeError> {
    to_xml_report(results).serialize(writer)
}

/// Atomically writes an XML report for `results` to `path`, replacing any existing file.
pub fn write_xml_file(results: &[TestResults], path: &Utf8Path) -> Result<(), WriteXmlError> {
    debug!(%path, "writing XML report");
    let report = to_xml_report(results);
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|file| report.serialize(file))
        .map_err(|error| WriteXmlError::new(path, error))
}
