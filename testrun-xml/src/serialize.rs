// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialize a `TestsReport`.

use crate::{SerializeError, TestElement, TestResultElement, TestsReport};
use quick_xml::{
    Writer,
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
};
use std::{io, time::Duration};

pub(crate) static TESTS_TAG: &str = "tests";
pub(crate) static TEST_TAG: &str = "test";
pub(crate) static TESTRESULT_TAG: &str = "testresult";
pub(crate) static MESSAGE_TAG: &str = "message";
pub(crate) static STACKTRACE_TAG: &str = "stacktrace";

pub(crate) fn serialize_report(
    report: &TestsReport,
    writer: impl io::Write,
) -> Result<(), SerializeError> {
    let mut writer = Writer::new_with_indent(writer, b' ', 4);

    let decl = BytesDecl::new("1.0", Some("UTF-8"), None);
    writer.write_event(Event::Decl(decl))?;

    serialize_report_impl(report, &mut writer)?;

    // Add a trailing newline.
    writer.write_indent()?;
    Ok(())
}

fn serialize_report_impl(
    report: &TestsReport,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    let TestsReport { tests } = report;

    writer.write_event(Event::Start(BytesStart::new(TESTS_TAG)))?;
    for test in tests {
        serialize_test(test, writer)?;
    }
    serialize_end_tag(TESTS_TAG, writer)?;

    Ok(())
}

fn serialize_test(
    test: &TestElement,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    // Use the destructuring syntax to ensure that all fields are handled.
    let TestElement {
        name,
        status,
        time,
        results,
    } = test;

    let mut test_tag = BytesStart::new(TEST_TAG);
    test_tag.push_attribute(("name", name.as_str()));
    test_tag.push_attribute(("status", status.as_str()));
    test_tag.push_attribute(("time", serialize_time(time).as_str()));

    if results.is_empty() {
        writer.write_event(Event::Empty(test_tag))?;
        return Ok(());
    }

    writer.write_event(Event::Start(test_tag))?;
    for result in results {
        serialize_test_result(result, writer)?;
    }
    serialize_end_tag(TEST_TAG, writer)?;

    Ok(())
}

fn serialize_test_result(
    result: &TestResultElement,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    let TestResultElement {
        name,
        time,
        message,
        stacktrace,
    } = result;

    let mut tag = BytesStart::new(TESTRESULT_TAG);
    tag.push_attribute(("name", name.as_str()));
    tag.push_attribute(("time", serialize_time(time).as_str()));
    writer.write_event(Event::Start(tag))?;

    serialize_text_element(MESSAGE_TAG, message, writer)?;
    serialize_text_element(STACKTRACE_TAG, stacktrace, writer)?;

    serialize_end_tag(TESTRESULT_TAG, writer)?;
    Ok(())
}

fn serialize_text_element(
    tag_name: &'static str,
    text: &str,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    writer.write_event(Event::Start(BytesStart::new(tag_name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    serialize_end_tag(tag_name, writer)
}

fn serialize_end_tag(
    tag_name: &'static str,
    writer: &mut Writer<impl io::Write>,
) -> Result<(), SerializeError> {
    writer.write_event(Event::End(BytesEnd::new(tag_name)))?;
    Ok(())
}

// Serialize time as whole milliseconds.
fn serialize_time(time: &Duration) -> String {
    time.as_millis().to_string()
}
