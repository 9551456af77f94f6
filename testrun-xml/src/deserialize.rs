// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read a `TestsReport` back from XML.

use crate::{
    DeserializeError, TestElement, TestResultElement, TestStatus, TestsReport,
    serialize::{MESSAGE_TAG, STACKTRACE_TAG, TEST_TAG, TESTRESULT_TAG, TESTS_TAG},
};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use std::{io, time::Duration};

/// Where in the document the reader currently is.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Position {
    Document,
    Tests,
    Test,
    TestResult,
    Message,
    Stacktrace,
    Done,
}

pub(crate) fn deserialize_report(reader: impl io::BufRead) -> Result<TestsReport, DeserializeError> {
    let mut reader = Reader::from_reader(reader);
    let mut buf = Vec::new();

    let mut report = TestsReport::new();
    let mut position = Position::Document;
    let mut current_test: Option<TestElement> = None;
    let mut current_result: Option<TestResultElement> = None;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        match event {
            Event::Start(start) => {
                position = match (position, start.name().as_ref()) {
                    (Position::Document, name) if name == TESTS_TAG.as_bytes() => Position::Tests,
                    (Position::Tests, name) if name == TEST_TAG.as_bytes() => {
                        current_test = Some(read_test(&start)?);
                        Position::Test
                    }
                    (Position::Test, name) if name == TESTRESULT_TAG.as_bytes() => {
                        current_result = Some(read_test_result(&start)?);
                        Position::TestResult
                    }
                    (Position::TestResult, name) if name == MESSAGE_TAG.as_bytes() => {
                        Position::Message
                    }
                    (Position::TestResult, name) if name == STACKTRACE_TAG.as_bytes() => {
                        Position::Stacktrace
                    }
                    (_, name) => return Err(unexpected(name)),
                };
            }
            Event::Empty(start) => match (position, start.name().as_ref()) {
                (Position::Document, name) if name == TESTS_TAG.as_bytes() => {
                    position = Position::Done;
                }
                (Position::Tests, name) if name == TEST_TAG.as_bytes() => {
                    report.add_test(read_test(&start)?);
                }
                (Position::Test, name) if name == TESTRESULT_TAG.as_bytes() => {
                    if let Some(test) = &mut current_test {
                        test.add_result(read_test_result(&start)?);
                    }
                }
                (Position::TestResult, name)
                    if name == MESSAGE_TAG.as_bytes() || name == STACKTRACE_TAG.as_bytes() => {}
                (_, name) => return Err(unexpected(name)),
            },
            Event::Text(text) => {
                if let (Position::Message | Position::Stacktrace, Some(result)) =
                    (position, &mut current_result)
                {
                    let text = text.unescape()?;
                    if position == Position::Message {
                        result.message.push_str(&text);
                    } else {
                        result.stacktrace.push_str(&text);
                    }
                }
                // Anything else is whitespace between elements.
            }
            Event::CData(data) => {
                if let (Position::Message | Position::Stacktrace, Some(result)) =
                    (position, &mut current_result)
                {
                    let text = String::from_utf8_lossy(&data);
                    match position {
                        Position::Message => result.message.push_str(&text),
                        _ => result.stacktrace.push_str(&text),
                    }
                }
            }
            Event::End(_) => {
                position = match position {
                    Position::Message | Position::Stacktrace => Position::TestResult,
                    Position::TestResult => {
                        if let (Some(test), Some(result)) =
                            (&mut current_test, current_result.take())
                        {
                            test.add_result(result);
                        }
                        Position::Test
                    }
                    Position::Test => {
                        if let Some(test) = current_test.take() {
                            report.add_test(test);
                        }
                        Position::Tests
                    }
                    Position::Tests => Position::Done,
                    Position::Document | Position::Done => Position::Done,
                };
            }
            Event::Eof => {
                if position == Position::Done {
                    break;
                }
                return Err(DeserializeError::UnexpectedEof);
            }
            // Declarations, comments and processing instructions.
            _ => {}
        }
        buf.clear();
    }

    Ok(report)
}

fn read_test(start: &BytesStart<'_>) -> Result<TestElement, DeserializeError> {
    let mut name = None;
    let mut status = None;
    let mut time = None;
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_ref() {
            b"name" => name = Some(value),
            b"status" => {
                status = Some(value.parse::<TestStatus>().map_err(|value| {
                    DeserializeError::InvalidAttribute {
                        element: "test",
                        attribute: "status",
                        value,
                    }
                })?);
            }
            b"time" => time = Some(parse_time("test", value)?),
            _ => {}
        }
    }

    Ok(TestElement::new(
        name.ok_or_else(|| missing("test", "name"))?,
        status.ok_or_else(|| missing("test", "status"))?,
        time.unwrap_or_default(),
    ))
}

fn read_test_result(start: &BytesStart<'_>) -> Result<TestResultElement, DeserializeError> {
    let mut name = None;
    let mut time = None;
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let value = attr.unescape_value()?.into_owned();
        match attr.key.as_ref() {
            b"name" => name = Some(value),
            b"time" => time = Some(parse_time("testresult", value)?),
            _ => {}
        }
    }

    Ok(TestResultElement::new(
        name.ok_or_else(|| missing("testresult", "name"))?,
        time.unwrap_or_default(),
    ))
}

fn parse_time(element: &'static str, value: String) -> Result<Duration, DeserializeError> {
    match value.parse::<u64>() {
        Ok(millis) => Ok(Duration::from_millis(millis)),
        Err(_) => Err(DeserializeError::InvalidAttribute {
            element,
            attribute: "time",
            value,
        }),
    }
}

fn missing(element: &'static str, attribute: &'static str) -> DeserializeError {
    DeserializeError::MissingAttribute { element, attribute }
}

fn unexpected(name: &[u8]) -> DeserializeError {
    DeserializeError::UnexpectedElement {
        name: String::from_utf8_lossy(name).into_owned(),
    }
}
