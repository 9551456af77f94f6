// Copyright (c) The testrun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// An error that occurs while serializing a [`TestsReport`](crate::TestsReport).
///
/// Returned by [`TestsReport::serialize`](crate::TestsReport::serialize) and
/// [`TestsReport::to_string`](crate::TestsReport::to_string).
#[derive(Debug, Error)]
pub enum SerializeError {
    /// The underlying writer failed.
    #[error("error writing XML report")]
    Io(#[from] std::io::Error),

    /// The XML writer failed.
    #[error("error serializing XML report")]
    Xml(#[from] quick_xml::Error),

    /// The serialized output was not valid UTF-8.
    #[error("serialized XML report is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// An error that occurs while reading a [`TestsReport`](crate::TestsReport) back from XML.
#[derive(Debug, Error)]
pub enum DeserializeError {
    /// The XML could not be parsed.
    #[error("error parsing XML report")]
    Xml(#[from] quick_xml::Error),

    /// An element was missing a required attribute.
    #[error("element <{element}> is missing required attribute `{attribute}`")]
    MissingAttribute {
        /// The element name.
        element: &'static str,
        /// The attribute name.
        attribute: &'static str,
    },

    /// An attribute had a value that could not be interpreted.
    #[error("element <{element}> has invalid value for `{attribute}`: {value}")]
    InvalidAttribute {
        /// The element name.
        element: &'static str,
        /// The attribute name.
        attribute: &'static str,
        /// The value that was found.
        value: String,
    },

    /// An element appeared somewhere it isn't allowed.
    #[error("unexpected element <{name}>")]
    UnexpectedElement {
        /// The element name, lossily decoded.
        name: String,
    },

    /// The document ended before the root element was closed.
    #[error("unexpected end of document")]
    UnexpectedEof,
}
