// Copyright (c) The junit-spool Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

/// An error that occurs while serializing a [`Report`](crate::Report).
///
/// Returned by [`Report::serialize`](crate::Report::serialize) and
/// [`Report::to_string`](crate::Report::to_string).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SerializeError {
    /// The XML writer failed.
    #[error("error serializing JUnit report")]
    Xml(#[from] quick_xml::Error),

    /// The underlying writer failed.
    #[error("error writing JUnit report")]
    Io(#[from] std::io::Error),

    /// The serialized report was not valid UTF-8.
    #[error("serialized JUnit report is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}
