//! Errors raised while reading S3 response bodies or writing request bodies.

use std::io;

/// An S3 XML body could not be read or written.
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    /// Writing a request body failed.
    #[error("failed to write XML body: {0}")]
    Io(#[from] io::Error),

    /// The body is not well-formed XML.
    #[error("malformed XML body: {0}")]
    Syntax(#[from] quick_xml::Error),

    /// An element the response must carry is absent or empty.
    #[error("response is missing <{0}>")]
    MissingElement(String),

    /// An element appeared where the format does not allow it.
    #[error("unexpected element <{0}> in response")]
    UnexpectedElement(String),

    /// Element text could not be converted to the expected type.
    #[error("invalid element value: {0}")]
    InvalidValue(String),
}
