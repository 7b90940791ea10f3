//! S3 XML serialization: request bodies sent by s3vfs.

use std::io::{self, Write};

use quick_xml::Writer;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesDecl, BytesText, Event};

use crate::error::XmlError;
use crate::types::{CompleteMultipartUpload, CompletedPart};

/// The S3 XML namespace.
pub const S3_NAMESPACE: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Trait for serializing S3 types to XML.
///
/// Implementors write their content as child elements inside the current XML context.
/// The root element name and namespace are handled by the top-level [`to_xml`] function.
pub trait S3Serialize {
    /// Serialize this value as XML child elements into the given writer.
    ///
    /// # Errors
    ///
    /// Returns `io::Error` if writing to the underlying writer fails.
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()>;
}

/// Serialize a value as S3-compatible XML with declaration and namespace.
///
/// # Errors
///
/// Returns `XmlError` if serialization fails.
pub fn to_xml<T: S3Serialize>(root_element: &str, value: &T) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::with_capacity(512);
    let mut writer = Writer::new(&mut buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer
        .create_element(root_element)
        .with_attribute(("xmlns", S3_NAMESPACE))
        .write_inner_content(|w| value.serialize_xml(w))?;

    Ok(buf)
}

impl S3Serialize for CompletedPart {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        writer.create_element("Part").write_inner_content(|w| {
            // ETags keep their literal quotes.
            w.create_element("ETag")
                .write_text_content(BytesText::from_escaped(partial_escape(&self.etag)))?;
            w.create_element("PartNumber")
                .write_text_content(BytesText::new(&self.part_number.to_string()))?;
            Ok(())
        })?;
        Ok(())
    }
}

impl S3Serialize for CompleteMultipartUpload {
    fn serialize_xml<W: Write>(&self, writer: &mut Writer<W>) -> io::Result<()> {
        for part in &self.parts {
            part.serialize_xml(writer)?;
        }
        Ok(())
    }
}

/// Build the body of a `CompleteMultipartUpload` request.
///
/// # Errors
///
/// Returns `XmlError` if serialization fails.
pub fn complete_multipart_upload_xml(body: &CompleteMultipartUpload) -> Result<Vec<u8>, XmlError> {
    to_xml("CompleteMultipartUpload", body)
}
