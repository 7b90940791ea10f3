//! S3 XML deserialization: parsing response bodies into Rust types.
//!
//! Only the elements s3vfs needs are read; everything else is skipped, so
//! newer server fields never break parsing.

use quick_xml::Reader;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;

use crate::error::XmlError;
use crate::types::{
    CompleteMultipartUploadResult, ErrorBody, InitiateMultipartUploadResult, ListBucketResult,
    ListedObject,
};

/// Trait for deserializing S3 types from XML.
///
/// The root element has already been consumed by the caller; the
/// implementation reads child elements until the matching end tag.
pub trait S3Deserialize: Sized {
    /// Deserialize an instance from the given XML reader.
    ///
    /// # Errors
    ///
    /// Returns `XmlError` if the XML is malformed or required fields are missing.
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError>;
}

/// Deserialize an S3 XML body into a typed value.
///
/// Finds the root element and delegates to the type's `S3Deserialize` implementation.
///
/// # Errors
///
/// Returns `XmlError` if the XML is malformed or deserialization fails.
pub fn from_xml<T: S3Deserialize>(xml: &[u8]) -> Result<T, XmlError> {
    let mut reader = Reader::from_reader(xml);

    loop {
        match reader.read_event()? {
            Event::Start(_) => {
                return T::deserialize_xml(&mut reader);
            }
            Event::Eof => {
                return Err(XmlError::MissingElement("root element".to_string()));
            }
            _ => {}
        }
    }
}

/// Name of the first element in `xml`, if any.
///
/// S3 may answer a completion request with status 200 and an `<Error>` body,
/// so callers check the root before trusting the status code.
#[must_use]
pub fn root_element_name(xml: &[u8]) -> Option<String> {
    let mut reader = Reader::from_reader(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "Unreadable XML response body");
                return None;
            }
            Ok(_) => {}
        }
    }
}

/// Read the text content of the current element and consume its end tag.
///
/// Entity and character references arrive as separate events and are
/// resolved in place.
fn read_text_content(reader: &mut Reader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();
    loop {
        match reader.read_event()? {
            Event::Text(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::InvalidValue(err.to_string()))?;
                text.push_str(&decoded);
            }
            Event::CData(e) => {
                let decoded = e
                    .decode()
                    .map_err(|err| XmlError::InvalidValue(err.to_string()))?;
                text.push_str(&decoded);
            }
            Event::GeneralRef(e) => {
                if let Some(ch) = e
                    .resolve_char_ref()
                    .map_err(|err| XmlError::InvalidValue(err.to_string()))?
                {
                    text.push(ch);
                } else {
                    let name = e
                        .decode()
                        .map_err(|err| XmlError::InvalidValue(err.to_string()))?;
                    let resolved = resolve_predefined_entity(&name)
                        .ok_or_else(|| XmlError::InvalidValue(format!("unknown entity &{name};")))?;
                    text.push_str(resolved);
                }
            }
            Event::End(_) => {
                return Ok(text);
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while reading text content".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Skip over an element and all its children.
fn skip_element(reader: &mut Reader<&[u8]>) -> Result<(), XmlError> {
    let mut depth: u32 = 1;
    loop {
        match reader.read_event()? {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(
                    "unexpected EOF while skipping element".to_string(),
                ));
            }
            _ => {}
        }
    }
}

/// Parse a boolean from XML text ("true"/"false").
fn parse_bool(s: &str) -> Result<bool, XmlError> {
    match s.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(XmlError::InvalidValue(format!("invalid boolean: {s}"))),
    }
}

/// Parse a u64 from XML text.
fn parse_u64(s: &str) -> Result<u64, XmlError> {
    s.trim()
        .parse::<u64>()
        .map_err(|e| XmlError::InvalidValue(format!("invalid u64 '{s}': {e}")))
}

/// Walk the children of the current element, handing each start tag to `on_child`.
///
/// `on_child` must consume the element it is given (read its text or skip it).
fn for_each_child(
    reader: &mut Reader<&[u8]>,
    context: &str,
    mut on_child: impl FnMut(&mut Reader<&[u8]>, &str) -> Result<(), XmlError>,
) -> Result<(), XmlError> {
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = e.local_name();
                let tag_name = std::str::from_utf8(name.as_ref())
                    .map_err(|e| XmlError::InvalidValue(e.to_string()))?
                    .to_owned();
                on_child(reader, &tag_name)?;
            }
            Event::End(_) => return Ok(()),
            Event::Eof => {
                return Err(XmlError::UnexpectedElement(format!(
                    "unexpected EOF in {context}"
                )));
            }
            _ => {}
        }
    }
}

impl S3Deserialize for ErrorBody {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut body = ErrorBody::default();
        for_each_child(reader, "Error", |reader, tag| {
            match tag {
                "Code" => body.code = read_text_content(reader)?,
                "Message" => body.message = read_text_content(reader)?,
                "Region" => body.region = Some(read_text_content(reader)?),
                "RequestId" => body.request_id = Some(read_text_content(reader)?),
                _ => skip_element(reader)?,
            }
            Ok(())
        })?;
        Ok(body)
    }
}

impl S3Deserialize for InitiateMultipartUploadResult {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut bucket = String::new();
        let mut key = String::new();
        let mut upload_id = None;
        for_each_child(reader, "InitiateMultipartUploadResult", |reader, tag| {
            match tag {
                "Bucket" => bucket = read_text_content(reader)?,
                "Key" => key = read_text_content(reader)?,
                "UploadId" => upload_id = Some(read_text_content(reader)?),
                _ => skip_element(reader)?,
            }
            Ok(())
        })?;

        let upload_id = upload_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| XmlError::MissingElement("UploadId".to_string()))?;
        Ok(InitiateMultipartUploadResult {
            bucket,
            key,
            upload_id,
        })
    }
}

impl S3Deserialize for ListedObject {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut object = ListedObject::default();
        for_each_child(reader, "Contents", |reader, tag| {
            match tag {
                "Key" => object.key = read_text_content(reader)?,
                "Size" => object.size = parse_u64(&read_text_content(reader)?)?,
                _ => skip_element(reader)?,
            }
            Ok(())
        })?;
        Ok(object)
    }
}

impl S3Deserialize for ListBucketResult {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut result = ListBucketResult::default();
        for_each_child(reader, "ListBucketResult", |reader, tag| {
            match tag {
                "Contents" => result.contents.push(ListedObject::deserialize_xml(reader)?),
                "CommonPrefixes" => {
                    for_each_child(reader, "CommonPrefixes", |reader, tag| {
                        if tag == "Prefix" {
                            result.common_prefixes.push(read_text_content(reader)?);
                        } else {
                            skip_element(reader)?;
                        }
                        Ok(())
                    })?;
                }
                "IsTruncated" => result.is_truncated = parse_bool(&read_text_content(reader)?)?,
                "NextContinuationToken" => {
                    let token = read_text_content(reader)?;
                    if !token.is_empty() {
                        result.next_continuation_token = Some(token);
                    }
                }
                _ => skip_element(reader)?,
            }
            Ok(())
        })?;
        Ok(result)
    }
}

impl S3Deserialize for CompleteMultipartUploadResult {
    fn deserialize_xml(reader: &mut Reader<&[u8]>) -> Result<Self, XmlError> {
        let mut result = CompleteMultipartUploadResult::default();
        for_each_child(reader, "CompleteMultipartUploadResult", |reader, tag| {
            match tag {
                "Location" => result.location = Some(read_text_content(reader)?),
                "Bucket" => result.bucket = read_text_content(reader)?,
                "Key" => result.key = read_text_content(reader)?,
                "ETag" => result.etag = Some(read_text_content(reader)?),
                _ => skip_element(reader)?,
            }
            Ok(())
        })?;
        Ok(result)
    }
}
