//! XML bodies exchanged with S3-compatible services.
//!
//! S3 speaks RestXml: requests that carry structure (completing a multipart
//! upload) send XML, and responses (errors, upload IDs, list pages) come back
//! as XML. This crate maps those bodies to typed structs.
//!
//! # Key components
//!
//! - [`S3Deserialize`] trait and [`from_xml`] for parsing response bodies
//! - [`S3Serialize`] trait and [`to_xml`] for building request bodies
//! - [`types`] for the typed views themselves

pub mod deserialize;
pub mod error;
pub mod serialize;
pub mod types;

pub use deserialize::{S3Deserialize, from_xml, root_element_name};
pub use error::XmlError;
pub use serialize::{S3_NAMESPACE, S3Serialize, complete_multipart_upload_xml, to_xml};
pub use types::{
    CompleteMultipartUpload, CompleteMultipartUploadResult, CompletedPart, ErrorBody,
    InitiateMultipartUploadResult, ListBucketResult, ListedObject,
};
