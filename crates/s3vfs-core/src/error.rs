//! File system error types.
//!
//! Defines [`S3FsError`], the error returned by every s3vfs file system
//! operation. Each variant names the resource it concerns (URL, secret name
//! or path). Upload worker failures are shared behind an [`Arc`] so the same
//! cause can be re-raised from every later call on the handle.
//!
//! # Usage
//!
//! ```
//! use s3vfs_core::error::S3FsError;
//!
//! let err = S3FsError::NotFound {
//!     url: "https://bucket.s3.amazonaws.com/missing.csv".to_owned(),
//! };
//! assert!(err.to_string().contains("missing.csv"));
//! ```

use std::sync::Arc;

use s3vfs_auth::AuthError;
use s3vfs_secrets::SecretError;
use s3vfs_xml::XmlError;

/// Convenience alias for results of file system operations.
pub type Result<T, E = S3FsError> = std::result::Result<T, E>;

/// Error type of every s3vfs file system operation.
#[derive(Debug, thiserror::Error)]
pub enum S3FsError {
    // -----------------------------------------------------------------------
    // Input errors
    // -----------------------------------------------------------------------
    /// The URL does not have the `scheme://bucket/key` shape.
    #[error("Malformed URL '{url}': {reason}")]
    MalformedUrl {
        /// The offending URL.
        url: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An option is unknown or has an invalid value.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// A local file could not be read or written.
    #[error("I/O error on '{path}': {message}")]
    Io {
        /// The file path.
        path: String,
        /// Underlying error message.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Remote errors
    // -----------------------------------------------------------------------
    /// The service rejected the credentials (HTTP 401/403).
    #[error("HTTP {status} Authentication Failure for {url}: {message}\n{hint}")]
    AuthFailure {
        /// Request URL.
        url: String,
        /// HTTP status.
        status: u16,
        /// S3 error code, empty if the body had none.
        code: String,
        /// S3 error message, empty if the body had none.
        message: String,
        /// Operator guidance derived from the credentials in use.
        hint: String,
        /// Whether a key pair was used.
        credentials_provided: bool,
        /// Whether a session token was used.
        session_token_provided: bool,
        /// Whether requester-pays was requested.
        requester_pays: bool,
    },

    /// The service answered HTTP 400.
    #[error("HTTP 400 Bad Request for {url}: {message}\n{hint}")]
    BadRequest {
        /// Request URL.
        url: String,
        /// S3 error message, empty if the body had none.
        message: String,
        /// Operator guidance, e.g. the region in use.
        hint: String,
    },

    /// The object does not exist (HTTP 404).
    #[error("HTTP 404 Not Found: {url}")]
    NotFound {
        /// Request URL.
        url: String,
    },

    /// Any other non-success HTTP status.
    #[error("HTTP {status} for {url}: {body}")]
    Http {
        /// HTTP status.
        status: u16,
        /// Request URL.
        url: String,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The HTTP transport failed before a response arrived.
    #[error("Request to {url} failed: {message}")]
    Transport {
        /// Request URL.
        url: String,
        /// Transport error message.
        message: String,
    },

    /// The response was well-formed HTTP but not what the operation expects.
    #[error("Unexpected response from {url}: {message}")]
    UnexpectedResponse {
        /// Request URL.
        url: String,
        /// What was wrong.
        message: String,
    },

    // -----------------------------------------------------------------------
    // Upload errors
    // -----------------------------------------------------------------------
    /// A multipart upload is missing the etag of a part.
    #[error("Incomplete multipart upload of '{path}': part {part} has no etag")]
    IncompleteUpload {
        /// Object path.
        path: String,
        /// 1-based part number lacking an etag.
        part: u32,
    },

    /// Writes to an S3 handle must be sequential.
    #[error("Non-sequential write to '{path}': expected offset {expected}, got {offset}")]
    NonSequentialWrite {
        /// Object path.
        path: String,
        /// Offset the next write must use.
        expected: u64,
        /// Offset that was requested.
        offset: u64,
    },

    /// The write would need more parts than allowed.
    #[error(
        "Writing to '{path}' would exceed the maximum of {max_parts} parts; \
         increase the part limit or the maximum file size"
    )]
    FileTooLarge {
        /// Object path.
        path: String,
        /// Part limit in effect.
        max_parts: u64,
    },

    /// The operation does not fit the handle's current state.
    #[error("Invalid state for '{path}': {message}")]
    InvalidState {
        /// Object path.
        path: String,
        /// What was attempted.
        message: String,
    },

    /// A part upload failed; the cause is shared by every later call.
    #[error("Upload of part {part} of '{path}' failed: {source}")]
    UploadFailed {
        /// Object path.
        path: String,
        /// 1-based part number.
        part: u32,
        /// The worker's error.
        #[source]
        source: Arc<S3FsError>,
    },

    /// The operation is not supported by this file system.
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    // -----------------------------------------------------------------------
    // Wrapped errors
    // -----------------------------------------------------------------------
    /// Re-creating a refreshable secret failed.
    #[error(
        "Exception thrown while trying to refresh secret {name}. To fix this, please recreate or \
         remove the secret and try again. Error: '{message}'"
    )]
    RefreshFailure {
        /// Secret name.
        name: String,
        /// Message of the creation error.
        message: String,
    },

    /// Any other secret store error.
    #[error(transparent)]
    Secret(SecretError),

    /// A request could not be signed.
    #[error("Failed to sign request: {0}")]
    Signing(#[from] AuthError),

    /// An XML body could not be built or parsed.
    #[error("XML error: {0}")]
    Xml(#[from] XmlError),
}

impl From<SecretError> for S3FsError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::InvalidOption(message) => Self::InvalidOption(message),
            SecretError::Io { ref path, .. } => Self::Io {
                path: path.clone(),
                message: err.to_string(),
            },
            SecretError::RefreshFailure { name, message } => Self::RefreshFailure { name, message },
            other => Self::Secret(other),
        }
    }
}

impl S3FsError {
    /// Whether this is an authentication failure that a secret refresh may fix.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailure { .. })
    }

    /// Whether this is a 404.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
