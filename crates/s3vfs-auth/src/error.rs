//! Error types for SigV4 signing.

/// Errors that can occur while signing an AWS SigV4 request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// A credential or computed value cannot be carried in an HTTP header.
    #[error("Invalid value for header {0}")]
    InvalidHeaderValue(String),
}
