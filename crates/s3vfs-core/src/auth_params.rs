//! Resolved credentials and endpoint settings for one handle.

use std::fmt;

use s3vfs_auth::SigningCredentials;
use serde::{Deserialize, Serialize};

/// How the bucket is addressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UrlStyle {
    /// `bucket.endpoint/key`.
    #[default]
    #[serde(rename = "vhost")]
    VirtualHost,
    /// `endpoint/bucket/key`.
    #[serde(rename = "path")]
    Path,
}

impl UrlStyle {
    /// Parse `path` or `vhost` (case-insensitive). An empty string is `vhost`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "path" => Some(Self::Path),
            "vhost" | "" => Some(Self::VirtualHost),
            _ => None,
        }
    }
}

impl fmt::Display for UrlStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::VirtualHost => "vhost",
            Self::Path => "path",
        })
    }
}

/// Snapshot of everything needed to address and sign requests for one URL.
///
/// Booleans default to `false`; HTTPS is switched on by the provider default
/// layer of credential resolution, not by this struct.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthParams {
    /// Signing region.
    pub region: String,
    /// Access key ID; empty for anonymous access.
    pub access_key_id: String,
    /// Secret access key; empty for anonymous access.
    pub secret_access_key: String,
    /// Session token for temporary credentials.
    pub session_token: String,
    /// Endpoint host, optionally followed by a path prefix.
    pub endpoint: String,
    /// KMS key for server-side encryption of new objects.
    pub kms_key_id: String,
    /// Bucket addressing style.
    pub url_style: UrlStyle,
    /// Whether to use HTTPS.
    pub use_ssl: bool,
    /// Treat everything after the bucket as the key, `?` included.
    pub s3_url_compatibility_mode: bool,
    /// Send `x-amz-request-payer: requester`.
    pub requester_pays: bool,
}

impl fmt::Debug for AuthParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthParams")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("has_secret_access_key", &!self.secret_access_key.is_empty())
            .field("has_session_token", &!self.session_token.is_empty())
            .field("endpoint", &self.endpoint)
            .field("kms_key_id", &self.kms_key_id)
            .field("url_style", &self.url_style)
            .field("use_ssl", &self.use_ssl)
            .field("s3_url_compatibility_mode", &self.s3_url_compatibility_mode)
            .field("requester_pays", &self.requester_pays)
            .finish()
    }
}

impl AuthParams {
    /// Whether a key pair is present.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.access_key_id.is_empty() || !self.secret_access_key.is_empty()
    }

    /// Credentials for signing an S3 request.
    #[must_use]
    pub fn signing_credentials(&self) -> SigningCredentials<'_> {
        SigningCredentials {
            access_key_id: &self.access_key_id,
            secret_access_key: &self.secret_access_key,
            session_token: &self.session_token,
            region: &self.region,
            service: "s3",
            requester_pays: self.requester_pays,
        }
    }
}
