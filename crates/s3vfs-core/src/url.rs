//! S3 URL parsing.
//!
//! Turns `s3://bucket/key?options` into the host, path and query needed to
//! address the object over HTTP, honouring the endpoint, URL style and SSL
//! settings of the resolved [`AuthParams`].

use s3vfs_auth::url_encode;

use crate::auth_params::{AuthParams, UrlStyle};
use crate::error::{Result, S3FsError};

/// URL prefixes served by the S3 file system.
pub const S3_PREFIXES: [&str; 6] = ["s3://", "s3a://", "s3n://", "r2://", "gcs://", "gs://"];

/// Endpoint that means "not configured".
const DEFAULT_AWS_ENDPOINT: &str = "s3.amazonaws.com";
/// Endpoint of Google Cloud Storage's S3-compatible API.
const GCS_ENDPOINT: &str = "storage.googleapis.com";

/// An S3 URL split into the parts an HTTP request needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedS3Url {
    /// `https://` or `http://`.
    pub http_proto: String,
    /// The matched scheme prefix, e.g. `s3://`.
    pub prefix: String,
    /// Host to connect to (bucket-prefixed in virtual-host style).
    pub host: String,
    /// Bucket name.
    pub bucket: String,
    /// Object key with its leading `/`.
    pub key: String,
    /// Raw request path: endpoint path prefix, bucket in path style, then key.
    pub path: String,
    /// Query string split off the URL, without `?`.
    pub query_param: String,
    /// The URL without its query string.
    pub trimmed_s3_url: String,
}

impl ParsedS3Url {
    /// HTTP URL of the object with `query` appended when non-empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3vfs_core::auth_params::AuthParams;
    /// use s3vfs_core::url::parse_s3_url;
    ///
    /// let auth = AuthParams {
    ///     endpoint: "s3.amazonaws.com".to_owned(),
    ///     use_ssl: true,
    ///     ..AuthParams::default()
    /// };
    /// let parsed = parse_s3_url("s3://bucket/dir/a b.csv", &auth).unwrap();
    /// assert_eq!(
    ///     parsed.http_url("partNumber=1"),
    ///     "https://bucket.s3.amazonaws.com/dir/a%20b.csv?partNumber=1"
    /// );
    /// ```
    #[must_use]
    pub fn http_url(&self, query: &str) -> String {
        let mut url = format!(
            "{}{}{}",
            self.http_proto,
            self.host,
            url_encode(&self.path, false)
        );
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    /// `prefix + bucket + key`, the canonical form of the object URL.
    #[must_use]
    pub fn object_url(&self) -> String {
        format!("{}{}{}", self.prefix, self.bucket, self.key)
    }
}

/// The matching S3 prefix of `url`, if any.
#[must_use]
pub fn s3_prefix(url: &str) -> Option<&'static str> {
    S3_PREFIXES
        .iter()
        .copied()
        .find(|prefix| url.starts_with(prefix))
}

/// Query string of an S3 URL: everything after the first `?` following the bucket.
#[must_use]
pub fn query_string(url: &str) -> Option<&str> {
    let prefix = s3_prefix(url)?;
    let slash = url[prefix.len()..].find('/')? + prefix.len();
    url[slash..].split_once('?').map(|(_, query)| query)
}

/// Parse an S3 URL against the resolved `auth`.
///
/// # Errors
///
/// Returns [`S3FsError::MalformedUrl`] for an unknown prefix, a missing `/`
/// after the bucket, or an empty bucket.
pub fn parse_s3_url(url: &str, auth: &AuthParams) -> Result<ParsedS3Url> {
    let malformed = |reason: &str| S3FsError::MalformedUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };

    let prefix = s3_prefix(url)
        .ok_or_else(|| malformed("URL needs to start with s3://, gcs:// or r2://"))?;
    let mut endpoint = auth.endpoint.as_str();
    if matches!(prefix, "gcs://" | "gs://") && endpoint == DEFAULT_AWS_ENDPOINT {
        endpoint = GCS_ENDPOINT;
    }

    let rest = &url[prefix.len()..];
    let slash = rest
        .find('/')
        .ok_or_else(|| malformed("URL needs to contain a '/' after the host"))?;
    let bucket = &rest[..slash];
    if bucket.is_empty() {
        return Err(malformed("URL needs to contain a bucket name"));
    }

    let after_bucket = &rest[slash..];
    let (key, query_param) = if auth.s3_url_compatibility_mode {
        (after_bucket, "")
    } else {
        after_bucket.split_once('?').unwrap_or((after_bucket, ""))
    };

    let (endpoint_host, endpoint_path) = match endpoint.find('/') {
        Some(pos) => endpoint.split_at(pos),
        None => (endpoint, ""),
    };

    let (host, mut path) = match auth.url_style {
        UrlStyle::VirtualHost => (format!("{bucket}.{endpoint_host}"), endpoint_path.to_owned()),
        UrlStyle::Path => (endpoint_host.to_owned(), format!("{endpoint_path}/{bucket}")),
    };
    path.push_str(key);

    Ok(ParsedS3Url {
        http_proto: if auth.use_ssl { "https://" } else { "http://" }.to_owned(),
        prefix: prefix.to_owned(),
        host,
        bucket: bucket.to_owned(),
        key: key.to_owned(),
        path,
        query_param: query_param.to_owned(),
        trimmed_s3_url: format!("{prefix}{bucket}{key}"),
    })
}
