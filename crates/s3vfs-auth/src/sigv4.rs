//! AWS Signature Version 4 signing.
//!
//! Signing an outgoing request:
//!
//! 1. Compute the payload hash and timestamp headers.
//! 2. Build the canonical request from method, path, query and the signed headers.
//! 3. Build the string to sign from the timestamp, credential scope, and canonical request hash.
//! 4. Derive the signing key using HMAC-SHA256 from the secret key and credential scope components.
//! 5. Emit the `Authorization` header.

use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use http::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::canonical::{CanonicalRequest, build_signed_headers_string};
use crate::error::AuthError;

/// The only algorithm supported by this implementation.
const SUPPORTED_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// SHA-256 of the empty payload.
pub const EMPTY_PAYLOAD_HASH: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

type HmacSha256 = Hmac<Sha256>;

/// Credential material and scope used to sign one request.
#[derive(Clone, Copy)]
pub struct SigningCredentials<'a> {
    /// Access key ID. Empty together with `secret_access_key` means "unsigned".
    pub access_key_id: &'a str,
    /// Secret access key.
    pub secret_access_key: &'a str,
    /// Session token for temporary credentials; empty when absent.
    pub session_token: &'a str,
    /// Region of the credential scope.
    pub region: &'a str,
    /// Service of the credential scope (`s3`).
    pub service: &'a str,
    /// Whether to send and sign `x-amz-request-payer: requester`.
    pub requester_pays: bool,
}

impl std::fmt::Debug for SigningCredentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("has_session_token", &!self.session_token.is_empty())
            .field("region", &self.region)
            .field("service", &self.service)
            .field("requester_pays", &self.requester_pays)
            .finish()
    }
}

impl SigningCredentials<'_> {
    /// Whether any key material is present.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.access_key_id.is_empty() && self.secret_access_key.is_empty()
    }
}

/// The parts of an outgoing request covered by the signature.
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Value of the `Host` header.
    pub host: &'a str,
    /// Raw (unencoded) request path.
    pub path: &'a str,
    /// Encoded query string without the leading `?`.
    pub query: &'a str,
    /// Hex SHA-256 of the body.
    pub payload_hash: &'a str,
    /// `Content-Type` to sign, if the request carries a body.
    pub content_type: Option<&'a str>,
    /// Additional headers to send and sign, names in lowercase.
    pub extra_headers: &'a [(&'a str, &'a str)],
}

/// Sign a request and return the headers to attach to it.
///
/// Anonymous credentials (no access key and no secret) produce only the
/// `Host` header so public buckets can be read without signing.
///
/// # Errors
///
/// Returns [`AuthError::InvalidHeaderValue`] if a credential contains bytes
/// that cannot appear in an HTTP header.
pub fn sign_request(
    request: &SigningRequest<'_>,
    creds: &SigningCredentials<'_>,
    now: DateTime<Utc>,
) -> Result<HeaderMap, AuthError> {
    let mut headers = HeaderMap::new();
    insert_header(&mut headers, "host", request.host)?;

    if creds.is_anonymous() {
        return Ok(headers);
    }

    let date = now.format("%Y%m%d").to_string();
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();

    let mut pairs: Vec<(&str, &str)> = vec![
        ("host", request.host),
        ("x-amz-content-sha256", request.payload_hash),
        ("x-amz-date", &timestamp),
    ];
    if let Some(content_type) = request.content_type {
        pairs.push(("content-type", content_type));
    }
    if !creds.session_token.is_empty() {
        pairs.push(("x-amz-security-token", creds.session_token));
    }
    if creds.requester_pays {
        pairs.push(("x-amz-request-payer", "requester"));
    }
    pairs.extend_from_slice(request.extra_headers);
    let signed: Vec<&str> = pairs.iter().map(|(name, _)| *name).collect();

    let canonical_hash = CanonicalRequest {
        method: request.method,
        path: request.path,
        query: request.query,
        headers: &pairs,
        signed_headers: &signed,
        payload_hash: request.payload_hash,
    }
    .digest();

    let credential_scope = format!("{date}/{}/{}/aws4_request", creds.region, creds.service);
    let string_to_sign = build_string_to_sign(&timestamp, &credential_scope, &canonical_hash);
    let signing_key =
        derive_signing_key(creds.secret_access_key, &date, creds.region, creds.service);
    let signature = compute_signature(&signing_key, &string_to_sign);

    debug!(
        method = request.method,
        host = request.host,
        path = request.path,
        region = creds.region,
        "Signed S3 request"
    );

    for (name, value) in &pairs {
        if *name != "host" {
            insert_header(&mut headers, name, value)?;
        }
    }
    let authorization = format!(
        "{SUPPORTED_ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={}, Signature={signature}",
        creds.access_key_id,
        build_signed_headers_string(&signed),
    );
    insert_header(&mut headers, "authorization", &authorization)?;

    Ok(headers)
}

/// Build the SigV4 string to sign.
///
/// Format:
/// ```text
/// AWS4-HMAC-SHA256\n
/// <ISO8601 timestamp>\n
/// <credential_scope>\n
/// <hex(SHA256(canonical_request))>
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{SUPPORTED_ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the SigV4 signing key using HMAC-SHA256 chain.
///
/// ```text
/// DateKey              = HMAC-SHA256("AWS4" + secret_key, date)
/// DateRegionKey        = HMAC-SHA256(DateKey, region)
/// DateRegionServiceKey = HMAC-SHA256(DateRegionKey, service)
/// SigningKey           = HMAC-SHA256(DateRegionServiceKey, "aws4_request")
/// ```
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, b"aws4_request")
}

/// Compute the HMAC-SHA256 signature of `data` using the given `signing_key`.
///
/// Returns the hex-encoded signature.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// Compute the SHA-256 hash of the given payload and return it as a hex string.
///
/// # Examples
///
/// ```
/// use s3vfs_auth::sigv4::{EMPTY_PAYLOAD_HASH, hash_payload};
///
/// assert_eq!(hash_payload(b""), EMPTY_PAYLOAD_HASH);
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), AuthError> {
    let header_name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| AuthError::InvalidHeaderValue(name.to_owned()))?;
    let header_value =
        HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeaderValue(name.to_owned()))?;
    headers.insert(header_name, header_value);
    Ok(())
}

/// Compute HMAC-SHA256 and return the raw bytes.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
