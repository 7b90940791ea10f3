//! The SigV4 canonical request.
//!
//! ```text
//! METHOD
//! /canonical/uri
//! sorted=query&string=
//! name:value            (one line per signed header)
//!
//! signed;header;names
//! hex(sha256(payload))
//! ```
//!
//! s3vfs signs raw object paths, so the URI is encoded exactly once here with
//! the same rules used for the request URL.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::encoding::url_encode;

/// The parts of a request that enter its canonical form.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalRequest<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Raw (unencoded) path.
    pub path: &'a str,
    /// Encoded query string, in any order.
    pub query: &'a str,
    /// Request headers; names in any case.
    pub headers: &'a [(&'a str, &'a str)],
    /// Lowercase names of the headers to sign.
    pub signed_headers: &'a [&'a str],
    /// Hex SHA-256 of the body.
    pub payload_hash: &'a str,
}

impl CanonicalRequest<'_> {
    /// Hex SHA-256 of the canonical form, as used in the string to sign.
    #[must_use]
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.to_string().as_bytes()))
    }
}

impl fmt::Display for CanonicalRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.method)?;
        writeln!(f, "{}", build_canonical_uri(self.path))?;
        writeln!(f, "{}", build_canonical_query_string(self.query))?;
        for (name, value) in canonical_headers(self.headers, self.signed_headers) {
            writeln!(f, "{name}:{value}")?;
        }
        writeln!(f)?;
        writeln!(f, "{}", build_signed_headers_string(self.signed_headers))?;
        write!(f, "{}", self.payload_hash)
    }
}

/// Canonical request text for the given components.
///
/// # Examples
///
/// ```
/// use s3vfs_auth::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "PUT",
///     "/logs/day 1.csv",
///     "uploadId=abc&partNumber=2",
///     &[("Host", "bucket.s3.amazonaws.com")],
///     &["host"],
///     "UNSIGNED-PAYLOAD",
/// );
/// assert_eq!(
///     canonical,
///     "PUT\n/logs/day%201.csv\npartNumber=2&uploadId=abc\n\
///      host:bucket.s3.amazonaws.com\n\nhost\nUNSIGNED-PAYLOAD"
/// );
/// ```
#[must_use]
pub fn build_canonical_request(
    method: &str,
    path: &str,
    query: &str,
    headers: &[(&str, &str)],
    signed_headers: &[&str],
    payload_hash: &str,
) -> String {
    CanonicalRequest {
        method,
        path,
        query,
        headers,
        signed_headers,
        payload_hash,
    }
    .to_string()
}

/// Encode a raw path for signing; `""` becomes `/`.
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() {
        "/".to_owned()
    } else {
        url_encode(path, false)
    }
}

/// Sort already-encoded query parameters by name, then value.
///
/// A parameter without `=` is given an empty value.
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .filter(|param| !param.is_empty())
        .map(|param| param.split_once('=').unwrap_or((param, "")))
        .collect();
    params.sort_unstable();

    let mut out = String::with_capacity(query.len() + 1);
    for (i, (name, value)) in params.into_iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(name);
        out.push('=');
        out.push_str(value);
    }
    out
}

/// `name:value` lines for the signed headers, sorted by name.
///
/// Names are lowercased, values trimmed with inner whitespace runs collapsed,
/// and repeated headers joined with `,`. Signed names missing from `headers`
/// are left out.
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> String {
    canonical_headers(headers, signed_headers)
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Sorted, `;`-joined signed header names.
///
/// ```
/// use s3vfs_auth::canonical::build_signed_headers_string;
///
/// assert_eq!(build_signed_headers_string(&["x-amz-date", "host"]), "host;x-amz-date");
/// ```
#[must_use]
pub fn build_signed_headers_string(signed_headers: &[&str]) -> String {
    let mut names = signed_headers.to_vec();
    names.sort_unstable();
    names.join(";")
}

fn canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> Vec<(String, String)> {
    let mut names = signed_headers.to_vec();
    names.sort_unstable();
    names.dedup();

    names
        .into_iter()
        .filter_map(|signed| {
            let values: Vec<String> = headers
                .iter()
                .filter(|(name, _)| name.eq_ignore_ascii_case(signed))
                .map(|(_, value)| value.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect();
            (!values.is_empty()).then(|| (signed.to_ascii_lowercase(), values.join(",")))
        })
        .collect()
}
