//! Signed S3 requests over an [`HttpTransport`].

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method};
use s3vfs_auth::{AuthError, SigningRequest, hash_payload, sign_request};
use tracing::debug;

use crate::auth_params::AuthParams;
use crate::classify::classify_error;
use crate::error::{Result, S3FsError};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::url::parse_s3_url;

/// Content type sent with uploaded bodies.
const OCTET_STREAM: &str = "application/octet-stream";

/// Issues signed S3 requests and classifies failures.
#[derive(Debug, Clone)]
pub struct S3Client {
    transport: Arc<dyn HttpTransport>,
}

impl S3Client {
    /// Client sending through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    /// The underlying transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Send one request for `s3_url`.
    ///
    /// `query` is the request's own query string (e.g. `uploads=`); the URL's
    /// option query is never sent. `extra_headers` are signed along with the
    /// standard headers. A non-2xx status is classified into an error.
    pub async fn execute(
        &self,
        method: Method,
        s3_url: &str,
        auth: &AuthParams,
        query: &str,
        extra_headers: &[(&str, &str)],
        body: Bytes,
    ) -> Result<HttpResponse> {
        let parsed = parse_s3_url(s3_url, auth)?;
        let url = parsed.http_url(query);

        let payload_hash = hash_payload(&body);
        let content_type = matches!(method, Method::PUT | Method::POST).then_some(OCTET_STREAM);
        let signing = SigningRequest {
            method: method.as_str(),
            host: &parsed.host,
            path: &parsed.path,
            query,
            payload_hash: &payload_hash,
            content_type,
            extra_headers,
        };
        let mut headers = sign_request(&signing, &auth.signing_credentials(), Utc::now())?;
        // Unsigned requests still carry their functional headers.
        if content_type.is_some() && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM));
        }
        for (name, value) in extra_headers {
            if !headers.contains_key(*name) {
                insert_header(&mut headers, name, value)?;
            }
        }

        debug!(method = %method, url = %url, bytes = body.len(), "Sending S3 request");
        let response = self
            .transport
            .send(HttpRequest {
                method,
                url: url.clone(),
                headers,
                body,
            })
            .await
            .map_err(|e| S3FsError::Transport {
                url: url.clone(),
                message: e.message,
            })?;

        if response.is_success() {
            Ok(response)
        } else {
            debug!(url = %url, status = response.status, "S3 request failed");
            Err(classify_error(auth, response.status, &response.body, &url))
        }
    }

    /// `HEAD` an object.
    pub async fn head(&self, s3_url: &str, auth: &AuthParams) -> Result<HttpResponse> {
        self.execute(Method::HEAD, s3_url, auth, "", &[], Bytes::new())
            .await
    }

    /// `GET` an object, or a listing when `query` is set.
    pub async fn get(&self, s3_url: &str, auth: &AuthParams, query: &str) -> Result<HttpResponse> {
        self.execute(Method::GET, s3_url, auth, query, &[], Bytes::new())
            .await
    }

    /// `GET` `length` bytes starting at `offset`.
    pub async fn get_range(
        &self,
        s3_url: &str,
        auth: &AuthParams,
        offset: u64,
        length: u64,
    ) -> Result<HttpResponse> {
        let end = offset.saturating_add(length);
        let range = format!("bytes={}-{}", offset, end.saturating_sub(1));
        let mut response = self
            .execute(Method::GET, s3_url, auth, "", &[("range", &range)], Bytes::new())
            .await?;
        // A server ignoring the range returns the whole object.
        if response.status == 200 {
            let start = usize::try_from(offset).unwrap_or(usize::MAX).min(response.body.len());
            let end = usize::try_from(end)
                .unwrap_or(usize::MAX)
                .min(response.body.len());
            response.body = response.body.slice(start..end);
        }
        Ok(response)
    }

    /// `PUT` a body.
    pub async fn put(
        &self,
        s3_url: &str,
        auth: &AuthParams,
        query: &str,
        extra_headers: &[(&str, &str)],
        body: Bytes,
    ) -> Result<HttpResponse> {
        self.execute(Method::PUT, s3_url, auth, query, extra_headers, body)
            .await
    }

    /// `POST` a body.
    pub async fn post(
        &self,
        s3_url: &str,
        auth: &AuthParams,
        query: &str,
        extra_headers: &[(&str, &str)],
        body: Bytes,
    ) -> Result<HttpResponse> {
        self.execute(Method::POST, s3_url, auth, query, extra_headers, body)
            .await
    }

    /// `DELETE` an object or an upload.
    pub async fn delete(&self, s3_url: &str, auth: &AuthParams, query: &str) -> Result<HttpResponse> {
        self.execute(Method::DELETE, s3_url, auth, query, &[], Bytes::new())
            .await
    }
}

/// Headers selecting server-side encryption with `kms_key_id`.
#[must_use]
pub fn kms_headers(kms_key_id: &str) -> Vec<(&'static str, String)> {
    if kms_key_id.is_empty() {
        return Vec::new();
    }
    vec![
        ("x-amz-server-side-encryption", "aws:kms".to_owned()),
        (
            "x-amz-server-side-encryption-aws-kms-key-id",
            kms_key_id.to_owned(),
        ),
    ]
}

/// Attach a header to a map.
pub(crate) fn insert_header(headers: &mut HeaderMap, name: &str, value: &str) -> Result<()> {
    let name = http::header::HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| AuthError::InvalidHeaderValue(name.to_owned()))?;
    let value =
        HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeaderValue(name.to_string()))?;
    headers.insert(name, value);
    Ok(())
}
