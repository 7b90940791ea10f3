//! Mapping of failed HTTP responses to [`S3FsError`] variants.

use s3vfs_xml::{ErrorBody, from_xml};

use crate::auth_params::AuthParams;
use crate::error::S3FsError;

/// Longest response body kept in [`S3FsError::Http`].
const MAX_BODY_IN_ERROR: usize = 1024;

/// Classify a non-success response.
///
/// An S3 `<Error>` body is parsed when present. 400 becomes
/// [`S3FsError::BadRequest`], 401 and 403 [`S3FsError::AuthFailure`], 404
/// [`S3FsError::NotFound`], anything else [`S3FsError::Http`].
#[must_use]
pub fn classify_error(auth: &AuthParams, status: u16, body: &[u8], url: &str) -> S3FsError {
    let parsed = if body.is_empty() {
        None
    } else {
        from_xml::<ErrorBody>(body).ok()
    };
    let message = parsed
        .as_ref()
        .map(|error| error.message.clone())
        .unwrap_or_default();

    match status {
        400 => S3FsError::BadRequest {
            url: url.to_owned(),
            message,
            hint: format!(
                "Bad Request - this can be caused by the S3 region being set incorrectly. \
                 Provided region is \"{}\"",
                auth.region
            ),
        },
        401 | 403 => S3FsError::AuthFailure {
            url: url.to_owned(),
            status,
            code: parsed.map(|error| error.code).unwrap_or_default(),
            message,
            hint: auth_hint(auth),
            credentials_provided: auth.has_credentials(),
            session_token_provided: !auth.session_token.is_empty(),
            requester_pays: auth.requester_pays,
        },
        404 => S3FsError::NotFound {
            url: url.to_owned(),
        },
        _ => S3FsError::Http {
            status,
            url: url.to_owned(),
            body: truncated(body),
        },
    }
}

fn auth_hint(auth: &AuthParams) -> String {
    let mut hint = if auth.has_credentials() {
        format!(
            "Authentication failed using access key \"{}\" in region \"{}\". \
             Check that the credentials are valid and allowed to access this object.",
            auth.access_key_id, auth.region
        )
    } else {
        "No credentials are provided. If the object is not public, create a secret \
         or set the AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables."
            .to_owned()
    };
    if !auth.session_token.is_empty() {
        hint.push_str(" A session token is in use; it may have expired.");
    }
    if auth.requester_pays {
        hint.push_str(" Requester pays is enabled.");
    }
    hint
}

fn truncated(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_BODY_IN_ERROR {
        return text.into_owned();
    }
    let mut end = MAX_BODY_IN_ERROR;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
