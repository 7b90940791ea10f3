//! Creation functions for the S3 family of secret types (`s3`, `aws`, `r2`, `gcs`).

use std::collections::BTreeMap;

use crate::env::Environment;
use crate::error::SecretError;
use crate::secret::{CreateSecretInput, KeyValueSecret, SecretValue};

/// Secret types served by this module.
pub const S3_SECRET_TYPES: [&str; 4] = ["s3", "aws", "r2", "gcs"];

/// Options holding string values.
const STRING_OPTIONS: [&str; 7] = [
    "key_id",
    "secret",
    "region",
    "session_token",
    "endpoint",
    "url_style",
    "kms_key_id",
];

/// Options holding boolean values.
const BOOL_OPTIONS: [&str; 3] = ["use_ssl", "url_compatibility_mode", "requester_pays"];

/// Default scope of each S3-family type.
#[must_use]
pub fn default_scope(secret_type: &str) -> Vec<String> {
    let prefixes: &[&str] = match secret_type {
        "s3" => &["s3://", "s3n://", "s3a://"],
        "r2" => &["r2://"],
        "gcs" => &["gcs://", "gs://"],
        _ => &[""],
    };
    prefixes.iter().map(|p| (*p).to_owned()).collect()
}

/// The `config` provider: every value comes from the options.
///
/// # Errors
///
/// Returns [`SecretError::InvalidOption`] for unknown options, wrongly typed
/// booleans, or `refresh` combined with `refresh_info`.
pub fn create_from_config(
    input: &CreateSecretInput,
    _env: &dyn Environment,
) -> Result<KeyValueSecret, SecretError> {
    let mut secret = base_secret(input);
    apply_options(&mut secret, input)?;
    Ok(secret)
}

/// The `credential_chain` provider: seeds key, secret, token and region from
/// the standard AWS environment variables, then applies the options on top.
///
/// The environment is read at every call, so refreshing a secret created this
/// way picks up rotated credentials.
///
/// # Errors
///
/// Same as [`create_from_config`].
pub fn create_from_credential_chain(
    input: &CreateSecretInput,
    env: &dyn Environment,
) -> Result<KeyValueSecret, SecretError> {
    let mut secret = base_secret(input);

    let seeds = [
        ("key_id", env.var("AWS_ACCESS_KEY_ID")),
        ("secret", env.var("AWS_SECRET_ACCESS_KEY")),
        ("session_token", env.var("AWS_SESSION_TOKEN")),
        (
            "region",
            env.var("AWS_REGION")
                .or_else(|| env.var("AWS_DEFAULT_REGION")),
        ),
    ];
    for (key, value) in seeds {
        if let Some(value) = value {
            secret.set(key, value);
        }
    }

    apply_options(&mut secret, input)?;
    Ok(secret)
}

fn base_secret(input: &CreateSecretInput) -> KeyValueSecret {
    let scope = if input.scope.is_empty() {
        default_scope(&input.secret_type)
    } else {
        input.scope.clone()
    };
    let provider = input.provider.as_deref().unwrap_or("config");
    let mut secret = KeyValueSecret::new(&input.name, &input.secret_type, provider, scope);
    secret.redact_keys = ["secret", "session_token"]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect();
    secret
}

fn apply_options(
    secret: &mut KeyValueSecret,
    input: &CreateSecretInput,
) -> Result<(), SecretError> {
    let options = input.lowercase_options();

    if options.contains_key("refresh") && options.contains_key("refresh_info") {
        return Err(SecretError::InvalidOption(
            "Can not set `refresh` and `refresh_info` at the same time".to_owned(),
        ));
    }

    if input.secret_type == "r2" {
        if let Some(account_id) = options.get("account_id") {
            secret.set(
                "endpoint",
                format!("{account_id}.r2.cloudflarestorage.com"),
            );
            secret.set("url_style", "path");
        }
    }

    for (name, value) in &options {
        let name = name.as_str();
        if STRING_OPTIONS.contains(&name) {
            secret.set(name, value.to_string());
        } else if BOOL_OPTIONS.contains(&name) {
            secret.set(name, value.expect_bool(name)?);
        } else if name == "account_id" && input.secret_type == "r2" {
            // Applied above.
        } else if name == "refresh" {
            apply_refresh(secret, value, &options)?;
        } else if name == "refresh_info" {
            let map = value.as_map().ok_or_else(|| {
                SecretError::InvalidOption("Invalid input passed to refresh_info".to_owned())
            })?;
            secret.set("refresh_info", map.clone());
        } else {
            return Err(SecretError::InvalidOption(format!(
                "Unknown named parameter passed to secret creation: {name}"
            )));
        }
    }
    Ok(())
}

fn apply_refresh(
    secret: &mut KeyValueSecret,
    value: &SecretValue,
    options: &BTreeMap<String, &SecretValue>,
) -> Result<(), SecretError> {
    match value.as_str().map(str::to_ascii_lowercase).as_deref() {
        Some("auto") => {
            let replay: BTreeMap<String, String> = options
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect();
            secret.set("refresh", "auto");
            secret.set("refresh_info", replay);
            Ok(())
        }
        Some("disabled") => Ok(()),
        _ => Err(SecretError::InvalidOption(format!(
            "Invalid value for refresh: '{value}', expected 'auto' or 'disabled'"
        ))),
    }
}
