//! Credential resolution.
//!
//! [`CredentialResolver`] asks an ordered list of [`CredentialSource`]s for
//! partial settings and merges them field by field; the first source to set
//! a field wins. The default order is URL query options, the best-matching
//! secret, environment variables, then the provider defaults of
//! [`S3Settings`].

use std::fmt;

use s3vfs_secrets::s3::S3_SECRET_TYPES;
use s3vfs_secrets::{Environment, KeyValueSecret, SecretManager};
use tracing::debug;

use crate::auth_params::{AuthParams, UrlStyle};
use crate::config::S3Settings;
use crate::error::{Result, S3FsError};
use crate::url::query_string;

/// Everything a source may look at while resolving one URL.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// The URL being opened, query string included.
    pub url: &'a str,
    /// The secret store.
    pub secrets: &'a SecretManager,
    /// Environment variables.
    pub env: &'a dyn Environment,
    /// File system settings, for provider defaults.
    pub settings: &'a S3Settings,
}

/// [`AuthParams`] with every field optional.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PartialAuthParams {
    /// Signing region.
    pub region: Option<String>,
    /// Access key ID.
    pub access_key_id: Option<String>,
    /// Secret access key.
    pub secret_access_key: Option<String>,
    /// Session token.
    pub session_token: Option<String>,
    /// Endpoint host and optional path prefix.
    pub endpoint: Option<String>,
    /// KMS key for server-side encryption.
    pub kms_key_id: Option<String>,
    /// Bucket addressing style.
    pub url_style: Option<UrlStyle>,
    /// Whether to use HTTPS.
    pub use_ssl: Option<bool>,
    /// Treat `?` as part of the key.
    pub s3_url_compatibility_mode: Option<bool>,
    /// Send the requester-pays header.
    pub requester_pays: Option<bool>,
}

impl fmt::Debug for PartialAuthParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartialAuthParams")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("has_secret_access_key", &self.secret_access_key.is_some())
            .field("has_session_token", &self.session_token.is_some())
            .field("endpoint", &self.endpoint)
            .field("kms_key_id", &self.kms_key_id)
            .field("url_style", &self.url_style)
            .field("use_ssl", &self.use_ssl)
            .field("s3_url_compatibility_mode", &self.s3_url_compatibility_mode)
            .field("requester_pays", &self.requester_pays)
            .finish()
    }
}

impl PartialAuthParams {
    /// Fill every unset field from `other`.
    pub fn merge(&mut self, other: Self) {
        fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
            if slot.is_none() {
                *slot = value;
            }
        }
        fill(&mut self.region, other.region);
        fill(&mut self.access_key_id, other.access_key_id);
        fill(&mut self.secret_access_key, other.secret_access_key);
        fill(&mut self.session_token, other.session_token);
        fill(&mut self.endpoint, other.endpoint);
        fill(&mut self.kms_key_id, other.kms_key_id);
        fill(&mut self.url_style, other.url_style);
        fill(&mut self.use_ssl, other.use_ssl);
        fill(
            &mut self.s3_url_compatibility_mode,
            other.s3_url_compatibility_mode,
        );
        fill(&mut self.requester_pays, other.requester_pays);
    }

    /// Resolved parameters; unset fields take their zero value.
    #[must_use]
    pub fn finish(self) -> AuthParams {
        AuthParams {
            region: self.region.unwrap_or_default(),
            access_key_id: self.access_key_id.unwrap_or_default(),
            secret_access_key: self.secret_access_key.unwrap_or_default(),
            session_token: self.session_token.unwrap_or_default(),
            endpoint: self.endpoint.unwrap_or_default(),
            kms_key_id: self.kms_key_id.unwrap_or_default(),
            url_style: self.url_style.unwrap_or_default(),
            use_ssl: self.use_ssl.unwrap_or(false),
            s3_url_compatibility_mode: self.s3_url_compatibility_mode.unwrap_or(false),
            requester_pays: self.requester_pays.unwrap_or(false),
        }
    }

    /// Settings stored in an S3-family secret.
    #[must_use]
    pub fn from_secret(secret: &KeyValueSecret) -> Self {
        let string = |key: &str| secret.get_str(key).map(ToOwned::to_owned);
        Self {
            region: string("region"),
            access_key_id: string("key_id"),
            secret_access_key: string("secret"),
            session_token: string("session_token"),
            endpoint: string("endpoint"),
            kms_key_id: string("kms_key_id"),
            url_style: secret.get_str("url_style").and_then(UrlStyle::parse),
            use_ssl: secret.get_bool("use_ssl"),
            s3_url_compatibility_mode: secret.get_bool("url_compatibility_mode"),
            requester_pays: secret.get_bool("requester_pays"),
        }
    }
}

/// Parse `s3_*` options from a URL query string.
///
/// # Errors
///
/// Returns [`S3FsError::InvalidOption`] for unknown keys, booleans other than
/// `true`/`false`, or an unknown URL style.
pub fn parse_query_options(query: &str) -> Result<PartialAuthParams> {
    let mut params = PartialAuthParams::default();
    for pair in query.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let value = s3vfs_auth::url_decode(value);
        match key {
            "s3_region" => params.region = Some(value),
            "s3_access_key_id" => params.access_key_id = Some(value),
            "s3_secret_access_key" => params.secret_access_key = Some(value),
            "s3_session_token" => params.session_token = Some(value),
            "s3_endpoint" => params.endpoint = Some(value),
            "s3_url_style" => {
                params.url_style = Some(UrlStyle::parse(&value).ok_or_else(|| {
                    S3FsError::InvalidOption(format!(
                        "Invalid value for s3_url_style: '{value}', expected 'path' or 'vhost'"
                    ))
                })?);
            }
            "s3_use_ssl" => params.use_ssl = Some(parse_bool_option(key, &value)?),
            "s3_url_compatibility_mode" => {
                params.s3_url_compatibility_mode = Some(parse_bool_option(key, &value)?);
            }
            "s3_requester_pays" => params.requester_pays = Some(parse_bool_option(key, &value)?),
            other => {
                return Err(S3FsError::InvalidOption(format!(
                    "Unknown query parameter '{other}' in S3 URL"
                )));
            }
        }
    }
    Ok(params)
}

fn parse_bool_option(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(S3FsError::InvalidOption(format!(
            "Invalid value for {key}: '{value}', expected 'true' or 'false'"
        ))),
    }
}

/// One layer of credential resolution.
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this source reads the URL's query string. Such sources are
    /// skipped when an other source enables URL compatibility mode, where `?`
    /// belongs to the key.
    fn reads_url_query(&self) -> bool {
        false
    }

    /// The fields this source sets for `ctx.url`.
    fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<PartialAuthParams>;
}

/// `s3_*` options in the URL query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptionsSource;

impl CredentialSource for QueryOptionsSource {
    fn name(&self) -> &'static str {
        "query"
    }

    fn reads_url_query(&self) -> bool {
        true
    }

    fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<PartialAuthParams> {
        match query_string(ctx.url) {
            Some(query) => parse_query_options(query),
            None => Ok(PartialAuthParams::default()),
        }
    }
}

/// The registered S3-family secret whose scope best matches the URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecretSource;

impl CredentialSource for SecretSource {
    fn name(&self) -> &'static str {
        "secret"
    }

    fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<PartialAuthParams> {
        Ok(ctx
            .secrets
            .lookup_any(ctx.url, &S3_SECRET_TYPES)
            .map(|entry| {
                debug!(secret = %entry.secret.name, url = ctx.url, "Using secret");
                PartialAuthParams::from_secret(&entry.secret)
            })
            .unwrap_or_default())
    }
}

/// `S3VFS_S3_*` variables, then the standard `AWS_*` ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvironmentSource;

impl CredentialSource for EnvironmentSource {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<PartialAuthParams> {
        let env = ctx.env;
        let first = |names: &[&str]| names.iter().find_map(|name| env.var(name));
        let flag = |name: &str| -> Result<Option<bool>> {
            env.var(name)
                .map(|value| parse_bool_option(name, &value.to_ascii_lowercase()))
                .transpose()
        };

        let url_style = match env.var("S3VFS_S3_URL_STYLE") {
            Some(value) => Some(UrlStyle::parse(&value).ok_or_else(|| {
                S3FsError::InvalidOption(format!(
                    "Invalid value for S3VFS_S3_URL_STYLE: '{value}', expected 'path' or 'vhost'"
                ))
            })?),
            None => None,
        };

        Ok(PartialAuthParams {
            region: first(&["S3VFS_S3_REGION", "AWS_REGION", "AWS_DEFAULT_REGION"]),
            access_key_id: first(&["S3VFS_S3_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"]),
            secret_access_key: first(&["S3VFS_S3_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"]),
            session_token: first(&["S3VFS_S3_SESSION_TOKEN", "AWS_SESSION_TOKEN"]),
            endpoint: first(&["S3VFS_S3_ENDPOINT", "AWS_ENDPOINT_URL_S3"]),
            kms_key_id: first(&["S3VFS_S3_KMS_KEY_ID"]),
            url_style,
            use_ssl: flag("S3VFS_S3_USE_SSL")?,
            s3_url_compatibility_mode: None,
            requester_pays: flag("S3VFS_S3_REQUESTER_PAYS")?,
        })
    }
}

/// Provider defaults from [`S3Settings`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderDefaultsSource;

impl CredentialSource for ProviderDefaultsSource {
    fn name(&self) -> &'static str {
        "defaults"
    }

    fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<PartialAuthParams> {
        let settings = ctx.settings;
        Ok(PartialAuthParams {
            region: Some(settings.default_region.clone()),
            endpoint: Some(settings.default_endpoint.clone()),
            url_style: Some(settings.default_url_style),
            use_ssl: Some(settings.default_use_ssl),
            ..PartialAuthParams::default()
        })
    }
}

/// Ordered list of credential sources.
#[derive(Debug)]
pub struct CredentialResolver {
    sources: Vec<Box<dyn CredentialSource>>,
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(vec![
            Box::new(QueryOptionsSource),
            Box::new(SecretSource),
            Box::new(EnvironmentSource),
            Box::new(ProviderDefaultsSource),
        ])
    }
}

impl CredentialResolver {
    /// Resolver consulting `sources` in order.
    #[must_use]
    pub fn new(sources: Vec<Box<dyn CredentialSource>>) -> Self {
        Self { sources }
    }

    /// Resolve the parameters for `ctx.url`.
    ///
    /// Sources that do not read the query string are consulted first so
    /// their compatibility-mode setting can decide whether the query sources
    /// run at all. Precedence still follows the source order.
    pub fn resolve(&self, ctx: &ResolveContext<'_>) -> Result<AuthParams> {
        let mut layers: Vec<Option<PartialAuthParams>> = vec![None; self.sources.len()];
        let mut compat = PartialAuthParams::default();

        for (idx, source) in self.sources.iter().enumerate() {
            if !source.reads_url_query() {
                let partial = source.resolve(ctx)?;
                compat.merge(PartialAuthParams {
                    s3_url_compatibility_mode: partial.s3_url_compatibility_mode,
                    ..PartialAuthParams::default()
                });
                layers[idx] = Some(partial);
            }
        }

        let compat_mode = compat.s3_url_compatibility_mode.unwrap_or(false);
        let mut merged = PartialAuthParams::default();
        for (idx, source) in self.sources.iter().enumerate() {
            let partial = match layers[idx].take() {
                Some(partial) => partial,
                None if compat_mode => continue,
                None => source.resolve(ctx)?,
            };
            debug!(source = source.name(), url = ctx.url, "Merging credential layer");
            merged.merge(partial);
        }
        Ok(merged.finish())
    }
}
