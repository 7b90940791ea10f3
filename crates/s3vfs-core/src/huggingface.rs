//! Read-only Hugging Face Hub file system (`hf://`).
//!
//! `hf://datasets/org/repo[@revision]/path` is served from
//! `{endpoint}/datasets/org/repo/resolve/{revision}/path`, authenticated with
//! the bearer token of the best-matching `huggingface` secret.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};
use s3vfs_auth::url_encode;
use s3vfs_secrets::SecretManager;
use s3vfs_secrets::bearer::HUGGINGFACE_TYPE;
use tracing::debug;

use crate::error::{Result, S3FsError};
use crate::glob::first_wildcard;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};
use crate::vfs::ObjectFileSystem;

const HF_PREFIX: &str = "hf://";
const DEFAULT_ENDPOINT: &str = "https://huggingface.co";
const DEFAULT_REVISION: &str = "main";

/// A parsed `hf://` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHfUrl {
    /// `datasets` or `spaces`.
    pub repo_type: String,
    /// Organisation or user.
    pub organization: String,
    /// Repository name.
    pub repository: String,
    /// Branch, tag or commit.
    pub revision: String,
    /// File path inside the repository, without a leading `/`.
    pub path: String,
}

impl ParsedHfUrl {
    /// Parse `url`.
    ///
    /// # Errors
    ///
    /// Returns [`S3FsError::MalformedUrl`] when the URL lacks the repository
    /// type, organisation, repository or file path.
    pub fn parse(url: &str) -> Result<Self> {
        let malformed = |reason: &str| S3FsError::MalformedUrl {
            url: url.to_owned(),
            reason: reason.to_owned(),
        };
        let rest = url
            .strip_prefix(HF_PREFIX)
            .ok_or_else(|| malformed("URL needs to start with hf://"))?;

        let mut parts = rest.splitn(4, '/');
        let repo_type = parts.next().unwrap_or_default();
        if !matches!(repo_type, "datasets" | "spaces") {
            return Err(malformed(
                "repository type needs to be 'datasets' or 'spaces'",
            ));
        }
        let organization = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("URL needs to contain an organisation"))?;
        let repo_and_revision = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("URL needs to contain a repository"))?;
        let path = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| malformed("URL needs to contain a file path"))?;

        let (repository, revision) = match repo_and_revision.split_once('@') {
            Some((repository, "~parquet")) => (repository, "refs/convert/parquet"),
            Some((repository, revision)) if !revision.is_empty() => (repository, revision),
            Some((repository, _)) => (repository, DEFAULT_REVISION),
            None => (repo_and_revision, DEFAULT_REVISION),
        };

        Ok(Self {
            repo_type: repo_type.to_owned(),
            organization: organization.to_owned(),
            repository: repository.to_owned(),
            revision: revision.to_owned(),
            path: path.to_owned(),
        })
    }

    /// The file's HTTP URL under `endpoint`.
    #[must_use]
    pub fn http_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}/{}/{}/resolve/{}/{}",
            endpoint.trim_end_matches('/'),
            self.repo_type,
            self.organization,
            self.repository,
            url_encode(&self.revision, true),
            url_encode(&self.path, false)
        )
    }
}

/// Hugging Face Hub files over HTTP.
#[derive(Debug, Clone)]
pub struct HuggingFaceFileSystem {
    transport: Arc<dyn HttpTransport>,
    secrets: Arc<SecretManager>,
    endpoint: String,
}

impl HuggingFaceFileSystem {
    /// File system for the public Hub.
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, secrets: Arc<SecretManager>) -> Self {
        Self {
            transport,
            secrets,
            endpoint: DEFAULT_ENDPOINT.to_owned(),
        }
    }

    /// Use another Hub endpoint, e.g. a mirror.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn request(&self, method: Method, url: &str, range: Option<String>) -> Result<HttpResponse> {
        let parsed = ParsedHfUrl::parse(url)?;
        let http_url = parsed.http_url(&self.endpoint);

        let mut headers = HeaderMap::new();
        let token = self
            .secrets
            .lookup(url, HUGGINGFACE_TYPE)
            .and_then(|entry| entry.secret.get_str("token").map(ToOwned::to_owned))
            .filter(|token| !token.is_empty());
        let token_sent = token.is_some();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| S3FsError::InvalidOption("huggingface token is not valid header text".to_owned()))?;
            headers.insert(http::header::AUTHORIZATION, value);
        }
        if let Some(range) = range {
            let value = HeaderValue::from_str(&range)
                .map_err(|_| S3FsError::InvalidOption(format!("invalid range '{range}'")))?;
            headers.insert(http::header::RANGE, value);
        }

        debug!(method = %method, url = %http_url, "Sending Hugging Face request");
        let response = self
            .transport
            .send(HttpRequest {
                method,
                url: http_url.clone(),
                headers,
                body: Bytes::new(),
            })
            .await
            .map_err(|e| S3FsError::Transport {
                url: http_url.clone(),
                message: e.message,
            })?;

        match response.status {
            _ if response.is_success() => Ok(response),
            401 | 403 => Err(S3FsError::AuthFailure {
                url: http_url,
                status: response.status,
                code: String::new(),
                message: String::from_utf8_lossy(&response.body).into_owned(),
                hint: if token_sent {
                    "The huggingface token was rejected; check that it is valid and has access to this repository."
                } else {
                    "Create a huggingface secret holding a token with access to this repository."
                }
                .to_owned(),
                credentials_provided: token_sent,
                session_token_provided: false,
                requester_pays: false,
            }),
            404 => Err(S3FsError::NotFound { url: http_url }),
            status => Err(S3FsError::Http {
                status,
                url: http_url,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            }),
        }
    }
}

#[async_trait]
impl ObjectFileSystem for HuggingFaceFileSystem {
    fn name(&self) -> &'static str {
        "HuggingFaceFileSystem"
    }

    fn can_handle(&self, path: &str) -> bool {
        path.starts_with(HF_PREFIX)
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        match self.request(Method::HEAD, path, None).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn file_size(&self, path: &str) -> Result<u64> {
        let response = self.request(Method::HEAD, path, None).await?;
        response
            .header("content-length")
            .and_then(|value| value.trim().parse().ok())
            .ok_or_else(|| S3FsError::UnexpectedResponse {
                url: path.to_owned(),
                message: "missing Content-Length".to_owned(),
            })
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        Ok(self.request(Method::GET, path, None).await?.body)
    }

    async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let range = format!("bytes={}-{}", offset, offset + length - 1);
        Ok(self.request(Method::GET, path, Some(range)).await?.body)
    }

    async fn write_all(&self, path: &str, _data: Bytes) -> Result<()> {
        Err(S3FsError::Unsupported(format!(
            "writing to '{path}': the Hugging Face file system is read-only"
        )))
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        Err(S3FsError::Unsupported(format!(
            "removing '{path}': the Hugging Face file system is read-only"
        )))
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        if first_wildcard(pattern).is_some() {
            return Err(S3FsError::Unsupported(format!(
                "glob patterns on hf:// are not supported: '{pattern}'"
            )));
        }
        Ok(vec![pattern.to_owned()])
    }
}
