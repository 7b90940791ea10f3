//! The S3 file system.
//!
//! [`S3FileSystem`] resolves credentials for each URL, issues the request
//! through [`S3Client`], and retries once after refreshing the matching
//! secret when the service rejects the credentials.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use s3vfs_auth::{url_decode, url_encode};
use s3vfs_secrets::s3::S3_SECRET_TYPES;
use s3vfs_secrets::{SecretManager, try_refresh};
use s3vfs_xml::{ListBucketResult, from_xml};
use tracing::{debug, info};

use crate::auth_params::AuthParams;
use crate::buffer_pool::BufferPool;
use crate::client::{S3Client, kms_headers};
use crate::config::S3Settings;
use crate::error::{Result, S3FsError};
use crate::glob::{GlobPattern, first_wildcard};
use crate::multipart::S3FileHandle;
use crate::resolver::{CredentialResolver, ResolveContext};
use crate::transport::HttpTransport;
use crate::url::{parse_s3_url, s3_prefix};
use crate::vfs::ObjectFileSystem;

/// Object metadata from a `HEAD` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Object size in bytes.
    pub size: u64,
    /// Entity tag, quotes included.
    pub etag: Option<String>,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
}

/// An entry returned by [`S3FileSystem::list_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Full URL of the object or common prefix.
    pub path: String,
    /// Whether this is a common prefix rather than an object.
    pub is_dir: bool,
    /// Object size; zero for prefixes.
    pub size: u64,
}

/// S3-compatible object storage as a file system.
#[derive(Debug)]
pub struct S3FileSystem {
    client: S3Client,
    secrets: Arc<SecretManager>,
    settings: S3Settings,
    pool: BufferPool,
    resolver: CredentialResolver,
}

impl S3FileSystem {
    /// File system sending requests through `transport`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        secrets: Arc<SecretManager>,
        settings: S3Settings,
    ) -> Self {
        let pool = BufferPool::new(settings.buffer_pool_capacity);
        Self {
            client: S3Client::new(transport),
            secrets,
            settings,
            pool,
            resolver: CredentialResolver::default(),
        }
    }

    /// Replace the credential resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: CredentialResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// The secret store.
    #[must_use]
    pub fn secrets(&self) -> &Arc<SecretManager> {
        &self.secrets
    }

    /// The settings in effect.
    #[must_use]
    pub fn settings(&self) -> &S3Settings {
        &self.settings
    }

    /// The shared upload buffer pool.
    #[must_use]
    pub fn buffer_pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Resolve the parameters for `url`.
    pub fn resolve_auth(&self, url: &str) -> Result<AuthParams> {
        let ctx = ResolveContext {
            url,
            secrets: &self.secrets,
            env: self.secrets.environment(),
            settings: &self.settings,
        };
        self.resolver.resolve(&ctx)
    }

    /// Run `op` with freshly resolved parameters; on an authentication
    /// failure, refresh the matching secret and run it once more.
    pub async fn with_refresh<T, F, Fut>(&self, url: &str, op: F) -> Result<T>
    where
        F: Fn(AuthParams) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let auth = self.resolve_auth(url)?;
        match op(auth).await {
            Err(err) if err.is_auth_failure() => {
                let Some(entry) = self.secrets.lookup_any(url, &S3_SECRET_TYPES) else {
                    return Err(err);
                };
                if !try_refresh(&self.secrets, &entry)? {
                    return Err(err);
                }
                info!(url, secret = %entry.secret.name, "Retrying request with refreshed secret");
                let auth = self.resolve_auth(url)?;
                op(auth).await
            }
            other => other,
        }
    }

    /// Metadata of the object at `path`.
    pub async fn head(&self, path: &str) -> Result<ObjectMetadata> {
        let response = self
            .with_refresh(path, |auth| async move { self.client.head(path, &auth).await })
            .await?;
        let size = response
            .header("content-length")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0);
        Ok(ObjectMetadata {
            size,
            etag: response.header("etag").map(ToOwned::to_owned),
            last_modified: response
                .header("last-modified")
                .and_then(|value| DateTime::parse_from_rfc2822(value).ok())
                .map(|time| time.with_timezone(&Utc)),
        })
    }

    /// Whether an object exists at `path`.
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        match self.head(path).await {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Directories are implicit in S3; every prefix exists.
    #[must_use]
    pub fn directory_exists(&self, _path: &str) -> bool {
        true
    }

    /// The whole object at `path`.
    pub async fn get(&self, path: &str) -> Result<Bytes> {
        let response = self
            .with_refresh(path, |auth| async move { self.client.get(path, &auth, "").await })
            .await?;
        Ok(response.body)
    }

    /// `length` bytes of `path` starting at `offset`.
    pub async fn get_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let response = self
            .with_refresh(path, |auth| async move {
                self.client.get_range(path, &auth, offset, length).await
            })
            .await?;
        Ok(response.body)
    }

    /// Upload `data` to `path` with a single `PUT`.
    pub async fn put(&self, path: &str, data: Bytes) -> Result<()> {
        self.with_refresh(path, |auth| {
            let data = data.clone();
            async move {
                let kms = kms_headers(&auth.kms_key_id);
                let headers: Vec<(&str, &str)> =
                    kms.iter().map(|(k, v)| (*k, v.as_str())).collect();
                self.client.put(path, &auth, "", &headers, data).await
            }
        })
        .await?;
        Ok(())
    }

    /// Open `path` for writing through a multipart upload.
    pub async fn open_write(&self, path: &str) -> Result<S3FileHandle> {
        self.with_refresh(path, |auth| {
            S3FileHandle::open(
                path,
                auth,
                self.client.clone(),
                self.pool.clone(),
                &self.settings,
            )
        })
        .await
    }

    /// Delete the object at `path`.
    pub async fn remove_file(&self, path: &str) -> Result<()> {
        self.with_refresh(path, |auth| async move { self.client.delete(path, &auth, "").await })
            .await?;
        Ok(())
    }

    /// Delete every object under the directory `path`.
    pub async fn remove_directory(&self, path: &str) -> Result<()> {
        let entries = self.list(path, false).await?;
        let concurrency = self.settings.max_upload_threads.max(1);
        stream::iter(&entries)
            .map(|entry| self.remove_file(&entry.path))
            .buffer_unordered(concurrency)
            .try_collect::<Vec<()>>()
            .await?;
        debug!(path, removed = entries.len(), "Removed directory");
        Ok(())
    }

    /// Objects and common prefixes directly under the directory `path`.
    pub async fn list_files(&self, path: &str) -> Result<Vec<ListEntry>> {
        self.list(path, true).await
    }

    /// Expand a glob pattern into matching object URLs.
    ///
    /// A pattern without wildcards is returned as-is. The pattern's option
    /// query string is re-attached to every result.
    pub async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let auth = self.resolve_auth(pattern)?;
        let parsed = parse_s3_url(pattern, &auth)?;
        let key = parsed.key.trim_start_matches('/');
        let Some(wildcard) = first_wildcard(key) else {
            return Ok(vec![pattern.to_owned()]);
        };

        let matcher = GlobPattern::new(key)?;
        let shared_prefix = &key[..wildcard];
        let (objects, _) = self
            .with_refresh(pattern, |auth| async move {
                self.list_objects(pattern, &auth, shared_prefix, false).await
            })
            .await?;

        let suffix = if parsed.query_param.is_empty() {
            String::new()
        } else {
            format!("?{}", parsed.query_param)
        };
        let mut results: Vec<String> = objects
            .into_iter()
            .filter(|(object_key, _)| matcher.matches(object_key))
            .map(|(object_key, _)| {
                format!("{}{}/{object_key}{suffix}", parsed.prefix, parsed.bucket)
            })
            .collect();
        results.sort();
        Ok(results)
    }

    async fn list(&self, path: &str, delimiter: bool) -> Result<Vec<ListEntry>> {
        let auth = self.resolve_auth(path)?;
        let parsed = parse_s3_url(path, &auth)?;
        let mut key_prefix = parsed.key.trim_start_matches('/').to_owned();
        if !key_prefix.is_empty() && !key_prefix.ends_with('/') {
            key_prefix.push('/');
        }
        let key_prefix = key_prefix.as_str();

        let (objects, prefixes) = self
            .with_refresh(path, |auth| async move {
                self.list_objects(path, &auth, key_prefix, delimiter).await
            })
            .await?;

        let base = format!("{}{}/", parsed.prefix, parsed.bucket);
        let mut entries: Vec<ListEntry> = objects
            .into_iter()
            .map(|(key, size)| ListEntry {
                path: format!("{base}{key}"),
                is_dir: false,
                size,
            })
            .collect();
        entries.extend(prefixes.into_iter().map(|prefix| ListEntry {
            path: format!("{base}{}", prefix.trim_end_matches('/')),
            is_dir: true,
            size: 0,
        }));
        Ok(entries)
    }

    /// Page through `ListObjectsV2` for `key_prefix` in the bucket of `url`.
    ///
    /// Returns decoded `(key, size)` pairs and common prefixes.
    async fn list_objects(
        &self,
        url: &str,
        auth: &AuthParams,
        key_prefix: &str,
        delimiter: bool,
    ) -> Result<(Vec<(String, u64)>, Vec<String>)> {
        let parsed = parse_s3_url(url, auth)?;
        let bucket_url = format!("{}{}/", parsed.prefix, parsed.bucket);

        let mut objects = Vec::new();
        let mut prefixes = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut query = String::new();
            if let Some(token) = &continuation {
                query.push_str("continuation-token=");
                query.push_str(&url_encode(token, true));
                query.push('&');
            }
            if delimiter {
                query.push_str("delimiter=%2F&");
            }
            query.push_str("encoding-type=url&list-type=2&prefix=");
            query.push_str(&url_encode(key_prefix, true));

            let response = self.client.get(&bucket_url, auth, &query).await?;
            let page: ListBucketResult = from_xml(&response.body)?;
            objects.extend(
                page.contents
                    .into_iter()
                    .map(|object| (url_decode(&object.key), object.size)),
            );
            prefixes.extend(page.common_prefixes.iter().map(|prefix| url_decode(prefix)));

            match page.next_continuation_token {
                Some(token) if page.is_truncated && !token.is_empty() => {
                    continuation = Some(token);
                }
                _ => break,
            }
        }
        debug!(
            bucket = %parsed.bucket,
            prefix = key_prefix,
            objects = objects.len(),
            "Listed objects"
        );
        Ok((objects, prefixes))
    }
}

#[async_trait]
impl ObjectFileSystem for S3FileSystem {
    fn name(&self) -> &'static str {
        "S3FileSystem"
    }

    fn can_handle(&self, path: &str) -> bool {
        s3_prefix(path).is_some()
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        S3FileSystem::file_exists(self, path).await
    }

    async fn file_size(&self, path: &str) -> Result<u64> {
        Ok(self.head(path).await?.size)
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        self.get(path).await
    }

    async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        self.get_range(path, offset, length).await
    }

    async fn write_all(&self, path: &str, data: Bytes) -> Result<()> {
        let mut handle = self.open_write(path).await?;
        let written = match handle.write(&data, 0).await {
            Ok(()) => handle.finalize().await,
            Err(err) => Err(err),
        };
        let closed = handle.close().await;
        written.and(closed)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        S3FileSystem::remove_file(self, path).await
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        S3FileSystem::glob(self, pattern).await
    }
}
