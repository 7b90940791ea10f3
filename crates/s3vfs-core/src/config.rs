//! S3 file system configuration.
//!
//! Provides [`S3Settings`]: multipart upload limits, the shared buffer pool
//! size and the provider defaults used when no other credential source sets
//! a field. Values can be loaded from environment variables.

use s3vfs_secrets::env::{Environment, ProcessEnvironment};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::auth_params::UrlStyle;

/// Alignment of derived part sizes.
const PART_SIZE_ALIGNMENT: u64 = 256 * 1024;

/// S3 file system settings.
///
/// # Examples
///
/// ```
/// use s3vfs_core::config::S3Settings;
///
/// let settings = S3Settings::default();
/// assert_eq!(settings.max_parts_per_file, 10_000);
/// assert_eq!(settings.part_size(), 80_000_000 + 216_064);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct S3Settings {
    /// Largest object a write handle must be able to produce, in bytes.
    #[builder(default = 800_000_000_000)]
    pub max_file_size: u64,

    /// Most parts a multipart upload may have.
    #[builder(default = 10_000)]
    pub max_parts_per_file: u64,

    /// Most parts one write handle may have uploading at once.
    #[builder(default = 50)]
    pub max_upload_threads: usize,

    /// Smallest part size, in bytes. S3 rejects smaller non-final parts.
    #[builder(default = 5 * 1024 * 1024)]
    pub min_part_size: u64,

    /// Part buffers in flight across all write handles of one file system.
    #[builder(default = 100)]
    pub buffer_pool_capacity: usize,

    /// Region used when no other source sets one.
    #[builder(default = String::from("us-east-1"))]
    pub default_region: String,

    /// Endpoint used when no other source sets one.
    #[builder(default = String::from("s3.amazonaws.com"))]
    pub default_endpoint: String,

    /// URL style used when no other source sets one.
    #[builder(default)]
    pub default_url_style: UrlStyle,

    /// Whether HTTPS is used when no other source decides.
    #[builder(default = true)]
    pub default_use_ssl: bool,
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            max_file_size: 800_000_000_000,
            max_parts_per_file: 10_000,
            max_upload_threads: 50,
            min_part_size: 5 * 1024 * 1024,
            buffer_pool_capacity: 100,
            default_region: String::from("us-east-1"),
            default_endpoint: String::from("s3.amazonaws.com"),
            default_url_style: UrlStyle::VirtualHost,
            default_use_ssl: true,
        }
    }
}

impl S3Settings {
    /// Load settings from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `S3VFS_S3_UPLOADER_MAX_FILESIZE` | `max_file_size` |
    /// | `S3VFS_S3_UPLOADER_MAX_PARTS_PER_FILE` | `max_parts_per_file` |
    /// | `S3VFS_S3_UPLOADER_THREAD_LIMIT` | `max_upload_threads` |
    /// | `S3VFS_S3_BUFFER_POOL_CAPACITY` | `buffer_pool_capacity` |
    ///
    /// Unparsable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_environment(&ProcessEnvironment)
    }

    /// Load settings from `env`; see [`from_env`](Self::from_env).
    #[must_use]
    pub fn from_environment(env: &dyn Environment) -> Self {
        let mut settings = Self::default();

        if let Some(n) = parse_number(env, "S3VFS_S3_UPLOADER_MAX_FILESIZE") {
            settings.max_file_size = n;
        }
        if let Some(n) = parse_number(env, "S3VFS_S3_UPLOADER_MAX_PARTS_PER_FILE") {
            settings.max_parts_per_file = n;
        }
        if let Some(n) = parse_number(env, "S3VFS_S3_UPLOADER_THREAD_LIMIT") {
            settings.max_upload_threads = n;
        }
        if let Some(n) = parse_number(env, "S3VFS_S3_BUFFER_POOL_CAPACITY") {
            settings.buffer_pool_capacity = n;
        }

        settings
    }

    /// Size of every part but the last of a multipart upload.
    ///
    /// `min_part_size`, unless spreading `max_file_size` over
    /// `max_parts_per_file` parts needs larger parts; then that size rounded up
    /// to a multiple of 256 KiB.
    #[must_use]
    pub fn part_size(&self) -> u64 {
        let required = self
            .max_file_size
            .div_ceil(self.max_parts_per_file.max(1));
        if required <= self.min_part_size {
            return self.min_part_size;
        }
        required.div_ceil(PART_SIZE_ALIGNMENT) * PART_SIZE_ALIGNMENT
    }
}

fn parse_number<T: std::str::FromStr>(env: &dyn Environment, name: &str) -> Option<T> {
    env.var(name).and_then(|v| v.trim().parse().ok())
}
