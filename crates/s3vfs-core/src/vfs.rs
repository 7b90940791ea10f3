//! File system abstraction and routing.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{Result, S3FsError};

/// Operations every file system variant provides.
#[async_trait]
pub trait ObjectFileSystem: Send + Sync + fmt::Debug {
    /// Name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether `path` belongs to this file system.
    fn can_handle(&self, path: &str) -> bool;

    /// Whether a file exists at `path`.
    async fn file_exists(&self, path: &str) -> Result<bool>;

    /// Size of the file at `path`.
    async fn file_size(&self, path: &str) -> Result<u64>;

    /// The whole file.
    async fn read(&self, path: &str) -> Result<Bytes>;

    /// `length` bytes starting at `offset`.
    async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes>;

    /// Create or replace the file at `path` with `data`.
    async fn write_all(&self, path: &str, data: Bytes) -> Result<()>;

    /// Delete the file at `path`.
    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Paths matching `pattern`.
    async fn glob(&self, pattern: &str) -> Result<Vec<String>>;
}

/// Picks the file system for each path.
///
/// File systems are consulted in registration order; the first whose
/// [`can_handle`](ObjectFileSystem::can_handle) accepts the path is used.
#[derive(Debug, Default)]
pub struct FileSystemRouter {
    filesystems: Vec<Arc<dyn ObjectFileSystem>>,
}

impl FileSystemRouter {
    /// Empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file system.
    pub fn register(&mut self, filesystem: Arc<dyn ObjectFileSystem>) {
        self.filesystems.push(filesystem);
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, filesystem: Arc<dyn ObjectFileSystem>) -> Self {
        self.register(filesystem);
        self
    }

    /// Names of the registered file systems, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.filesystems.iter().map(|fs| fs.name()).collect()
    }

    /// The file system handling `path`.
    pub fn route(&self, path: &str) -> Result<&Arc<dyn ObjectFileSystem>> {
        self.filesystems
            .iter()
            .find(|fs| fs.can_handle(path))
            .ok_or_else(|| S3FsError::Unsupported(format!("no file system can handle '{path}'")))
    }
}
