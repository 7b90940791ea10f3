//! Local disk as an [`ObjectFileSystem`].

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Result, S3FsError};
use crate::glob::{GlobPattern, first_wildcard};
use crate::vfs::ObjectFileSystem;

const FILE_PREFIX: &str = "file://";

/// Plain paths and `file://` URLs on the local disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

fn local_path(path: &str) -> &str {
    path.strip_prefix(FILE_PREFIX).unwrap_or(path)
}

fn io_error(path: &str, err: &io::Error) -> S3FsError {
    if err.kind() == io::ErrorKind::NotFound {
        S3FsError::NotFound {
            url: path.to_owned(),
        }
    } else {
        S3FsError::Io {
            path: path.to_owned(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl ObjectFileSystem for LocalFileSystem {
    fn name(&self) -> &'static str {
        "LocalFileSystem"
    }

    fn can_handle(&self, path: &str) -> bool {
        path.starts_with(FILE_PREFIX) || !path.contains("://")
    }

    async fn file_exists(&self, path: &str) -> Result<bool> {
        match tokio::fs::metadata(local_path(path)).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(io_error(path, &err)),
        }
    }

    async fn file_size(&self, path: &str) -> Result<u64> {
        let meta = tokio::fs::metadata(local_path(path))
            .await
            .map_err(|e| io_error(path, &e))?;
        Ok(meta.len())
    }

    async fn read(&self, path: &str) -> Result<Bytes> {
        let data = tokio::fs::read(local_path(path))
            .await
            .map_err(|e| io_error(path, &e))?;
        Ok(Bytes::from(data))
    }

    async fn read_range(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        let mut file = tokio::fs::File::open(local_path(path))
            .await
            .map_err(|e| io_error(path, &e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| io_error(path, &e))?;
        let mut data = Vec::new();
        file.take(length)
            .read_to_end(&mut data)
            .await
            .map_err(|e| io_error(path, &e))?;
        Ok(Bytes::from(data))
    }

    async fn write_all(&self, path: &str, data: Bytes) -> Result<()> {
        let target = Path::new(local_path(path));
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(path, &e))?;
        }
        tokio::fs::write(target, &data)
            .await
            .map_err(|e| io_error(path, &e))
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        tokio::fs::remove_file(local_path(path))
            .await
            .map_err(|e| io_error(path, &e))
    }

    async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let local = local_path(pattern);
        let Some(wildcard) = first_wildcard(local) else {
            return Ok(if self.file_exists(pattern).await? {
                vec![pattern.to_owned()]
            } else {
                Vec::new()
            });
        };

        let base = match local[..wildcard].rfind('/') {
            Some(0) => "/",
            Some(slash) => &local[..slash],
            None => ".",
        };
        let matcher = GlobPattern::new(local)?;
        let prefix = if pattern.starts_with(FILE_PREFIX) {
            FILE_PREFIX
        } else {
            ""
        };

        let mut results = Vec::new();
        let mut pending = vec![PathBuf::from(base)];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(io_error(&dir.to_string_lossy(), &err)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| io_error(&dir.to_string_lossy(), &e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| io_error(&dir.to_string_lossy(), &e))?;
                let entry_path = entry.path();
                if file_type.is_dir() {
                    pending.push(entry_path);
                    continue;
                }
                let display = entry_path.to_string_lossy();
                let candidate = if base == "." {
                    display.trim_start_matches("./")
                } else {
                    display.as_ref()
                };
                if matcher.matches(candidate) {
                    results.push(format!("{prefix}{candidate}"));
                }
            }
        }
        results.sort();
        Ok(results)
    }
}
