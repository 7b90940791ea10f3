//! S3-compatible object storage exposed as a file system.
//!
//! `s3://`, `s3a://`, `s3n://`, `gcs://`, `gs://` and `r2://` URLs are parsed
//! into HTTP endpoints, signed with credentials resolved from URL options,
//! stored secrets, environment variables and provider defaults, and served
//! through a small virtual file system layer that also covers local files
//! and read-only `hf://` URLs.
//!
//! # Architecture
//!
//! ```text
//!   FileSystemRouter (picks a file system per path)
//!        |
//!        v
//!   S3FileSystem ---- CredentialResolver ---- SecretManager
//!        |                                        ^
//!        v                                        | refresh on 401/403
//!   S3Client (sign + classify errors)  -----------+
//!        |
//!        v
//!   HttpTransport (reqwest, or a test double)
//! ```
//!
//! Writes go through [`S3FileHandle`], which buffers sequential writes into
//! fixed-size parts and uploads them concurrently as one multipart upload.

pub mod auth_params;
pub mod buffer_pool;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod glob;
pub mod huggingface;
pub mod local;
pub mod multipart;
pub mod resolver;
pub mod transport;
pub mod url;
pub mod vfs;

pub use auth_params::{AuthParams, UrlStyle};
pub use buffer_pool::BufferPool;
pub use client::S3Client;
pub use config::S3Settings;
pub use error::{Result, S3FsError};
pub use filesystem::{ListEntry, ObjectMetadata, S3FileSystem};
pub use huggingface::HuggingFaceFileSystem;
pub use local::LocalFileSystem;
pub use multipart::S3FileHandle;
pub use resolver::{CredentialResolver, CredentialSource};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
pub use vfs::{FileSystemRouter, ObjectFileSystem};
