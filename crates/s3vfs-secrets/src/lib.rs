//! Named credential secrets for s3vfs.
//!
//! A secret is a typed key/value record (`s3`, `aws`, `r2`, `gcs`,
//! `huggingface`) scoped to URL prefixes. Secrets are built by creation
//! functions registered per type and provider, stored in a
//! [`SecretManager`], and can be re-created from their `refresh_info` when
//! the credentials they hold stop working.
//!
//! # Modules
//!
//! - [`env`] - Environment variable access
//! - [`secret`] - Secret records and creation inputs
//! - [`s3`] - S3-family creation functions
//! - [`bearer`] - Bearer-token creation functions
//! - [`manager`] - Secret store and function registry
//! - [`refresh`] - Secret refresh

pub mod bearer;
pub mod env;
pub mod error;
pub mod manager;
pub mod refresh;
pub mod s3;
pub mod secret;

pub use env::{Environment, ProcessEnvironment, StaticEnvironment};
pub use error::SecretError;
pub use manager::{CreateSecretFn, SecretManager};
pub use refresh::try_refresh;
pub use secret::{
    CreateSecretInput, KeyValueSecret, OnConflict, PersistType, SecretEntry, SecretValue,
};
