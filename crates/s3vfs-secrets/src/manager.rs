//! The secret store and creation-function registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use tracing::debug;

use crate::bearer::{self, HUGGINGFACE_TYPE};
use crate::env::{Environment, ProcessEnvironment};
use crate::error::SecretError;
use crate::s3::{self, S3_SECRET_TYPES};
use crate::secret::{CreateSecretInput, KeyValueSecret, OnConflict, SecretEntry};

/// A function that builds a secret from creation options.
pub type CreateSecretFn =
    Arc<dyn Fn(&CreateSecretInput, &dyn Environment) -> Result<KeyValueSecret, SecretError> + Send + Sync>;

/// Thread-safe store of named secrets.
///
/// Entries are shared as `Arc<SecretEntry>`; replacing a secret swaps the
/// `Arc`, so concurrent readers see either the old or the new record.
///
/// # Examples
///
/// ```
/// use s3vfs_secrets::{CreateSecretInput, SecretManager};
///
/// let manager = SecretManager::new();
/// let input = CreateSecretInput::builder()
///     .secret_type("s3")
///     .name("prod")
///     .build()
///     .with_option("key_id", "AKIA")
///     .with_option("secret", "shh");
/// manager.create_secret(&input).unwrap();
///
/// let found = manager.lookup("s3://bucket/file.csv", "s3").unwrap();
/// assert_eq!(found.secret.name, "prod");
/// assert!(manager.lookup("gcs://bucket/file.csv", "s3").is_none());
/// ```
pub struct SecretManager {
    secrets: DashMap<String, Arc<SecretEntry>>,
    functions: RwLock<HashMap<(String, String), CreateSecretFn>>,
    default_providers: RwLock<HashMap<String, String>>,
    environment: Arc<dyn Environment>,
}

impl fmt::Debug for SecretManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.secrets.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        f.debug_struct("SecretManager")
            .field("secrets", &names)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretManager {
    /// Create a manager reading the process environment, with the built-in
    /// S3-family and Hugging Face creation functions registered.
    #[must_use]
    pub fn new() -> Self {
        Self::with_environment(Arc::new(ProcessEnvironment))
    }

    /// Create a manager reading variables from `environment`.
    #[must_use]
    pub fn with_environment(environment: Arc<dyn Environment>) -> Self {
        let manager = Self {
            secrets: DashMap::new(),
            functions: RwLock::new(HashMap::new()),
            default_providers: RwLock::new(HashMap::new()),
            environment,
        };
        for secret_type in S3_SECRET_TYPES {
            manager.register_function(secret_type, "config", Arc::new(s3::create_from_config));
            manager.register_function(
                secret_type,
                "credential_chain",
                Arc::new(s3::create_from_credential_chain),
            );
            manager.set_default_provider(secret_type, "config");
        }
        manager.register_function(
            HUGGINGFACE_TYPE,
            "config",
            Arc::new(bearer::create_from_config),
        );
        manager.register_function(
            HUGGINGFACE_TYPE,
            "credential_chain",
            Arc::new(bearer::create_huggingface_from_credential_chain),
        );
        manager.set_default_provider(HUGGINGFACE_TYPE, "config");
        manager
    }

    /// The environment creation functions read from.
    #[must_use]
    pub fn environment(&self) -> &dyn Environment {
        self.environment.as_ref()
    }

    /// Register (or replace) the creation function for a type/provider pair.
    pub fn register_function(&self, secret_type: &str, provider: &str, function: CreateSecretFn) {
        self.functions.write().insert(
            (secret_type.to_lowercase(), provider.to_lowercase()),
            function,
        );
    }

    /// Set the provider used when a creation call names none.
    pub fn set_default_provider(&self, secret_type: &str, provider: &str) {
        self.default_providers
            .write()
            .insert(secret_type.to_lowercase(), provider.to_lowercase());
    }

    /// Create a secret and store it according to the input's conflict policy.
    ///
    /// Returns the stored entry, which is the pre-existing one under
    /// [`OnConflict::IgnoreOnConflict`].
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::UnknownProvider`] when no function is registered,
    /// [`SecretError::AlreadyExists`] under [`OnConflict::ErrorOnConflict`], or
    /// whatever the creation function returns.
    pub fn create_secret(&self, input: &CreateSecretInput) -> Result<Arc<SecretEntry>, SecretError> {
        let secret_type = input.secret_type.to_lowercase();
        let provider = match &input.provider {
            Some(provider) => provider.to_lowercase(),
            None => self
                .default_providers
                .read()
                .get(&secret_type)
                .cloned()
                .unwrap_or_else(|| "config".to_owned()),
        };

        let function = self
            .functions
            .read()
            .get(&(secret_type.clone(), provider.clone()))
            .cloned()
            .ok_or_else(|| SecretError::UnknownProvider {
                secret_type: secret_type.clone(),
                provider: provider.clone(),
            })?;

        let normalized = CreateSecretInput {
            secret_type,
            provider: Some(provider),
            ..input.clone()
        };
        let secret = function(&normalized, self.environment.as_ref())?;
        let entry = Arc::new(SecretEntry {
            secret,
            persist_type: input.persist_type,
        });

        match self.secrets.entry(input.name.clone()) {
            Entry::Occupied(mut occupied) => match input.on_conflict {
                OnConflict::ErrorOnConflict => Err(SecretError::AlreadyExists(input.name.clone())),
                OnConflict::IgnoreOnConflict => Ok(Arc::clone(occupied.get())),
                OnConflict::ReplaceOnConflict => {
                    occupied.insert(Arc::clone(&entry));
                    debug!(secret = %input.name, "Replaced secret");
                    Ok(entry)
                }
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::clone(&entry));
                debug!(secret = %input.name, secret_type = %entry.secret.secret_type, "Created secret");
                Ok(entry)
            }
        }
    }

    /// Best-matching secret of `secret_type` for `path`.
    #[must_use]
    pub fn lookup(&self, path: &str, secret_type: &str) -> Option<Arc<SecretEntry>> {
        self.lookup_any(path, &[secret_type])
    }

    /// Best-matching secret of any of `secret_types` for `path`.
    ///
    /// The secret whose scope has the longest prefix of `path` wins; ties go
    /// to the alphabetically first name.
    #[must_use]
    pub fn lookup_any(&self, path: &str, secret_types: &[&str]) -> Option<Arc<SecretEntry>> {
        self.secrets
            .iter()
            .filter(|entry| {
                secret_types
                    .iter()
                    .any(|t| entry.secret.secret_type.eq_ignore_ascii_case(t))
            })
            .filter_map(|entry| {
                entry
                    .secret
                    .match_score(path)
                    .map(|score| (score, Arc::clone(entry.value())))
            })
            .max_by(|(score_a, a), (score_b, b)| {
                score_a
                    .cmp(score_b)
                    .then_with(|| b.secret.name.cmp(&a.secret.name))
            })
            .map(|(_, entry)| entry)
    }

    /// Secret named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<SecretEntry>> {
        self.secrets.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Store `entry` under its secret's name, returning the entry it replaced.
    pub fn replace(&self, entry: SecretEntry) -> Option<Arc<SecretEntry>> {
        self.secrets
            .insert(entry.secret.name.clone(), Arc::new(entry))
    }

    /// Remove the secret named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::NotFound`] if no such secret exists.
    pub fn remove(&self, name: &str) -> Result<Arc<SecretEntry>, SecretError> {
        self.secrets
            .remove(name)
            .map(|(_, entry)| entry)
            .ok_or_else(|| SecretError::NotFound(name.to_owned()))
    }

    /// All secrets, sorted by name.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<SecretEntry>> {
        let mut entries: Vec<_> = self.secrets.iter().map(|e| Arc::clone(e.value())).collect();
        entries.sort_by(|a, b| a.secret.name.cmp(&b.secret.name));
        entries
    }
}
