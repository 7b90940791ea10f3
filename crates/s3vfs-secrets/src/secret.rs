//! Secret records and creation inputs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use typed_builder::TypedBuilder;

use crate::error::SecretError;

/// Placeholder printed instead of redacted values.
const REDACTED: &str = "redacted";

/// A value stored in a secret or passed as a creation option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretValue {
    /// A string value.
    Str(String),
    /// A boolean value.
    Bool(bool),
    /// A string-to-string map (used for `refresh_info`).
    Map(BTreeMap<String, String>),
}

impl SecretValue {
    /// The value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a map, if it is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The value as a boolean. The strings `true` and `false` (any case) are
    /// accepted so string-valued `refresh_info` maps can replay boolean options.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Str(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Self::Str(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "VARCHAR",
            Self::Bool(_) => "BOOLEAN",
            Self::Map(_) => "MAP",
        }
    }

    /// Read a boolean option, failing with [`SecretError::InvalidOption`] on other types.
    pub(crate) fn expect_bool(&self, option: &str) -> Result<bool, SecretError> {
        self.as_bool().ok_or_else(|| {
            SecretError::InvalidOption(format!(
                "Invalid type past to secret option: '{option}', found '{}', expected: 'BOOLEAN'",
                self.type_name()
            ))
        })
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for SecretValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<BTreeMap<String, String>> for SecretValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Map(value)
    }
}

/// A named, typed credential record made of key/value pairs.
///
/// `Display` and `Debug` print every key but replace the values of
/// `redact_keys` with `redacted`.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyValueSecret {
    /// Secret name, unique within a manager.
    pub name: String,
    /// Secret type, e.g. `s3` or `huggingface`.
    pub secret_type: String,
    /// Provider that created it, e.g. `config`.
    pub provider: String,
    /// URL prefixes the secret applies to.
    pub scope: Vec<String>,
    /// Stored values.
    pub secret_map: BTreeMap<String, SecretValue>,
    /// Keys whose values must never be printed.
    pub redact_keys: BTreeSet<String>,
}

impl KeyValueSecret {
    /// Create an empty secret.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        secret_type: impl Into<String>,
        provider: impl Into<String>,
        scope: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            secret_type: secret_type.into(),
            provider: provider.into(),
            scope,
            secret_map: BTreeMap::new(),
            redact_keys: BTreeSet::new(),
        }
    }

    /// Raw value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SecretValue> {
        self.secret_map.get(key)
    }

    /// String value of `key`. Booleans and maps are not strings.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(SecretValue::as_str)
    }

    /// Boolean value of `key`.
    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(SecretValue::as_bool)
    }

    /// Stored `refresh_info` map, present only on refreshable secrets.
    #[must_use]
    pub fn refresh_info(&self) -> Option<&BTreeMap<String, String>> {
        self.get("refresh_info").and_then(SecretValue::as_map)
    }

    /// Set `key` to `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<SecretValue>) {
        self.secret_map.insert(key.into(), value.into());
    }

    /// Length of the longest scope entry that prefixes `path`, if any matches.
    #[must_use]
    pub fn match_score(&self, path: &str) -> Option<usize> {
        self.scope
            .iter()
            .filter(|prefix| path.starts_with(prefix.as_str()))
            .map(String::len)
            .max()
    }

    fn display_value(&self, key: &str, value: &SecretValue) -> String {
        if self.redact_keys.contains(key) {
            REDACTED.to_owned()
        } else {
            value.to_string()
        }
    }
}

impl fmt::Display for KeyValueSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name={};type={};provider={};scope={}",
            self.name,
            self.secret_type,
            self.provider,
            self.scope.join(",")
        )?;
        for (key, value) in &self.secret_map {
            write!(f, ";{key}={}", self.display_value(key, value))?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyValueSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: BTreeMap<&str, String> = self
            .secret_map
            .iter()
            .map(|(k, v)| (k.as_str(), self.display_value(k, v)))
            .collect();
        f.debug_struct("KeyValueSecret")
            .field("name", &self.name)
            .field("secret_type", &self.secret_type)
            .field("provider", &self.provider)
            .field("scope", &self.scope)
            .field("secret_map", &values)
            .finish_non_exhaustive()
    }
}

/// What to do when a secret with the same name already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnConflict {
    /// Fail with [`SecretError::AlreadyExists`].
    #[default]
    ErrorOnConflict,
    /// Keep the existing secret.
    IgnoreOnConflict,
    /// Replace the existing secret.
    ReplaceOnConflict,
}

/// Whether a secret should outlive the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistType {
    /// Kept in memory only.
    #[default]
    Temporary,
    /// Meant for durable storage by the embedding catalog.
    Persistent,
}

/// A stored secret with its bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEntry {
    /// The secret itself.
    pub secret: KeyValueSecret,
    /// Requested persistence.
    pub persist_type: PersistType,
}

/// Arguments of a secret creation call.
///
/// # Examples
///
/// ```
/// use s3vfs_secrets::secret::{CreateSecretInput, OnConflict};
///
/// let input = CreateSecretInput::builder()
///     .secret_type("s3")
///     .name("my_secret")
///     .build()
///     .with_option("key_id", "AKIA")
///     .with_option("use_ssl", false);
/// assert_eq!(input.provider, None);
/// assert_eq!(input.on_conflict, OnConflict::ErrorOnConflict);
/// assert_eq!(input.options.len(), 2);
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct CreateSecretInput {
    /// Secret type.
    #[builder(setter(into))]
    pub secret_type: String,
    /// Provider; `None` selects the type's default provider.
    #[builder(default, setter(strip_option, into))]
    pub provider: Option<String>,
    /// Secret name.
    #[builder(setter(into))]
    pub name: String,
    /// Scope; empty selects the type's default scope.
    #[builder(default)]
    pub scope: Vec<String>,
    /// Named options. Names are matched case-insensitively.
    #[builder(default)]
    pub options: BTreeMap<String, SecretValue>,
    /// Conflict policy.
    #[builder(default)]
    pub on_conflict: OnConflict,
    /// Persistence.
    #[builder(default)]
    pub persist_type: PersistType,
}

impl CreateSecretInput {
    /// Add an option.
    #[must_use]
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<SecretValue>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Options with lowercased names, in name order.
    pub(crate) fn lowercase_options(&self) -> BTreeMap<String, &SecretValue> {
        self.options
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect()
    }
}
