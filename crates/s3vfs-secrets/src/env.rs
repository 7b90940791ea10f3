//! Access to environment variables.
//!
//! Creation functions and credential resolution read the environment through
//! [`Environment`] so tests can supply a fixed set of variables instead of
//! mutating the process environment.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use parking_lot::RwLock;

/// A source of environment variables.
pub trait Environment: Send + Sync + fmt::Debug {
    /// Value of `name`. Unset and empty variables both read as `None`.
    fn var(&self, name: &str) -> Option<String>;

    /// The user's home directory.
    fn home_dir(&self) -> Option<PathBuf> {
        self.var("HOME").map(PathBuf::from)
    }
}

/// The environment of the running process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}

/// A fixed, mutable set of variables.
///
/// # Examples
///
/// ```
/// use s3vfs_secrets::env::{Environment, StaticEnvironment};
///
/// let env = StaticEnvironment::new().with("HF_TOKEN", "abc");
/// assert_eq!(env.var("HF_TOKEN").as_deref(), Some("abc"));
/// assert_eq!(env.var("HF_HOME"), None);
/// ```
#[derive(Debug, Default)]
pub struct StaticEnvironment {
    vars: RwLock<HashMap<String, String>>,
}

impl StaticEnvironment {
    /// Create an empty environment.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a variable.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.write().insert(name.into(), value.into());
    }

    /// Unset a variable.
    pub fn remove(&self, name: &str) {
        self.vars.write().remove(name);
    }
}

impl Environment for StaticEnvironment {
    fn var(&self, name: &str) -> Option<String> {
        self.vars
            .read()
            .get(name)
            .filter(|value| !value.is_empty())
            .cloned()
    }
}
