//! Secret error types.

/// Errors raised while creating, looking up or refreshing secrets.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// An option passed to a creation function is unknown or has the wrong type.
    #[error("Invalid secret option: {0}")]
    InvalidOption(String),

    /// A token file could not be read.
    #[error("Failed to read token path '{path}'{origin}. (error: {source})")]
    Io {
        /// Path that was read.
        path: String,
        /// Where the path came from, e.g. " fetched from HF_TOKEN_PATH env variable".
        origin: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No creation function is registered for the type/provider pair.
    #[error("Secret type '{secret_type}' has no provider '{provider}'")]
    UnknownProvider {
        /// Secret type.
        secret_type: String,
        /// Requested provider.
        provider: String,
    },

    /// A secret with this name already exists and the conflict policy is to fail.
    #[error("Secret with name '{0}' already exists")]
    AlreadyExists(String),

    /// No secret with this name exists.
    #[error("Secret with name '{0}' not found")]
    NotFound(String),

    /// Re-creating a refreshable secret failed.
    #[error(
        "Exception thrown while trying to refresh secret {name}. To fix this, please recreate or \
         remove the secret and try again. Error: '{message}'"
    )]
    RefreshFailure {
        /// Secret name.
        name: String,
        /// Message of the creation error.
        message: String,
    },
}
