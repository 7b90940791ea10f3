//! Bearer-token secrets (`huggingface`).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::env::Environment;
use crate::error::SecretError;
use crate::secret::{CreateSecretInput, KeyValueSecret};

/// Secret type of Hugging Face tokens.
pub const HUGGINGFACE_TYPE: &str = "huggingface";

/// The `config` provider: the token is the `token` option.
///
/// # Errors
///
/// Returns [`SecretError::InvalidOption`] for options other than `token`.
pub fn create_from_config(
    input: &CreateSecretInput,
    _env: &dyn Environment,
) -> Result<KeyValueSecret, SecretError> {
    let mut token = String::new();
    for (name, value) in input.lowercase_options() {
        if name == "token" {
            token = value.to_string();
        } else {
            return Err(unknown_option(input, &name));
        }
    }
    Ok(bearer_secret(input, token))
}

/// The `credential_chain` provider for Hugging Face.
///
/// Tries in order: `HF_TOKEN`, the file named by `HF_TOKEN_PATH`,
/// `$HF_HOME/token`, then `~/.cache/huggingface/token`. A file named through
/// an environment variable must be readable; the fixed default path may be
/// missing, which yields an empty token.
///
/// # Errors
///
/// Returns [`SecretError::InvalidOption`] for any option, since the chain
/// takes none, and [`SecretError::Io`] when a file named via `HF_TOKEN_PATH`
/// or `HF_HOME` cannot be read.
pub fn create_huggingface_from_credential_chain(
    input: &CreateSecretInput,
    env: &dyn Environment,
) -> Result<KeyValueSecret, SecretError> {
    if let Some(name) = input.lowercase_options().into_keys().next() {
        return Err(unknown_option(input, &name));
    }

    if let Some(token) = env.var("HF_TOKEN") {
        debug!(secret = %input.name, "Using token from HF_TOKEN");
        return Ok(bearer_secret(input, token));
    }

    if let Some(path) = env.var("HF_TOKEN_PATH") {
        let token = read_token_file(Path::new(&path))
            .map_err(|source| token_error(&path, " fetched from HF_TOKEN_PATH env variable", source))?;
        return Ok(bearer_secret(input, token));
    }

    if let Some(home) = env.var("HF_HOME") {
        let path = PathBuf::from(home).join("token");
        let token = read_token_file(&path).map_err(|source| {
            token_error(
                &path.display().to_string(),
                " constructed using the HF_HOME variable: '$HF_HOME/token'",
                source,
            )
        })?;
        return Ok(bearer_secret(input, token));
    }

    let token = env
        .home_dir()
        .map(|home| home.join(".cache").join("huggingface").join("token"))
        .and_then(|path| read_token_file(&path).ok())
        .unwrap_or_default();
    Ok(bearer_secret(input, token))
}

fn unknown_option(input: &CreateSecretInput, name: &str) -> SecretError {
    SecretError::InvalidOption(format!(
        "Unknown named parameter passed to {} secret creation: {name}",
        input.secret_type
    ))
}

fn bearer_secret(input: &CreateSecretInput, token: String) -> KeyValueSecret {
    let scope = if input.scope.is_empty() && input.secret_type == HUGGINGFACE_TYPE {
        vec!["hf://".to_owned()]
    } else {
        input.scope.clone()
    };
    let provider = input.provider.as_deref().unwrap_or("config");
    let mut secret = KeyValueSecret::new(&input.name, &input.secret_type, provider, scope);
    secret.set("token", token);
    secret.redact_keys.insert("token".to_owned());
    secret
}

/// First line of the file, without its line terminator.
fn read_token_file(path: &Path) -> std::io::Result<String> {
    let mut line = String::new();
    BufReader::new(File::open(path)?).read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_owned())
}

fn token_error(path: &str, origin: &str, source: std::io::Error) -> SecretError {
    SecretError::Io {
        path: path.to_owned(),
        origin: origin.to_owned(),
        source,
    }
}
