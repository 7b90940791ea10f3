//! Re-creating refreshable secrets after an authentication failure.

use std::collections::BTreeMap;

use tracing::info;

use crate::error::SecretError;
use crate::manager::SecretManager;
use crate::secret::{CreateSecretInput, OnConflict, PersistType, SecretEntry, SecretValue};

/// Build the creation input that replays a secret's `refresh_info`.
///
/// Returns `None` when the secret is not refreshable.
#[must_use]
pub fn refresh_input(entry: &SecretEntry) -> Option<CreateSecretInput> {
    let secret = &entry.secret;
    let refresh_info = secret.refresh_info()?;
    let options: BTreeMap<String, SecretValue> = refresh_info
        .iter()
        .map(|(k, v)| (k.clone(), SecretValue::from(v.as_str())))
        .collect();

    Some(CreateSecretInput {
        secret_type: secret.secret_type.clone(),
        provider: Some(secret.provider.clone()),
        name: secret.name.clone(),
        scope: secret.scope.clone(),
        options,
        on_conflict: OnConflict::ReplaceOnConflict,
        persist_type: PersistType::Temporary,
    })
}

/// Re-create `entry` from its `refresh_info` and replace it in `manager`.
///
/// Returns `Ok(false)` without side effects when the secret has no
/// `refresh_info`, and `Ok(true)` once the new secret is stored.
///
/// # Errors
///
/// Returns [`SecretError::RefreshFailure`] naming the secret when the
/// creation call fails.
pub fn try_refresh(manager: &SecretManager, entry: &SecretEntry) -> Result<bool, SecretError> {
    let Some(input) = refresh_input(entry) else {
        return Ok(false);
    };

    match manager.create_secret(&input) {
        Ok(refreshed) => {
            info!(
                secret = %entry.secret.name,
                key_id = refreshed.secret.get_str("key_id").unwrap_or_default(),
                "Successfully refreshed secret"
            );
            Ok(true)
        }
        Err(err) => Err(SecretError::RefreshFailure {
            name: entry.secret.name.clone(),
            message: err.to_string(),
        }),
    }
}
