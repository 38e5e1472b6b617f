//! Per-install wrapping key.
//!
//! One AES-256 key per device install, stored as a JWK under
//! [`WRAPPING_KEY`]. It is never rotated or deleted. If the record is lost
//! the next call creates a new key, and every device key wrapped by the old
//! one then fails to unwrap with a decryption error; nothing is recovered or
//! re-wrapped behind the user's back.

use referidos_crypto_core::{ExportedKey, SymmetricKey};

use crate::error::SecureStoreError;
use crate::records::WRAPPING_KEY;
use crate::store::{read_record, KeyValueStore};

/// Load the wrapping key, creating it on first use.
///
/// Creation goes through [`KeyValueStore::put_if_absent`], so concurrent
/// first calls all end up with the same key.
///
/// # Errors
///
/// - [`SecureStoreError::StorageUnavailable`] if the store fails.
/// - [`SecureStoreError::StorageCorrupted`] if the stored record is not a JWK.
/// - [`SecureStoreError::Crypto`] if the JWK holds unusable key material.
pub fn get_or_create_wrapping_key(
    store: &dyn KeyValueStore,
) -> Result<SymmetricKey, SecureStoreError> {
    if let Some(jwk) = read_record::<ExportedKey>(store, WRAPPING_KEY)? {
        return Ok(SymmetricKey::import(&jwk)?);
    }

    let candidate = SymmetricKey::generate()?;
    let stored = store.put_if_absent(WRAPPING_KEY, serde_json::to_value(candidate.export())?)?;
    let jwk: ExportedKey = serde_json::from_value(stored)
        .map_err(|e| SecureStoreError::StorageCorrupted(format!("{WRAPPING_KEY}: {e}")))?;

    let key = SymmetricKey::import(&jwk)?;
    if key.expose() == candidate.expose() {
        tracing::info!("created device wrapping key");
    } else {
        tracing::debug!("wrapping key created concurrently, using stored key");
    }
    Ok(key)
}
