//! Per-user device keys, wrapped by the install's wrapping key.
//!
//! Each user id gets its own AES-256 key stored as an [`EncryptedRecord`]
//! under `device_key_<userId>`. Deleting that one record destroys the user's
//! sealed credentials without touching any other user.

use referidos_crypto_core::{unwrap_key, wrap_key, CryptoError, SymmetricKey};

use crate::error::SecureStoreError;
use crate::records::{validate_user_id, EncryptedRecord, Slot};
use crate::store::{read_record, KeyValueStore};
use crate::wrapping_key::get_or_create_wrapping_key;

/// Load the device key for `user_id`, creating and wrapping it on first use.
///
/// # Errors
///
/// - [`SecureStoreError::InvalidUserId`] for an unusable id.
/// - [`SecureStoreError::StorageCorrupted`] if the wrapped record is not a
///   valid envelope.
/// - [`SecureStoreError::Crypto`] with `CryptoError::Decryption` if the record
///   was sealed by a different wrapping key or modified.
/// - [`SecureStoreError::StorageUnavailable`] if the store fails.
pub fn get_or_create_device_key(
    store: &dyn KeyValueStore,
    user_id: &str,
) -> Result<SymmetricKey, SecureStoreError> {
    validate_user_id(user_id)?;
    let slot_key = Slot::DeviceKey.key(user_id);
    let aad = Slot::DeviceKey.aad(user_id);
    let wrapping_key = get_or_create_wrapping_key(store)?;

    if let Some(record) = read_record::<EncryptedRecord>(store, &slot_key)? {
        return unwrap_record(&record, &wrapping_key, &aad, &slot_key);
    }

    let candidate = SymmetricKey::generate()?;
    let sealed = wrap_key(&candidate, &wrapping_key, &aad)?;
    let record = EncryptedRecord::from_sealed(&sealed);
    let stored = store.put_if_absent(&slot_key, serde_json::to_value(&record)?)?;
    let stored: EncryptedRecord = serde_json::from_value(stored)
        .map_err(|e| SecureStoreError::StorageCorrupted(format!("{slot_key}: {e}")))?;

    if stored == record {
        tracing::info!(user_id, "created device key");
        return Ok(candidate);
    }
    tracing::debug!(user_id, "device key created concurrently, using stored key");
    unwrap_record(&stored, &wrapping_key, &aad, &slot_key)
}

/// Remove the wrapped device key for `user_id`.
///
/// Every credential sealed under it becomes permanently unreadable.
///
/// # Errors
///
/// Returns [`SecureStoreError::InvalidUserId`] or a storage error.
pub fn delete_device_key(store: &dyn KeyValueStore, user_id: &str) -> Result<(), SecureStoreError> {
    validate_user_id(user_id)?;
    store.delete(&Slot::DeviceKey.key(user_id))?;
    tracing::info!(user_id, "deleted device key");
    Ok(())
}

/// Delete the device key for `user_id` if it no longer opens under the
/// current wrapping key. Returns whether a record was removed.
///
/// A lost wrapping key leaves every existing device key sealed under a key
/// that is gone; until the record is removed, each save for that user fails.
///
/// # Errors
///
/// Returns [`SecureStoreError::InvalidUserId`] or a storage error.
pub fn discard_orphaned_device_key(
    store: &dyn KeyValueStore,
    user_id: &str,
) -> Result<bool, SecureStoreError> {
    validate_user_id(user_id)?;
    let slot_key = Slot::DeviceKey.key(user_id);
    let Some(record) = read_record::<EncryptedRecord>(store, &slot_key)? else {
        return Ok(false);
    };
    let wrapping_key = get_or_create_wrapping_key(store)?;

    let aad = Slot::DeviceKey.aad(user_id);
    match unwrap_record(&record, &wrapping_key, &aad, &slot_key) {
        Ok(_) => return Ok(false),
        Err(
            SecureStoreError::Crypto(CryptoError::Decryption)
            | SecureStoreError::StorageCorrupted(_),
        ) => {}
        Err(e) => return Err(e),
    }
    store.delete(&slot_key)?;
    tracing::warn!(user_id, "discarded device key that no longer unwraps");
    Ok(true)
}

fn unwrap_record(
    record: &EncryptedRecord,
    wrapping_key: &SymmetricKey,
    aad: &[u8],
    slot_key: &str,
) -> Result<SymmetricKey, SecureStoreError> {
    let sealed = record.to_sealed().ok_or_else(|| {
        SecureStoreError::StorageCorrupted(format!("{slot_key}: malformed envelope"))
    })?;
    unwrap_key(&sealed, wrapping_key, aad).map_err(|e| {
        tracing::warn!(slot = slot_key, "device key failed to unwrap");
        SecureStoreError::from(e)
    })
}
