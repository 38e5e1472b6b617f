//! Sealing and opening per-user payloads under the user's device key.
//!
//! Payloads are serialized to JSON bytes, sealed with AES-256-GCM under a
//! fresh nonce, and stored as an [`EncryptedRecord`]. The slot's AAD is bound
//! into every seal, so a record copied to another slot or user does not open.

use referidos_crypto_core::SecretBuffer;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroizing;

use crate::device_key::get_or_create_device_key;
use crate::error::SecureStoreError;
use crate::records::{validate_user_id, EncryptedRecord, Slot};
use crate::store::{read_record, write_record, KeyValueStore};

/// Seal `payload` for `user_id` in `slot`.
///
/// # Errors
///
/// Propagates device-key, serialization, and encryption errors.
pub fn encrypt_for_user<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    user_id: &str,
    slot: Slot,
    payload: &T,
) -> Result<EncryptedRecord, SecureStoreError> {
    let device_key = get_or_create_device_key(store, user_id)?;
    let plaintext = Zeroizing::new(serde_json::to_vec(payload)?);
    let sealed = device_key.seal(&plaintext, &slot.aad(user_id))?;
    Ok(EncryptedRecord::from_sealed(&sealed))
}

/// Open an envelope sealed by [`encrypt_for_user`].
///
/// Returns `Ok(None)` when `record` is absent or not a well-formed envelope.
/// An envelope that fails authentication is an error, never `None`.
///
/// # Errors
///
/// - [`SecureStoreError::Crypto`] with `CryptoError::Decryption` on a tag
///   mismatch (tampering or wrong key).
/// - [`SecureStoreError::StorageCorrupted`] if the decrypted bytes are not a
///   `T`.
/// - Device-key errors.
pub fn decrypt_for_user<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    user_id: &str,
    slot: Slot,
    record: Option<&EncryptedRecord>,
) -> Result<Option<T>, SecureStoreError> {
    let Some(sealed) = record.and_then(EncryptedRecord::to_sealed) else {
        return Ok(None);
    };
    let device_key = get_or_create_device_key(store, user_id)?;
    let plaintext: SecretBuffer = device_key.open(&sealed, &slot.aad(user_id)).map_err(|e| {
        tracing::warn!(user_id, slot = slot.as_str(), "envelope failed to authenticate");
        SecureStoreError::from(e)
    })?;
    serde_json::from_slice(plaintext.expose())
        .map(Some)
        .map_err(|e| SecureStoreError::StorageCorrupted(format!("{}: {e}", slot.key(user_id))))
}

/// Seal `payload` and store it under the slot's key.
///
/// # Errors
///
/// Propagates [`encrypt_for_user`] and storage errors.
pub fn save_credential<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    user_id: &str,
    slot: Slot,
    payload: &T,
) -> Result<(), SecureStoreError> {
    let record = encrypt_for_user(store, user_id, slot, payload)?;
    write_record(store, &slot.key(user_id), &record)?;
    tracing::debug!(user_id, slot = slot.as_str(), "saved credential");
    Ok(())
}

/// Load and open the record under the slot's key.
///
/// A stored value that is not an envelope at all reads as absent, matching
/// [`decrypt_for_user`].
///
/// # Errors
///
/// Propagates [`decrypt_for_user`] and storage errors.
pub fn load_credential<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    user_id: &str,
    slot: Slot,
) -> Result<Option<T>, SecureStoreError> {
    validate_user_id(user_id)?;
    let record = match read_record::<EncryptedRecord>(store, &slot.key(user_id)) {
        Ok(record) => record,
        Err(SecureStoreError::StorageCorrupted(detail)) => {
            tracing::warn!(user_id, slot = slot.as_str(), %detail, "ignoring malformed envelope");
            None
        }
        Err(e) => return Err(e),
    };
    decrypt_for_user(store, user_id, slot, record.as_ref())
}

/// Remove the record under the slot's key. Absent records are fine.
///
/// # Errors
///
/// Returns [`SecureStoreError::InvalidUserId`] or a storage error.
pub fn delete_credential(
    store: &dyn KeyValueStore,
    user_id: &str,
    slot: Slot,
) -> Result<(), SecureStoreError> {
    validate_user_id(user_id)?;
    store.delete(&slot.key(user_id))?;
    tracing::debug!(user_id, slot = slot.as_str(), "deleted credential");
    Ok(())
}
