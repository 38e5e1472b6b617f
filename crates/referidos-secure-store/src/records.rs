//! Persisted record shapes and the store keys they live under.
//!
//! | key                        | record                         |
//! |----------------------------|--------------------------------|
//! | `wrapping_key`             | JWK ([`ExportedKey`])          |
//! | `device_key_<userId>`      | [`EncryptedRecord`]            |
//! | `pin_hash_<userId>`        | [`EncryptedRecord`] of [`PinHashRecord`] |
//! | `biometric_token_<userId>` | [`EncryptedRecord`] of a string |
//! | `device_secret_<userId>`   | [`EncryptedRecord`] of a string |
//! | `pin_attempts_<userId>`    | [`PinAttemptState`] (plaintext) |
//!
//! [`ExportedKey`]: referidos_crypto_core::ExportedKey

use data_encoding::BASE64;
use referidos_crypto_core::SealedData;
use serde::{Deserialize, Serialize};

use crate::error::SecureStoreError;

/// Store key of the per-install wrapping key.
pub const WRAPPING_KEY: &str = "wrapping_key";

/// Longest accepted user id, in bytes.
const MAX_USER_ID_LEN: usize = 256;

/// Reject user ids that would produce ambiguous or unusable store keys.
///
/// # Errors
///
/// Returns [`SecureStoreError::InvalidUserId`] for an empty, oversized, or
/// control-character-bearing id.
pub fn validate_user_id(user_id: &str) -> Result<(), SecureStoreError> {
    if user_id.is_empty()
        || user_id.len() > MAX_USER_ID_LEN
        || user_id.chars().any(char::is_control)
    {
        return Err(SecureStoreError::InvalidUserId);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Every per-user record kind.
///
/// The slot name prefixes the store key and, for sealed kinds, forms the AAD
/// so a record copied under another slot or user fails to authenticate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Per-user device key, wrapped by the wrapping key.
    DeviceKey,
    /// Sealed [`PinHashRecord`].
    PinHash,
    /// Sealed biometric token.
    BiometricToken,
    /// Sealed device secret.
    DeviceSecret,
    /// Plaintext [`PinAttemptState`].
    PinAttempts,
}

impl Slot {
    /// Slot name as used in store keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::DeviceKey => "device_key",
            Self::PinHash => "pin_hash",
            Self::BiometricToken => "biometric_token",
            Self::DeviceSecret => "device_secret",
            Self::PinAttempts => "pin_attempts",
        }
    }

    /// Store key for `user_id`, e.g. `pin_hash_u1`.
    #[must_use]
    pub fn key(&self, user_id: &str) -> String {
        format!("{}_{user_id}", self.as_str())
    }

    /// Additional authenticated data binding a sealed record to its slot.
    #[must_use]
    pub fn aad(&self, user_id: &str) -> Vec<u8> {
        format!("referidos:{}:{user_id}", self.as_str()).into_bytes()
    }
}

// ---------------------------------------------------------------------------
// EncryptedRecord
// ---------------------------------------------------------------------------

/// Base64 envelope of one AES-GCM seal: `iv` is the nonce, `data` is
/// `ciphertext || tag`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// 96-bit nonce, base64.
    pub iv: String,
    /// Ciphertext followed by the 128-bit tag, base64.
    pub data: String,
}

impl EncryptedRecord {
    /// Encode a seal for storage.
    #[must_use]
    pub fn from_sealed(sealed: &SealedData) -> Self {
        Self {
            iv: BASE64.encode(&sealed.nonce),
            data: BASE64.encode(&sealed.combined()),
        }
    }

    /// Decode back into [`SealedData`]; `None` if either field is not base64
    /// or has an impossible length.
    #[must_use]
    pub fn to_sealed(&self) -> Option<SealedData> {
        let nonce = BASE64.decode(self.iv.as_bytes()).ok()?;
        let combined = BASE64.decode(self.data.as_bytes()).ok()?;
        SealedData::from_combined(&nonce, &combined).ok()
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Salted PIN hash plus the iteration count it was derived with.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinHashRecord {
    /// Base64 salt.
    pub salt: String,
    /// Base64 PBKDF2 output.
    pub hash: String,
    /// PBKDF2 iteration count.
    pub iterations: u32,
}

impl std::fmt::Debug for PinHashRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinHashRecord")
            .field("hash", &"***")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

/// Failed-attempt counter and lockout deadline; stored in plaintext.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinAttemptState {
    /// Consecutive failed verifications.
    #[serde(default)]
    pub count: u32,
    /// Lockout deadline in milliseconds since the Unix epoch.
    #[serde(default)]
    pub locked_until: Option<u64>,
}
