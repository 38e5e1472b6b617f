//! Error types for `referidos-secure-store`.

use referidos_crypto_core::CryptoError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by secure store operations.
#[derive(Debug, Error)]
pub enum SecureStoreError {
    /// Cryptographic operation failed (delegated from crypto-core).
    ///
    /// `CryptoError::Decryption` means a stored envelope or wrapped key did
    /// not authenticate: tampering, corruption, or a lost wrapping key.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The platform has no user-verifying authenticator; secure saves refuse.
    #[error("platform authenticator not available")]
    CapabilityUnavailable,

    /// The persistent store could not be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A stored record exists but has the wrong shape.
    #[error("stored record is corrupted: {0}")]
    StorageCorrupted(String),

    /// User ids must be non-empty and free of control characters.
    #[error("invalid user id")]
    InvalidUserId,

    /// PIN rejected before hashing (must be exactly 4 ASCII digits).
    #[error("invalid PIN: {0}")]
    InvalidPin(String),

    /// A payload could not be converted to or from JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem (configuration file, database directory).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SecureStoreError {
    /// Stable machine-readable code for UI layers.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Crypto(CryptoError::Decryption) => "decryption_failed",
            Self::Crypto(_) => "crypto_error",
            Self::CapabilityUnavailable => "webauthn_not_available",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::StorageCorrupted(_) => "storage_corrupted",
            Self::InvalidUserId => "invalid_user_id",
            Self::InvalidPin(_) => "invalid_pin",
            Self::Serialization(_) => "serialization_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Returns `true` if an envelope or wrapped key failed authentication.
    #[must_use]
    pub const fn is_decryption_failure(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::Decryption))
    }
}

impl From<rusqlite::Error> for SecureStoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

/// `{ ok, error }` result object handed to UI layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    /// Whether the operation succeeded.
    pub ok: bool,
    /// Error code from [`SecureStoreError::code`] when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    /// A successful result.
    #[must_use]
    pub const fn success() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    /// A failed result carrying the error's code.
    #[must_use]
    pub fn failure(err: &SecureStoreError) -> Self {
        Self {
            ok: false,
            error: Some(err.code().into()),
        }
    }
}

impl<T> From<&Result<T, SecureStoreError>> for OperationResult {
    fn from(result: &Result<T, SecureStoreError>) -> Self {
        match result {
            Ok(_) => Self::success(),
            Err(err) => Self::failure(err),
        }
    }
}
