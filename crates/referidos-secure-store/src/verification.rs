//! PIN registration and the verification protocol.
//!
//! Verification order matters: the lockout is checked before the hash is
//! loaded or the KDF runs, so a locked user costs nothing and reveals nothing.

use referidos_crypto_core::{generate_pin_salt, hash_pin, verify_pin_hash, CryptoError};
use serde::{Deserialize, Serialize};

use crate::attempts::{
    get_pin_attempt_state, lockout_remaining_ms, record_pin_attempt, reset_pin_attempts,
    LockoutPolicy,
};
use crate::capability::SecureStorageMode;
use crate::credentials::{load_credential, save_credential};
use crate::error::SecureStoreError;
use crate::records::{PinHashRecord, Slot};
use crate::store::KeyValueStore;

/// Number of digits in a PIN.
pub const PIN_LENGTH: usize = 4;

/// Outcome of one PIN verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PinVerification {
    /// PIN matched; the failure counter was reset.
    Verified,
    /// PIN did not match; the failure was recorded.
    Mismatch {
        /// Failures left before the PIN is erased.
        #[serde(rename = "attemptsRemaining")]
        attempts_remaining: u32,
    },
    /// A lockout is active; nothing was checked or recorded.
    LockedOut {
        /// Wait time to show the user.
        #[serde(rename = "remainingMs")]
        remaining_ms: u64,
        /// Deadline in milliseconds since the Unix epoch.
        #[serde(rename = "lockedUntil")]
        locked_until: u64,
    },
    /// This failure hit the limit: the PIN hash was erased and a lockout set.
    /// The user must create a new PIN once the lockout ends.
    PinCleared {
        /// Deadline in milliseconds since the Unix epoch.
        #[serde(rename = "lockedUntil")]
        locked_until: u64,
    },
    /// No PIN hash is stored for the user.
    NoPinRegistered,
    /// The stored record has a salt or iteration count the KDF refuses.
    /// Nothing was recorded; the user must create a new PIN.
    PinRecordInvalid,
}

impl PinVerification {
    /// Returns `true` only for [`Verified`](Self::Verified).
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Check that `pin` is exactly [`PIN_LENGTH`] ASCII digits.
///
/// # Errors
///
/// Returns [`SecureStoreError::InvalidPin`] otherwise.
pub fn validate_pin(pin: &str) -> Result<(), SecureStoreError> {
    if pin.len() != PIN_LENGTH || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SecureStoreError::InvalidPin(format!(
            "expected {PIN_LENGTH} digits"
        )));
    }
    Ok(())
}

/// Hash `pin` under a fresh salt, store it, and reset the failure counter.
///
/// # Errors
///
/// - [`SecureStoreError::InvalidPin`] for a malformed PIN.
/// - [`SecureStoreError::Crypto`] if `iterations` is below the KDF minimum.
/// - Storage and encryption errors from saving the record.
pub fn set_pin(
    store: &dyn KeyValueStore,
    user_id: &str,
    pin: &str,
    iterations: u32,
) -> Result<(), SecureStoreError> {
    validate_pin(pin)?;
    let salt = generate_pin_salt()?;
    let hash = hash_pin(pin, &salt, iterations)?;
    let record = PinHashRecord {
        salt,
        hash,
        iterations,
    };
    save_credential(store, user_id, Slot::PinHash, &record)?;
    reset_pin_attempts(store, user_id)?;
    tracing::info!(user_id, "PIN set");
    Ok(())
}

/// Run the verification protocol for `pin` at time `now_ms`.
///
/// 1. An active lockout returns [`PinVerification::LockedOut`] immediately.
/// 2. A missing hash returns [`PinVerification::NoPinRegistered`]. In
///    [`SecureStorageMode::Blocked`] the hash always reads as missing.
/// 3. The PIN is hashed with the record's salt and iteration count and
///    compared in constant time. A record the KDF refuses returns
///    [`PinVerification::PinRecordInvalid`] without recording an attempt.
/// 4. The outcome is recorded against `policy`.
///
/// A malformed entry is rejected before step 1 and does not count as an
/// attempt.
///
/// # Errors
///
/// - [`SecureStoreError::InvalidPin`] for a malformed entry.
/// - [`SecureStoreError::Crypto`] if the stored record cannot be opened.
/// - Storage errors.
pub fn verify_pin(
    store: &dyn KeyValueStore,
    user_id: &str,
    pin: &str,
    mode: SecureStorageMode,
    now_ms: u64,
    policy: LockoutPolicy,
) -> Result<PinVerification, SecureStoreError> {
    validate_pin(pin)?;

    let state = get_pin_attempt_state(store, user_id)?;
    if let (Some(remaining_ms), Some(locked_until)) =
        (lockout_remaining_ms(&state, now_ms), state.locked_until)
    {
        tracing::debug!(user_id, remaining_ms, "PIN verification refused during lockout");
        return Ok(PinVerification::LockedOut {
            remaining_ms,
            locked_until,
        });
    }

    let record: Option<PinHashRecord> = if mode.allows_secure_storage() {
        load_credential(store, user_id, Slot::PinHash)?
    } else {
        None
    };
    let Some(record) = record else {
        return Ok(PinVerification::NoPinRegistered);
    };

    let matched = match verify_pin_hash(pin, &record.salt, record.iterations, &record.hash) {
        Ok(matched) => matched,
        Err(CryptoError::KeyDerivation(reason)) => {
            tracing::warn!(user_id, %reason, "stored PIN record is unusable");
            return Ok(PinVerification::PinRecordInvalid);
        }
        Err(e) => return Err(e.into()),
    };
    let result = record_pin_attempt(store, user_id, matched, now_ms, policy)?;

    if matched {
        return Ok(PinVerification::Verified);
    }
    if let Some(locked_until) = result.locked_until {
        return Ok(PinVerification::PinCleared { locked_until });
    }
    let count = get_pin_attempt_state(store, user_id)?.count;
    Ok(PinVerification::Mismatch {
        attempts_remaining: policy.max_attempts.max(1).saturating_sub(count),
    })
}
