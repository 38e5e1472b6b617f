//! Failed-PIN counter and lockout.
//!
//! The state lives in plaintext under `pin_attempts_<userId>`. Reaching the
//! limit sets a lockout deadline and erases the PIN hash, so after the wait
//! the user must create a new PIN rather than keep guessing. The biometric
//! token and device secret are left alone.
//!
//! The deadline is checked lazily against the wall clock; no timer runs.

use serde::{Deserialize, Serialize};

use crate::credentials::delete_credential;
use crate::error::SecureStoreError;
use crate::records::{validate_user_id, PinAttemptState, Slot};
use crate::store::{read_record, write_record, KeyValueStore};

/// Threshold and lockout length applied by [`record_pin_attempt`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger the lockout (at least 1).
    pub max_attempts: u32,
    /// Lockout length in milliseconds.
    pub lockout_ms: u64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            lockout_ms: 300_000,
        }
    }
}

/// Outcome of recording one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinAttemptResult {
    /// Mirrors the recorded outcome.
    pub ok: bool,
    /// Lockout deadline (ms since epoch) if this attempt triggered one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<u64>,
    /// Whether the stored PIN hash was erased by this attempt.
    #[serde(default)]
    pub pin_cleared: bool,
}

/// Read the attempt state, defaulting to `{count: 0, lockedUntil: null}`.
///
/// # Errors
///
/// - [`SecureStoreError::InvalidUserId`] for an unusable id.
/// - [`SecureStoreError::StorageCorrupted`] if the record has the wrong shape.
/// - [`SecureStoreError::StorageUnavailable`] if the store fails.
pub fn get_pin_attempt_state(
    store: &dyn KeyValueStore,
    user_id: &str,
) -> Result<PinAttemptState, SecureStoreError> {
    validate_user_id(user_id)?;
    Ok(read_record(store, &Slot::PinAttempts.key(user_id))?.unwrap_or_default())
}

/// Reset the state to `{count: 0, lockedUntil: null}`.
///
/// # Errors
///
/// Returns [`SecureStoreError::InvalidUserId`] or a storage error.
pub fn reset_pin_attempts(
    store: &dyn KeyValueStore,
    user_id: &str,
) -> Result<(), SecureStoreError> {
    validate_user_id(user_id)?;
    write_record(
        store,
        &Slot::PinAttempts.key(user_id),
        &PinAttemptState::default(),
    )
}

/// Record one verification outcome at time `now_ms`.
///
/// Success resets the state. Failure increments the counter; once it reaches
/// `policy.max_attempts` the deadline is set to `now_ms + policy.lockout_ms`,
/// the state is persisted, and only then is the PIN hash deleted. If the
/// delete fails the lockout still holds.
///
/// Callers serialize calls per user; the read-modify-write here is not atomic.
///
/// # Errors
///
/// Propagates storage errors from reading or writing the state and from
/// deleting the PIN hash.
pub fn record_pin_attempt(
    store: &dyn KeyValueStore,
    user_id: &str,
    ok: bool,
    now_ms: u64,
    policy: LockoutPolicy,
) -> Result<PinAttemptResult, SecureStoreError> {
    if ok {
        reset_pin_attempts(store, user_id)?;
        return Ok(PinAttemptResult {
            ok: true,
            locked_until: None,
            pin_cleared: false,
        });
    }

    let previous = get_pin_attempt_state(store, user_id)?;
    let count = previous.count.saturating_add(1);
    let max_attempts = policy.max_attempts.max(1);
    let locked_until =
        (count >= max_attempts).then_some(now_ms.saturating_add(policy.lockout_ms));

    write_record(
        store,
        &Slot::PinAttempts.key(user_id),
        &PinAttemptState {
            count,
            locked_until,
        },
    )?;

    let Some(deadline) = locked_until else {
        tracing::debug!(user_id, count, "recorded failed PIN attempt");
        return Ok(PinAttemptResult {
            ok: false,
            locked_until: None,
            pin_cleared: false,
        });
    };

    tracing::warn!(user_id, count, locked_until = deadline, "PIN locked out, erasing PIN hash");
    delete_credential(store, user_id, Slot::PinHash)?;
    Ok(PinAttemptResult {
        ok: false,
        locked_until: Some(deadline),
        pin_cleared: true,
    })
}

/// Milliseconds left on the lockout at `now_ms`, or `None` if not locked.
#[must_use]
pub fn lockout_remaining_ms(state: &PinAttemptState, now_ms: u64) -> Option<u64> {
    state
        .locked_until
        .filter(|&deadline| deadline > now_ms)
        .map(|deadline| deadline.saturating_sub(now_ms))
}
