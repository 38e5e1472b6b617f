//! `referidos-secure-store`: device-bound credential vault for Referidos.
//!
//! A per-install wrapping key seals one device key per user; each user's
//! PIN hash, biometric token, and device secret are sealed under that device
//! key and kept in a local key-value store. Failed PIN attempts are counted
//! in the clear and erase the PIN hash once the limit is reached.
//!
//! [`SecureStorage`] is the entry point; the free functions in each module
//! take any [`KeyValueStore`] and are what it is built from.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod store;

pub mod db;

pub mod records;

pub mod capability;
pub mod clock;
pub mod config;

pub mod device_key;
pub mod wrapping_key;

pub mod credentials;

pub mod attempts;
pub mod verification;

pub mod service;

pub use attempts::{
    get_pin_attempt_state, lockout_remaining_ms, record_pin_attempt, reset_pin_attempts,
    LockoutPolicy, PinAttemptResult,
};
pub use capability::{
    NullAuthenticator, PlatformAuthenticator, SecureStorageMode, StaticAuthenticator,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SecureStoreConfig, CONFIG_FILE, MAX_PIN_ATTEMPTS, MIN_LOCKOUT_DURATION_MS};
pub use credentials::{
    decrypt_for_user, delete_credential, encrypt_for_user, load_credential, save_credential,
};
pub use db::SqliteStore;
pub use device_key::{delete_device_key, discard_orphaned_device_key, get_or_create_device_key};
pub use error::{OperationResult, SecureStoreError};
pub use records::{
    validate_user_id, EncryptedRecord, PinAttemptState, PinHashRecord, Slot, WRAPPING_KEY,
};
pub use service::SecureStorage;
pub use store::{read_record, write_record, KeyValueStore, MemoryStore};
pub use verification::{set_pin, validate_pin, verify_pin, PinVerification, PIN_LENGTH};
pub use wrapping_key::get_or_create_wrapping_key;
