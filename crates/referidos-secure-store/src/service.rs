//! The `SecureStorage` facade used by the app.
//!
//! Ties the record store, the platform capability gate, the clock, and the
//! configured PIN policy together. Every secure save checks the gate first
//! and refuses with [`SecureStoreError::CapabilityUnavailable`] before the
//! store is touched; every secure load returns `Ok(None)` while blocked.
//!
//! PIN attempt bookkeeping is serialized through one mutex per user id, so
//! sequential verifications for a user always see a growing counter while
//! other users' key derivations run in parallel.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::attempts::{self, LockoutPolicy, PinAttemptResult};
use crate::capability::{PlatformAuthenticator, SecureStorageMode};
use crate::clock::{Clock, SystemClock};
use crate::config::SecureStoreConfig;
use crate::credentials;
use crate::db::SqliteStore;
use crate::device_key;
use crate::error::SecureStoreError;
use crate::records::{validate_user_id, EncryptedRecord, PinAttemptState, PinHashRecord, Slot};
use crate::store::KeyValueStore;
use crate::verification::{self, PinVerification};

/// Secure local credential vault for one device install.
pub struct SecureStorage {
    store: Arc<dyn KeyValueStore>,
    platform: Arc<dyn PlatformAuthenticator>,
    clock: Arc<dyn Clock>,
    config: SecureStoreConfig,
    attempt_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for SecureStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureStorage")
            .field("mode", &self.get_secure_storage_mode())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SecureStorage {
    /// Build over an existing store with the default policy and system clock.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, platform: Arc<dyn PlatformAuthenticator>) -> Self {
        Self {
            store,
            platform,
            clock: Arc::new(SystemClock),
            config: SecureStoreConfig::default(),
            attempt_locks: Mutex::default(),
        }
    }

    /// Replace the policy. Out-of-range values are clamped.
    #[must_use]
    pub fn with_config(mut self, config: SecureStoreConfig) -> Self {
        self.config = config.validated();
        self
    }

    /// Replace the clock used for lockout deadlines.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Open the on-disk vault in `data_dir`, creating the directory and the
    /// database on first use. The policy comes from `secure_store.json` in
    /// the same directory, or the defaults.
    ///
    /// # Errors
    ///
    /// - [`SecureStoreError::Io`] if the directory cannot be created.
    /// - [`SecureStoreError::StorageUnavailable`] if the database cannot be
    ///   opened.
    pub fn open(
        data_dir: &Path,
        platform: Arc<dyn PlatformAuthenticator>,
    ) -> Result<Self, SecureStoreError> {
        std::fs::create_dir_all(data_dir)?;
        let config = SecureStoreConfig::load(data_dir);
        let store = SqliteStore::open(&data_dir.join(&config.database_file))?;
        tracing::info!(path = %data_dir.display(), "opened secure store");
        Ok(Self::new(Arc::new(store), platform).with_config(config))
    }

    /// The active policy.
    #[must_use]
    pub const fn config(&self) -> &SecureStoreConfig {
        &self.config
    }

    fn policy(&self) -> LockoutPolicy {
        LockoutPolicy {
            max_attempts: self.config.max_pin_attempts,
            lockout_ms: self.config.lockout_duration_ms,
        }
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .attempt_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(user_id.to_owned()).or_default())
    }

    // -----------------------------------------------------------------------
    // Capability gate
    // -----------------------------------------------------------------------

    /// Ask the platform what secure storage it supports.
    #[must_use]
    pub fn get_secure_storage_mode(&self) -> SecureStorageMode {
        SecureStorageMode::detect(self.platform.as_ref())
    }

    fn require_secure_storage(&self, slot: Slot) -> Result<(), SecureStoreError> {
        if self.get_secure_storage_mode().allows_secure_storage() {
            return Ok(());
        }
        tracing::warn!(slot = slot.as_str(), "secure save refused: no platform authenticator");
        Err(SecureStoreError::CapabilityUnavailable)
    }

    // -----------------------------------------------------------------------
    // Envelopes
    // -----------------------------------------------------------------------

    /// Seal `payload` for `user_id` in `slot`, creating keys on first use.
    ///
    /// # Errors
    ///
    /// Propagates key-management, serialization, and storage errors.
    pub fn encrypt_for_user<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        slot: Slot,
        payload: &T,
    ) -> Result<EncryptedRecord, SecureStoreError> {
        credentials::encrypt_for_user(self.store.as_ref(), user_id, slot, payload)
    }

    /// Open an envelope from [`encrypt_for_user`](Self::encrypt_for_user).
    ///
    /// `Ok(None)` for an absent or malformed envelope.
    ///
    /// # Errors
    ///
    /// A tampered envelope or one sealed under another key is
    /// [`SecureStoreError::Crypto`] with `CryptoError::Decryption`.
    pub fn decrypt_for_user<T: DeserializeOwned>(
        &self,
        user_id: &str,
        slot: Slot,
        record: Option<&EncryptedRecord>,
    ) -> Result<Option<T>, SecureStoreError> {
        credentials::decrypt_for_user(self.store.as_ref(), user_id, slot, record)
    }

    fn save_gated<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        slot: Slot,
        payload: &T,
    ) -> Result<(), SecureStoreError> {
        self.require_secure_storage(slot)?;
        credentials::save_credential(self.store.as_ref(), user_id, slot, payload)
    }

    fn load_gated<T: DeserializeOwned>(
        &self,
        user_id: &str,
        slot: Slot,
    ) -> Result<Option<T>, SecureStoreError> {
        if !self.get_secure_storage_mode().allows_secure_storage() {
            return Ok(None);
        }
        credentials::load_credential(self.store.as_ref(), user_id, slot)
    }

    // -----------------------------------------------------------------------
    // Stored credentials
    // -----------------------------------------------------------------------

    /// Seal and store the biometric token.
    ///
    /// # Errors
    ///
    /// [`SecureStoreError::CapabilityUnavailable`] while blocked, otherwise
    /// encryption and storage errors.
    pub fn save_biometric_token(&self, user_id: &str, token: &str) -> Result<(), SecureStoreError> {
        self.save_gated(user_id, Slot::BiometricToken, token)
    }

    /// Load the biometric token; `None` if absent or blocked.
    ///
    /// # Errors
    ///
    /// Decryption and storage errors.
    pub fn load_biometric_token(&self, user_id: &str) -> Result<Option<String>, SecureStoreError> {
        self.load_gated(user_id, Slot::BiometricToken)
    }

    /// Delete the biometric token.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn delete_biometric_token(&self, user_id: &str) -> Result<(), SecureStoreError> {
        credentials::delete_credential(self.store.as_ref(), user_id, Slot::BiometricToken)
    }

    /// Seal and store a PIN hash record as given.
    ///
    /// Most callers want [`set_pin`](Self::set_pin), which also hashes.
    ///
    /// # Errors
    ///
    /// [`SecureStoreError::CapabilityUnavailable`] while blocked, otherwise
    /// encryption and storage errors.
    pub fn save_pin_hash(
        &self,
        user_id: &str,
        record: &PinHashRecord,
    ) -> Result<(), SecureStoreError> {
        self.save_gated(user_id, Slot::PinHash, record)
    }

    /// Load the PIN hash record; `None` if absent, erased, or blocked.
    ///
    /// # Errors
    ///
    /// Decryption and storage errors.
    pub fn load_pin_hash(&self, user_id: &str) -> Result<Option<PinHashRecord>, SecureStoreError> {
        self.load_gated(user_id, Slot::PinHash)
    }

    /// Delete the PIN hash record.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn delete_pin_hash(&self, user_id: &str) -> Result<(), SecureStoreError> {
        credentials::delete_credential(self.store.as_ref(), user_id, Slot::PinHash)
    }

    /// Seal and store the device secret.
    ///
    /// # Errors
    ///
    /// [`SecureStoreError::CapabilityUnavailable`] while blocked, otherwise
    /// encryption and storage errors.
    pub fn save_device_secret(&self, user_id: &str, secret: &str) -> Result<(), SecureStoreError> {
        self.save_gated(user_id, Slot::DeviceSecret, secret)
    }

    /// Load the device secret; `None` if absent or blocked.
    ///
    /// # Errors
    ///
    /// Decryption and storage errors.
    pub fn load_device_secret(&self, user_id: &str) -> Result<Option<String>, SecureStoreError> {
        self.load_gated(user_id, Slot::DeviceSecret)
    }

    /// Delete the device secret.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn delete_device_secret(&self, user_id: &str) -> Result<(), SecureStoreError> {
        credentials::delete_credential(self.store.as_ref(), user_id, Slot::DeviceSecret)
    }

    // -----------------------------------------------------------------------
    // Attempts and PIN
    // -----------------------------------------------------------------------

    /// Current failure count and lockout deadline.
    ///
    /// # Errors
    ///
    /// Storage errors, or a corrupted attempt record.
    pub fn get_pin_attempt_state(
        &self,
        user_id: &str,
    ) -> Result<PinAttemptState, SecureStoreError> {
        attempts::get_pin_attempt_state(self.store.as_ref(), user_id)
    }

    /// Record a verification outcome with the configured attempt limit.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn record_pin_attempt(
        &self,
        user_id: &str,
        ok: bool,
    ) -> Result<PinAttemptResult, SecureStoreError> {
        self.record_pin_attempt_with_limit(user_id, ok, self.config.max_pin_attempts)
    }

    /// Record a verification outcome with an explicit attempt limit.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn record_pin_attempt_with_limit(
        &self,
        user_id: &str,
        ok: bool,
        max_attempts: u32,
    ) -> Result<PinAttemptResult, SecureStoreError> {
        let policy = LockoutPolicy {
            max_attempts,
            ..self.policy()
        };
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        attempts::record_pin_attempt(self.store.as_ref(), user_id, ok, self.clock.now_ms(), policy)
    }

    /// Milliseconds left on the user's lockout, `None` if not locked.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn lockout_remaining_ms(&self, user_id: &str) -> Result<Option<u64>, SecureStoreError> {
        let state = self.get_pin_attempt_state(user_id)?;
        Ok(attempts::lockout_remaining_ms(&state, self.clock.now_ms()))
    }

    /// Hash and store a new 4-digit PIN, resetting the failure counter.
    ///
    /// # Errors
    ///
    /// - [`SecureStoreError::CapabilityUnavailable`] while blocked.
    /// - [`SecureStoreError::InvalidPin`] for a malformed PIN.
    /// - Encryption and storage errors.
    pub fn set_pin(&self, user_id: &str, pin: &str) -> Result<(), SecureStoreError> {
        self.require_secure_storage(Slot::PinHash)?;
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        verification::set_pin(self.store.as_ref(), user_id, pin, self.config.pin_iterations)
    }

    /// Whether a PIN hash is stored and readable.
    ///
    /// # Errors
    ///
    /// Decryption and storage errors.
    pub fn has_pin(&self, user_id: &str) -> Result<bool, SecureStoreError> {
        Ok(self.load_pin_hash(user_id)?.is_some())
    }

    /// Check an entered PIN, recording the outcome.
    ///
    /// # Errors
    ///
    /// [`SecureStoreError::InvalidPin`] for a malformed entry, otherwise
    /// decryption and storage errors. Lockout and a missing PIN are
    /// [`PinVerification`] outcomes, not errors.
    pub fn verify_pin(
        &self,
        user_id: &str,
        pin: &str,
    ) -> Result<PinVerification, SecureStoreError> {
        let mode = self.get_secure_storage_mode();
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        verification::verify_pin(
            self.store.as_ref(),
            user_id,
            pin,
            mode,
            self.clock.now_ms(),
            self.policy(),
        )
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    /// Delete the user's PIN hash, biometric token, device secret, and attempt
    /// state. A device key that still unwraps stays, so new credentials reuse
    /// it; one orphaned by a lost wrapping key is deleted so the next save
    /// creates a fresh one.
    ///
    /// # Errors
    ///
    /// Storage errors; records deleted before the failure stay deleted.
    pub fn clear_user_security_material(&self, user_id: &str) -> Result<(), SecureStoreError> {
        validate_user_id(user_id)?;
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in [
            Slot::BiometricToken,
            Slot::PinHash,
            Slot::DeviceSecret,
            Slot::PinAttempts,
        ] {
            self.store.delete(&slot.key(user_id))?;
        }
        device_key::discard_orphaned_device_key(self.store.as_ref(), user_id)?;
        tracing::info!(user_id, "cleared user security material");
        Ok(())
    }

    /// [`clear_user_security_material`](Self::clear_user_security_material)
    /// plus the device key.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub fn destroy_user_vault(&self, user_id: &str) -> Result<(), SecureStoreError> {
        self.clear_user_security_material(user_id)?;
        device_key::delete_device_key(self.store.as_ref(), user_id)
    }
}
