//! Key-value persistence contract and the in-memory implementation.
//!
//! Records are JSON values whose binary fields are base64 strings. Each key is
//! read and written atomically; there are no cross-key transactions, so callers
//! never assume that two records change together.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::SecureStoreError;

/// On-device persistent store of JSON records keyed by string.
pub trait KeyValueStore: Send + Sync {
    /// Read the record stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SecureStoreError::StorageUnavailable`] if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<Value>, SecureStoreError>;

    /// Store `record` under `key`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`SecureStoreError::StorageUnavailable`] if the write fails.
    fn put(&self, key: &str, record: Value) -> Result<(), SecureStoreError>;

    /// Store `record` only if `key` is empty, and return whichever record is
    /// stored afterwards.
    ///
    /// This is the compare-and-set used by lazy key creation: when two callers
    /// race to create the same key, both get the winner's record back.
    ///
    /// # Errors
    ///
    /// Returns [`SecureStoreError::StorageUnavailable`] if the store cannot be
    /// read or written.
    fn put_if_absent(&self, key: &str, record: Value) -> Result<Value, SecureStoreError>;

    /// Remove the record under `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`SecureStoreError::StorageUnavailable`] if the delete fails.
    fn delete(&self, key: &str) -> Result<(), SecureStoreError>;
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// Read and deserialize the record under `key`.
///
/// # Errors
///
/// Returns [`SecureStoreError::StorageCorrupted`] if the stored JSON does not
/// match `T`, or any error from [`KeyValueStore::get`].
pub fn read_record<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, SecureStoreError> {
    store
        .get(key)?
        .map(|value| {
            serde_json::from_value(value)
                .map_err(|e| SecureStoreError::StorageCorrupted(format!("{key}: {e}")))
        })
        .transpose()
}

/// Serialize `record` and store it under `key`.
///
/// # Errors
///
/// Returns [`SecureStoreError::Serialization`] or any error from
/// [`KeyValueStore::put`].
pub fn write_record<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    record: &T,
) -> Result<(), SecureStoreError> {
    store.put(key, serde_json::to_value(record)?)
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// Process-local store backed by a `HashMap`.
///
/// Nothing survives the process. Used for tests and for sessions that must
/// not leave anything on disk. [`set_available`](Self::set_available)
/// simulates an unreachable backing store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Value>>,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle availability; while unavailable every call fails.
    pub fn set_available(&self, available: bool) {
        self.offline.store(!available, Ordering::SeqCst);
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if a record exists under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    fn ensure_available(&self) -> Result<(), SecureStoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(SecureStoreError::StorageUnavailable(
                "memory store is offline".into(),
            ));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SecureStoreError> {
        self.ensure_available()?;
        let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(key).cloned())
    }

    fn put(&self, key: &str, record: Value) -> Result<(), SecureStoreError> {
        self.ensure_available()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.insert(key.to_owned(), record);
        Ok(())
    }

    fn put_if_absent(&self, key: &str, record: Value) -> Result<Value, SecureStoreError> {
        self.ensure_available()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Ok(records.entry(key.to_owned()).or_insert(record).clone())
    }

    fn delete(&self, key: &str) -> Result<(), SecureStoreError> {
        self.ensure_available()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(key);
        Ok(())
    }
}
