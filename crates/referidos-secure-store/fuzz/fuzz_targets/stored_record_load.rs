//! Fuzz target for reading arbitrary JSON out of every store slot.
//!
//! Plants the input under the wrapping key, a device key, and the attempt
//! counter, then drives the facade. Must never panic.

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use referidos_secure_store::{
    KeyValueStore, MemoryStore, SecureStorage, SecureStorageMode, StaticAuthenticator,
};

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let store = Arc::new(MemoryStore::new());
    for key in ["wrapping_key", "device_key_fuzz", "pin_attempts_fuzz", "pin_hash_fuzz"] {
        let _ = store.put(key, value.clone());
    }
    let platform = Arc::new(StaticAuthenticator::for_mode(SecureStorageMode::WebauthnGate));
    let storage = SecureStorage::new(store, platform);

    let _ = storage.get_pin_attempt_state("fuzz");
    let _ = storage.load_pin_hash("fuzz");
    let _ = storage.save_device_secret("fuzz", "s");
});
