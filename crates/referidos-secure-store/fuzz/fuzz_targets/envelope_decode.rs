//! Fuzz target for envelope decoding and opening.
//!
//! Feeds arbitrary bytes as an `{iv, data}` envelope to `decrypt_for_user`.
//! Must never panic, and must never return a payload for input it did not seal.
//!
//! # Usage
//!
//! ```sh
//! cd crates/referidos-secure-store
//! cargo +nightly fuzz run envelope_decode -- -max_len=4096
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use referidos_secure_store::{decrypt_for_user, EncryptedRecord, MemoryStore, Slot};

fuzz_target!(|data: &[u8]| {
    let Ok(record) = serde_json::from_slice::<EncryptedRecord>(data) else {
        return;
    };
    let store = MemoryStore::new();
    let opened =
        decrypt_for_user::<serde_json::Value>(&store, "fuzz", Slot::DeviceSecret, Some(&record));
    assert!(!matches!(opened, Ok(Some(_))), "forged envelope opened");
});
