#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Integration tests for the `SecureStorage` facade over an in-memory store.
//!
//! Covers the credential round-trips, the capability gate, the lockout
//! lifecycle, and cleanup, as the app drives them.

use std::sync::Arc;

use data_encoding::BASE64;
use referidos_crypto_core::MIN_PIN_ITERATIONS;
use referidos_secure_store::{
    EncryptedRecord, KeyValueStore, ManualClock, MemoryStore, OperationResult, PinAttemptState,
    PinHashRecord, PinVerification, SecureStorage, SecureStorageMode, SecureStoreConfig,
    SecureStoreError, Slot, StaticAuthenticator,
};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

const START_MS: u64 = 1_700_000_000_000;
const FIVE_MINUTES_MS: u64 = 300_000;

struct Harness {
    storage: SecureStorage,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

fn harness(mode: SecureStorageMode) -> Harness {
    harness_over(Arc::new(MemoryStore::new()), mode)
}

fn harness_over(store: Arc<MemoryStore>, mode: SecureStorageMode) -> Harness {
    let clock = Arc::new(ManualClock::new(START_MS));
    let config = SecureStoreConfig {
        pin_iterations: MIN_PIN_ITERATIONS,
        ..SecureStoreConfig::default()
    };
    let storage = SecureStorage::new(store.clone(), Arc::new(StaticAuthenticator::for_mode(mode)))
        .with_config(config)
        .with_clock(clock.clone());
    Harness {
        storage,
        store,
        clock,
    }
}

fn scenario_pin() -> PinHashRecord {
    PinHashRecord {
        salt: "s".into(),
        hash: "h".into(),
        iterations: 160_000,
    }
}

fn flip_first_data_byte(store: &MemoryStore, key: &str) {
    let mut record: EncryptedRecord =
        serde_json::from_value(store.get(key).unwrap().unwrap()).unwrap();
    let mut data = BASE64.decode(record.data.as_bytes()).unwrap();
    data[0] ^= 0x01;
    record.data = BASE64.encode(&data);
    store.put(key, serde_json::to_value(&record).unwrap()).unwrap();
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[test]
fn encrypt_decrypt_roundtrip_for_json_payloads() {
    let h = harness(SecureStorageMode::WebauthnGate);
    let payloads = [
        json!(null),
        json!("plain string"),
        json!(42),
        json!({"token": "abc", "scopes": ["a", "b"], "exp": 1_700_000_000}),
        json!([]),
    ];
    for payload in payloads {
        let record = h.storage.encrypt_for_user("u1", Slot::DeviceSecret, &payload).unwrap();
        let back: Option<Value> = h
            .storage
            .decrypt_for_user("u1", Slot::DeviceSecret, Some(&record))
            .unwrap();
        assert_eq!(back, Some(payload));
    }
}

#[test]
fn same_payload_twice_gives_distinct_envelopes() {
    let h = harness(SecureStorageMode::WebauthnGate);
    let a = h.storage.encrypt_for_user("u1", Slot::BiometricToken, "tok").unwrap();
    let b = h.storage.encrypt_for_user("u1", Slot::BiometricToken, "tok").unwrap();
    assert_ne!(a, b);
    assert_ne!(a.iv, b.iv);
}

#[test]
fn envelope_for_one_user_does_not_open_for_another() {
    let h = harness(SecureStorageMode::WebauthnGate);
    let record = h.storage.encrypt_for_user("u2", Slot::DeviceSecret, "for u2").unwrap();
    let err = h
        .storage
        .decrypt_for_user::<String>("u1", Slot::DeviceSecret, Some(&record))
        .unwrap_err();
    assert!(err.is_decryption_failure());
}

#[test]
fn absent_envelope_is_none_not_error() {
    let h = harness(SecureStorageMode::WebauthnGate);
    let none: Option<String> = h
        .storage
        .decrypt_for_user("u1", Slot::DeviceSecret, None)
        .unwrap();
    assert!(none.is_none());
}

#[test]
fn tampered_record_fails_loudly() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_device_secret("u1", "secret").unwrap();
    flip_first_data_byte(&h.store, "device_secret_u1");

    let result = h.storage.load_device_secret("u1");
    let err = result.as_ref().unwrap_err();
    assert_eq!(err.code(), "decryption_failed");
    assert_eq!(
        OperationResult::from(&result),
        OperationResult {
            ok: false,
            error: Some("decryption_failed".into())
        }
    );
}

#[test]
fn lost_wrapping_key_fails_old_records() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_biometric_token("u1", "tok").unwrap();
    h.store.delete("wrapping_key").unwrap();
    assert!(h
        .storage
        .load_biometric_token("u1")
        .unwrap_err()
        .is_decryption_failure());
}

// ---------------------------------------------------------------------------
// Stored credentials
// ---------------------------------------------------------------------------

#[test]
fn scenario_a_pin_hash_roundtrip() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_pin_hash("u1", &scenario_pin()).unwrap();
    assert_eq!(h.storage.load_pin_hash("u1").unwrap(), Some(scenario_pin()));
}

#[test]
fn each_credential_kind_has_its_own_record() {
    let h = harness(SecureStorageMode::WebauthnPrf);
    h.storage.save_biometric_token("u1", "bio").unwrap();
    h.storage.save_device_secret("u1", "dev").unwrap();
    h.storage.save_pin_hash("u1", &scenario_pin()).unwrap();

    assert_eq!(h.storage.load_biometric_token("u1").unwrap().as_deref(), Some("bio"));
    assert_eq!(h.storage.load_device_secret("u1").unwrap().as_deref(), Some("dev"));

    h.storage.delete_biometric_token("u1").unwrap();
    assert!(h.storage.load_biometric_token("u1").unwrap().is_none());
    assert_eq!(h.storage.load_device_secret("u1").unwrap().as_deref(), Some("dev"));

    h.storage.delete_device_secret("u1").unwrap();
    h.storage.delete_pin_hash("u1").unwrap();
    assert!(h.storage.load_device_secret("u1").unwrap().is_none());
    assert!(h.storage.load_pin_hash("u1").unwrap().is_none());
}

#[test]
fn stored_records_hold_no_plaintext() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_device_secret("u1", "very-secret-value").unwrap();
    for key in ["wrapping_key", "device_key_u1", "device_secret_u1"] {
        let text = h.store.get(key).unwrap().unwrap().to_string();
        assert!(!text.contains("very-secret-value"), "{key} leaked plaintext");
    }
}

#[test]
fn users_are_independent() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_device_secret("u1", "one").unwrap();
    h.storage.save_device_secret("u2", "two").unwrap();
    h.storage.clear_user_security_material("u1").unwrap();
    assert!(h.storage.load_device_secret("u1").unwrap().is_none());
    assert_eq!(h.storage.load_device_secret("u2").unwrap().as_deref(), Some("two"));
}

#[test]
fn empty_user_id_is_rejected() {
    let h = harness(SecureStorageMode::WebauthnGate);
    let err = h.storage.save_device_secret("", "x").unwrap_err();
    assert_eq!(err.code(), "invalid_user_id");
}

// ---------------------------------------------------------------------------
// Capability gate
// ---------------------------------------------------------------------------

#[test]
fn blocked_mode_refuses_saves_without_touching_store() {
    let h = harness(SecureStorageMode::Blocked);
    assert_eq!(h.storage.get_secure_storage_mode(), SecureStorageMode::Blocked);

    let result = h.storage.save_pin_hash("u1", &scenario_pin());
    assert_eq!(
        serde_json::to_value(OperationResult::from(&result)).unwrap(),
        json!({"ok": false, "error": "webauthn_not_available"})
    );
    assert!(matches!(
        h.storage.save_biometric_token("u1", "t"),
        Err(SecureStoreError::CapabilityUnavailable)
    ));
    assert!(matches!(
        h.storage.save_device_secret("u1", "s"),
        Err(SecureStoreError::CapabilityUnavailable)
    ));
    assert!(h.store.is_empty());
}

#[test]
fn blocked_mode_loads_return_none_even_with_data() {
    let store = Arc::new(MemoryStore::new());
    let open = harness_over(store.clone(), SecureStorageMode::WebauthnGate);
    open.storage.save_device_secret("u1", "s").unwrap();

    let blocked = harness_over(store, SecureStorageMode::Blocked);
    assert!(blocked.storage.load_device_secret("u1").unwrap().is_none());
    assert!(blocked.storage.load_pin_hash("u1").unwrap().is_none());
    assert!(blocked.storage.load_biometric_token("u1").unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Attempts and lockout
// ---------------------------------------------------------------------------

#[test]
fn scenario_b_tenth_failure_locks_and_erases_pin() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_pin_hash("u1", &scenario_pin()).unwrap();

    for _ in 0..9 {
        h.storage.record_pin_attempt("u1", false).unwrap();
    }
    let state = h.storage.get_pin_attempt_state("u1").unwrap();
    assert_eq!(state.count, 9);
    assert!(state.locked_until.is_none());
    assert!(h.storage.load_pin_hash("u1").unwrap().is_some());

    let tenth = h.storage.record_pin_attempt("u1", false).unwrap();
    assert!(!tenth.ok);
    assert!(tenth.pin_cleared);
    assert_eq!(tenth.locked_until, Some(START_MS + FIVE_MINUTES_MS));
    assert_eq!(
        h.storage.get_pin_attempt_state("u1").unwrap().locked_until,
        Some(START_MS + FIVE_MINUTES_MS)
    );
    assert!(h.storage.load_pin_hash("u1").unwrap().is_none());
}

#[test]
fn lockout_keeps_biometric_token_and_device_secret() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_pin_hash("u1", &scenario_pin()).unwrap();
    h.storage.save_biometric_token("u1", "bio").unwrap();
    h.storage.save_device_secret("u1", "dev").unwrap();

    h.storage.record_pin_attempt_with_limit("u1", false, 1).unwrap();

    assert!(h.storage.load_pin_hash("u1").unwrap().is_none());
    assert_eq!(h.storage.load_biometric_token("u1").unwrap().as_deref(), Some("bio"));
    assert_eq!(h.storage.load_device_secret("u1").unwrap().as_deref(), Some("dev"));
}

#[test]
fn success_resets_counter_below_threshold() {
    let h = harness(SecureStorageMode::WebauthnGate);
    for _ in 0..7 {
        h.storage.record_pin_attempt("u1", false).unwrap();
    }
    let result = h.storage.record_pin_attempt("u1", true).unwrap();
    assert!(result.ok);
    assert!(result.locked_until.is_none());
    assert_eq!(
        h.storage.get_pin_attempt_state("u1").unwrap(),
        PinAttemptState::default()
    );
}

#[test]
fn full_pin_lifecycle_through_verification() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.set_pin("u1", "2580").unwrap();

    for remaining in (1..10).rev() {
        assert_eq!(
            h.storage.verify_pin("u1", "0000").unwrap(),
            PinVerification::Mismatch {
                attempts_remaining: remaining
            }
        );
    }
    assert_eq!(
        h.storage.verify_pin("u1", "0000").unwrap(),
        PinVerification::PinCleared {
            locked_until: START_MS + FIVE_MINUTES_MS
        }
    );

    h.clock.advance(60_000);
    assert_eq!(
        h.storage.verify_pin("u1", "2580").unwrap(),
        PinVerification::LockedOut {
            remaining_ms: FIVE_MINUTES_MS - 60_000,
            locked_until: START_MS + FIVE_MINUTES_MS
        }
    );
    assert_eq!(
        h.storage.lockout_remaining_ms("u1").unwrap(),
        Some(FIVE_MINUTES_MS - 60_000)
    );

    h.clock.advance(FIVE_MINUTES_MS);
    assert_eq!(
        h.storage.verify_pin("u1", "2580").unwrap(),
        PinVerification::NoPinRegistered
    );
    assert!(!h.storage.has_pin("u1").unwrap());

    h.storage.set_pin("u1", "1357").unwrap();
    assert_eq!(
        h.storage.get_pin_attempt_state("u1").unwrap(),
        PinAttemptState::default()
    );
    assert!(h.storage.verify_pin("u1", "1357").unwrap().is_verified());
}

#[test]
fn correct_pin_during_active_lockout_is_refused_and_changes_nothing() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.set_pin("u1", "2580").unwrap();
    h.store
        .put(
            "pin_attempts_u1",
            json!({"count": 3, "lockedUntil": START_MS + 10_000}),
        )
        .unwrap();
    let stored_hash = h.store.get("pin_hash_u1").unwrap();

    assert_eq!(
        h.storage.verify_pin("u1", "2580").unwrap(),
        PinVerification::LockedOut {
            remaining_ms: 10_000,
            locked_until: START_MS + 10_000
        }
    );
    assert_eq!(
        h.storage.get_pin_attempt_state("u1").unwrap(),
        PinAttemptState {
            count: 3,
            locked_until: Some(START_MS + 10_000)
        }
    );
    assert_eq!(h.store.get("pin_hash_u1").unwrap(), stored_hash);
    assert!(h.storage.has_pin("u1").unwrap());
}

#[test]
fn scenario_a_record_cannot_be_verified_against() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_pin_hash("u1", &scenario_pin()).unwrap();
    assert_eq!(
        h.storage.verify_pin("u1", "1234").unwrap(),
        PinVerification::PinRecordInvalid
    );
    assert_eq!(
        h.storage.get_pin_attempt_state("u1").unwrap(),
        PinAttemptState::default()
    );
}

#[test]
fn correct_pin_after_failures_resets_counter() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.set_pin("u1", "2580").unwrap();
    h.storage.verify_pin("u1", "1111").unwrap();
    h.storage.verify_pin("u1", "2222").unwrap();
    assert_eq!(h.storage.get_pin_attempt_state("u1").unwrap().count, 2);
    assert!(h.storage.verify_pin("u1", "2580").unwrap().is_verified());
    assert_eq!(h.storage.get_pin_attempt_state("u1").unwrap().count, 0);
}

#[test]
fn stored_pin_hash_uses_configured_iterations() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.set_pin("u1", "2580").unwrap();
    let record = h.storage.load_pin_hash("u1").unwrap().unwrap();
    assert_eq!(record.iterations, MIN_PIN_ITERATIONS);
    assert_eq!(BASE64.decode(record.salt.as_bytes()).unwrap().len(), 16);
    assert_eq!(BASE64.decode(record.hash.as_bytes()).unwrap().len(), 32);
}

#[test]
fn invalid_pin_is_rejected() {
    let h = harness(SecureStorageMode::WebauthnGate);
    let err = h.storage.set_pin("u1", "12345").unwrap_err();
    assert_eq!(err.code(), "invalid_pin");
    assert!(!h.storage.has_pin("u1").unwrap());
}

// ---------------------------------------------------------------------------
// Cleanup and failures
// ---------------------------------------------------------------------------

#[test]
fn scenario_c_clear_removes_everything_but_device_key() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.set_pin("u1", "2580").unwrap();
    h.storage.save_biometric_token("u1", "bio").unwrap();
    h.storage.save_device_secret("u1", "dev").unwrap();
    h.storage.record_pin_attempt("u1", false).unwrap();

    h.storage.clear_user_security_material("u1").unwrap();

    assert!(h.storage.load_pin_hash("u1").unwrap().is_none());
    assert!(h.storage.load_biometric_token("u1").unwrap().is_none());
    assert!(h.storage.load_device_secret("u1").unwrap().is_none());
    assert_eq!(
        h.storage.get_pin_attempt_state("u1").unwrap(),
        PinAttemptState::default()
    );
    assert!(h.store.contains_key("device_key_u1"));
}

#[test]
fn clear_after_lost_wrapping_key_allows_new_credentials() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_device_secret("u1", "dev").unwrap();
    h.storage.save_device_secret("u2", "other").unwrap();
    h.store.delete("wrapping_key").unwrap();

    h.storage.clear_user_security_material("u1").unwrap();
    h.storage.save_device_secret("u1", "dev2").unwrap();
    assert_eq!(h.storage.load_device_secret("u1").unwrap().as_deref(), Some("dev2"));

    // u2 was not cleared and still fails closed.
    assert!(h
        .storage
        .load_device_secret("u2")
        .unwrap_err()
        .is_decryption_failure());
}

#[test]
fn clear_on_fresh_user_succeeds() {
    let h = harness(SecureStorageMode::Blocked);
    h.storage.clear_user_security_material("nobody").unwrap();
}

#[test]
fn destroy_then_save_creates_fresh_device_key() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.storage.save_device_secret("u1", "dev").unwrap();
    let old_key = h.store.get("device_key_u1").unwrap().unwrap();

    h.storage.destroy_user_vault("u1").unwrap();
    assert!(!h.store.contains_key("device_key_u1"));

    h.storage.save_device_secret("u1", "dev2").unwrap();
    assert_ne!(h.store.get("device_key_u1").unwrap().unwrap(), old_key);
    assert_eq!(h.storage.load_device_secret("u1").unwrap().as_deref(), Some("dev2"));
}

#[test]
fn unavailable_store_surfaces_as_storage_error() {
    let h = harness(SecureStorageMode::WebauthnGate);
    h.store.set_available(false);
    let result = h.storage.save_device_secret("u1", "dev");
    assert_eq!(
        OperationResult::from(&result).error.as_deref(),
        Some("storage_unavailable")
    );
    assert!(matches!(
        h.storage.get_pin_attempt_state("u1"),
        Err(SecureStoreError::StorageUnavailable(_))
    ));
}
