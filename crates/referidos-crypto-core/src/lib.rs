//! `referidos-crypto-core`: primitives behind the Referidos secure credential store.
//!
//! No I/O and no persistence: AES-256-GCM sealing, the symmetric key handle
//! with its JWK export and wrapping helpers, PBKDF2 PIN hashing, and the
//! zeroizing containers that hold key material in between.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod symmetric;

pub mod keys;

pub mod pin;

pub use error::CryptoError;
pub use keys::{unwrap_key, wrap_key, ExportedKey, SymmetricKey};
pub use memory::{SecretBuffer, SecretBytes};
pub use pin::{
    generate_pin_salt, hash_pin, verify_pin_hash, DEFAULT_PIN_ITERATIONS, MIN_PIN_ITERATIONS,
};
pub use symmetric::{decrypt, encrypt, SealedData};
