//! PBKDF2-HMAC-SHA256 hashing for 4-digit PINs.
//!
//! A PIN has roughly 13 bits of entropy, so the hash alone cannot protect it;
//! the iteration count only slows offline guessing. The real guard is the
//! attempt lockout in the secure store, which erases the hash after too many
//! failures.
//!
//! Salts and hashes travel as standard padded base64 strings, and the
//! iteration count is stored next to them so a record stays verifiable after
//! [`DEFAULT_PIN_ITERATIONS`] changes.

use data_encoding::BASE64;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Iteration count for newly created PIN hashes.
pub const DEFAULT_PIN_ITERATIONS: u32 = 160_000;

/// Lowest iteration count [`hash_pin`] accepts.
pub const MIN_PIN_ITERATIONS: u32 = 100_000;

/// Salt length produced by [`generate_pin_salt`].
pub const PIN_SALT_LEN: usize = 16;

/// Derived hash length (256 bits).
pub const PIN_HASH_LEN: usize = 32;

/// Generate a random salt, base64 encoded.
///
/// # Errors
///
/// Returns [`CryptoError::SecureMemory`] if the CSPRNG fails.
pub fn generate_pin_salt() -> Result<String, CryptoError> {
    let mut salt = [0u8; PIN_SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
    Ok(BASE64.encode(&salt))
}

/// Derive the base64 hash of `pin` for the given salt and iteration count.
///
/// Deterministic: equal inputs always produce the same string, which is what
/// verification compares against.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if `iterations` is below
/// [`MIN_PIN_ITERATIONS`], or the salt is not base64 or decodes to fewer than
/// [`PIN_SALT_LEN`] bytes.
pub fn hash_pin(pin: &str, salt: &str, iterations: u32) -> Result<String, CryptoError> {
    if iterations < MIN_PIN_ITERATIONS {
        return Err(CryptoError::KeyDerivation(format!(
            "iteration count too low: {iterations} (minimum {MIN_PIN_ITERATIONS})"
        )));
    }

    let salt_bytes = BASE64
        .decode(salt.as_bytes())
        .map_err(|e| CryptoError::KeyDerivation(format!("salt is not base64: {e}")))?;
    if salt_bytes.len() < PIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {PIN_SALT_LEN})",
            salt_bytes.len()
        )));
    }

    let mut out = Zeroizing::new([0u8; PIN_HASH_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(pin.as_bytes(), &salt_bytes, iterations, out.as_mut());
    Ok(BASE64.encode(out.as_ref()))
}

/// Recompute the hash of `pin` and compare it with `expected` in constant time.
///
/// # Errors
///
/// Propagates [`hash_pin`] errors for an unusable salt or iteration count.
pub fn verify_pin_hash(
    pin: &str,
    salt: &str,
    iterations: u32,
    expected: &str,
) -> Result<bool, CryptoError> {
    let computed = Zeroizing::new(hash_pin(pin, salt, iterations)?);
    Ok(constant_time_eq(computed.as_bytes(), expected.as_bytes()))
}

/// Length-checked, non-short-circuiting byte comparison.
///
/// The hash length is public, so returning early on a length mismatch leaks
/// nothing about the hash value.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
