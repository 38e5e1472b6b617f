//! AES-256-GCM sealing for credential envelopes and wrapped keys.
//!
//! Every call to [`encrypt`] draws a fresh 96-bit nonce from `OsRng`; a nonce
//! is never derived or reused. [`SealedData`] keeps nonce, ciphertext and tag
//! apart, and converts to the WebCrypto layout (`iv` + `ciphertext || tag`)
//! used by persisted envelopes.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// AES-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;

// ---------------------------------------------------------------------------
// SealedData
// ---------------------------------------------------------------------------

/// Output of one AES-256-GCM seal.
#[must_use = "sealed data must be persisted or it is lost"]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedData {
    /// Random nonce, unique per seal.
    pub nonce: [u8; NONCE_LEN],
    /// Encrypted bytes, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// Authentication tag.
    pub tag: [u8; TAG_LEN],
}

impl SealedData {
    /// `ciphertext || tag`, the `data` half of a WebCrypto-style envelope.
    #[must_use]
    pub fn combined(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ciphertext.len().saturating_add(TAG_LEN));
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Rebuild from a nonce and a `ciphertext || tag` buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the nonce is not 12 bytes or
    /// `combined` is shorter than a tag.
    pub fn from_combined(nonce: &[u8], combined: &[u8]) -> Result<Self, CryptoError> {
        let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
            CryptoError::Encryption(format!(
                "invalid nonce length: {} bytes (expected {NONCE_LEN})",
                nonce.len()
            ))
        })?;

        let Some(split) = combined.len().checked_sub(TAG_LEN) else {
            return Err(CryptoError::Encryption(format!(
                "sealed payload too short: {} bytes (minimum {TAG_LEN})",
                combined.len()
            )));
        };
        let (ciphertext, tag_bytes) = combined.split_at(split);

        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(tag_bytes);

        Ok(Self {
            nonce,
            ciphertext: ciphertext.to_vec(),
            tag,
        })
    }
}

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

fn aead_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::Encryption(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

/// Seal `plaintext` under a 32-byte key, authenticating `aad`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] for a key of the wrong length or a
/// failure inside `ring`.
pub fn encrypt(plaintext: &[u8], key: &[u8], aad: &[u8]) -> Result<SealedData, CryptoError> {
    let key = aead_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    let Ok(tag) = key.seal_in_place_separate_tag(nonce, aead::Aad::from(aad), &mut in_out) else {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    };

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(tag.as_ref());

    Ok(SealedData {
        nonce: nonce_bytes,
        ciphertext: in_out,
        tag: tag_bytes,
    })
}

/// Open [`SealedData`] under a 32-byte key; `aad` must match the seal.
///
/// # Errors
///
/// - [`CryptoError::Encryption`] for a key of the wrong length.
/// - [`CryptoError::Decryption`] when the tag does not verify (tampering,
///   wrong key, or mismatched AAD).
pub fn decrypt(sealed: &SealedData, key: &[u8], aad: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let key = aead_key(key)?;
    let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);

    let mut ct_tag = sealed.combined();
    let opened = key
        .open_in_place(nonce, aead::Aad::from(aad), &mut ct_tag)
        .map_err(|_| CryptoError::Decryption);

    let result = opened.and_then(|plaintext| SecretBuffer::new(plaintext));
    ct_tag.zeroize();
    result
}
