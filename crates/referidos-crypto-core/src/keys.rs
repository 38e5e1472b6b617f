//! Symmetric key handles, JWK export, and key wrapping.
//!
//! The secure store keeps a two-tier hierarchy:
//!
//! ```text
//! Wrapping Key (one per install) ──► wraps ──► Device Key (one per user)
//! Device Key                     ──► seals ──► PIN hash / biometric token / device secret
//! ```
//!
//! Keys leave memory only as an [`ExportedKey`] (JWK `oct` form). A device key
//! is wrapped by sealing its JWK JSON under the wrapping key with an AAD tag
//! naming its slot, so a wrapped key moved to another slot fails to unwrap.

use std::fmt;

use data_encoding::BASE64URL_NOPAD;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;
use crate::memory::SecretBytes;
use crate::symmetric::{self, SealedData, KEY_LEN};

/// JWK key type for raw symmetric keys.
pub const JWK_KTY: &str = "oct";

/// JWK algorithm identifier for AES-256-GCM.
pub const JWK_ALG: &str = "A256GCM";

// ---------------------------------------------------------------------------
// SymmetricKey
// ---------------------------------------------------------------------------

/// A 256-bit AES-GCM key, zeroized on drop.
pub struct SymmetricKey {
    bytes: SecretBytes<KEY_LEN>,
}

impl SymmetricKey {
    /// Generate a fresh random key.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::SecureMemory`] if the CSPRNG fails.
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self {
            bytes: SecretBytes::random()?,
        })
    }

    /// Wrap existing key bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            bytes: SecretBytes::new(bytes),
        }
    }

    /// Borrow the raw key bytes for a cipher call.
    #[must_use]
    pub const fn expose(&self) -> &[u8; KEY_LEN] {
        self.bytes.expose()
    }

    /// Export to the transportable JWK form.
    #[must_use]
    pub fn export(&self) -> ExportedKey {
        ExportedKey {
            kty: JWK_KTY.into(),
            alg: JWK_ALG.into(),
            k: BASE64URL_NOPAD.encode(self.expose()),
            ext: true,
            key_ops: vec!["encrypt".into(), "decrypt".into()],
        }
    }

    /// Import a JWK produced by [`export`](Self::export).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if the key type or
    /// algorithm is not `oct`/`A256GCM`, or `k` does not decode to 32 bytes.
    pub fn import(jwk: &ExportedKey) -> Result<Self, CryptoError> {
        if jwk.kty != JWK_KTY {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "unsupported key type: {}",
                jwk.kty
            )));
        }
        if jwk.alg != JWK_ALG {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "unsupported algorithm: {}",
                jwk.alg
            )));
        }

        let mut raw = BASE64URL_NOPAD
            .decode(jwk.k.as_bytes())
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("bad key encoding: {e}")))?;
        if raw.len() != KEY_LEN {
            let len = raw.len();
            raw.zeroize();
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "invalid key length: {len} bytes (expected {KEY_LEN})"
            )));
        }

        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&raw);
        raw.zeroize();
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    }

    /// Seal `plaintext` under this key with a fresh nonce.
    ///
    /// # Errors
    ///
    /// Propagates [`symmetric::encrypt`] failures.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<SealedData, CryptoError> {
        symmetric::encrypt(plaintext, self.expose(), aad)
    }

    /// Open data sealed by [`seal`](Self::seal).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decryption`] on any authentication failure.
    pub fn open(
        &self,
        sealed: &SealedData,
        aad: &[u8],
    ) -> Result<crate::memory::SecretBuffer, CryptoError> {
        symmetric::decrypt(sealed, self.expose(), aad)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(***)")
    }
}

// ---------------------------------------------------------------------------
// ExportedKey
// ---------------------------------------------------------------------------

/// JWK-shaped export of a [`SymmetricKey`].
///
/// Only `k` is secret; it is wiped when the export is dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ExportedKey {
    /// Always `"oct"`.
    #[zeroize(skip)]
    pub kty: String,
    /// Always `"A256GCM"`.
    #[zeroize(skip)]
    pub alg: String,
    /// Key bytes, base64url without padding.
    pub k: String,
    /// Extractable flag, kept for WebCrypto compatibility.
    #[zeroize(skip)]
    #[serde(default)]
    pub ext: bool,
    /// Permitted operations.
    #[zeroize(skip)]
    #[serde(default)]
    pub key_ops: Vec<String>,
}

impl fmt::Debug for ExportedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportedKey")
            .field("kty", &self.kty)
            .field("alg", &self.alg)
            .field("k", &"***")
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Wrapping
// ---------------------------------------------------------------------------

/// Seal the JWK export of `key` under `wrapping_key`.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if serialization or sealing fails.
pub fn wrap_key(
    key: &SymmetricKey,
    wrapping_key: &SymmetricKey,
    aad: &[u8],
) -> Result<SealedData, CryptoError> {
    let export = key.export();
    let json = Zeroizing::new(
        serde_json::to_vec(&export)
            .map_err(|e| CryptoError::Encryption(format!("key export failed: {e}")))?,
    );
    wrapping_key.seal(&json, aad)
}

/// Recover a key wrapped by [`wrap_key`].
///
/// # Errors
///
/// - [`CryptoError::Decryption`] if the wrapping key or AAD is wrong or the
///   data was modified.
/// - [`CryptoError::InvalidKeyMaterial`] if the plaintext is not a valid JWK.
pub fn unwrap_key(
    sealed: &SealedData,
    wrapping_key: &SymmetricKey,
    aad: &[u8],
) -> Result<SymmetricKey, CryptoError> {
    let plaintext = wrapping_key.open(sealed, aad)?;
    let export: ExportedKey = serde_json::from_slice(plaintext.expose())
        .map_err(|e| CryptoError::InvalidKeyMaterial(format!("wrapped key is not a JWK: {e}")))?;
    SymmetricKey::import(&export)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_import_roundtrip() {
        let key = SymmetricKey::generate().unwrap();
        let jwk = key.export();
        assert_eq!(jwk.kty, "oct");
        assert_eq!(jwk.alg, "A256GCM");
        assert_eq!(jwk.k.len(), 43);

        let imported = SymmetricKey::import(&jwk).unwrap();
        assert_eq!(imported.expose(), key.expose());
    }

    #[test]
    fn export_serializes_as_jwk() {
        let key = SymmetricKey::from_bytes([0u8; KEY_LEN]);
        let json = serde_json::to_value(key.export()).unwrap();
        assert_eq!(json["kty"], "oct");
        assert_eq!(json["k"], "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA");
        assert_eq!(json["key_ops"][0], "encrypt");
    }

    #[test]
    fn import_rejects_wrong_algorithm() {
        let mut jwk = SymmetricKey::generate().unwrap().export();
        jwk.alg = "A128GCM".into();
        assert!(matches!(
            SymmetricKey::import(&jwk),
            Err(CryptoError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn import_rejects_short_key() {
        let mut jwk = SymmetricKey::generate().unwrap().export();
        jwk.k = BASE64URL_NOPAD.encode(&[1u8; 16]);
        let err = SymmetricKey::import(&jwk).unwrap_err();
        assert!(err.to_string().contains("invalid key length"));
    }

    #[test]
    fn import_rejects_bad_encoding() {
        let mut jwk = SymmetricKey::generate().unwrap().export();
        jwk.k = "!!not base64!!".into();
        assert!(SymmetricKey::import(&jwk).is_err());
    }

    #[test]
    fn wrap_unwrap_roundtrip() {
        let wrapping = SymmetricKey::generate().unwrap();
        let device = SymmetricKey::generate().unwrap();
        let sealed = wrap_key(&device, &wrapping, b"referidos:device_key:u1").unwrap();
        let unwrapped = unwrap_key(&sealed, &wrapping, b"referidos:device_key:u1").unwrap();
        assert_eq!(unwrapped.expose(), device.expose());
    }

    #[test]
    fn unwrap_with_other_wrapping_key_fails() {
        let wrapping = SymmetricKey::generate().unwrap();
        let other = SymmetricKey::generate().unwrap();
        let device = SymmetricKey::generate().unwrap();
        let sealed = wrap_key(&device, &wrapping, b"slot").unwrap();
        assert!(matches!(
            unwrap_key(&sealed, &other, b"slot"),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn unwrap_into_other_slot_fails() {
        let wrapping = SymmetricKey::generate().unwrap();
        let device = SymmetricKey::generate().unwrap();
        let sealed = wrap_key(&device, &wrapping, b"referidos:device_key:u1").unwrap();
        assert!(matches!(
            unwrap_key(&sealed, &wrapping, b"referidos:device_key:u2"),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let key = SymmetricKey::from_bytes([0xAB; KEY_LEN]);
        let jwk = key.export();
        assert_eq!(format!("{key:?}"), "SymmetricKey(***)");
        let debug = format!("{jwk:?}");
        assert!(!debug.contains(&jwk.k));
        assert!(debug.contains("A256GCM"));
    }
}
