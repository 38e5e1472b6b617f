//! Platform capability gate for secure saves.
//!
//! ```text
//! PlatformAuthenticator (trait)
//! ├── StaticAuthenticator  (fixed answers, host-provided or tests)
//! └── NullAuthenticator    (always blocked, fallback)
//! ```
//!
//! The gate has three values: "no secure storage at all" and
//! "secure storage without a key-derivation extension" are different states
//! for callers deciding what to offer the user.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Host query for user-verifying authenticator support.
pub trait PlatformAuthenticator: Send + Sync {
    /// Whether a platform authenticator (fingerprint, face, device PIN) exists.
    fn is_platform_authenticator_available(&self) -> bool;

    /// Whether the authenticator offers a key-derivation (PRF) extension.
    fn supports_key_derivation_extension(&self) -> bool;
}

/// What the platform allows the secure store to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecureStorageMode {
    /// No platform authenticator: secure saves refuse, loads return nothing.
    Blocked,
    /// Authenticator present without a key-derivation extension.
    WebauthnGate,
    /// Authenticator present with key-derivation support.
    WebauthnPrf,
}

impl SecureStorageMode {
    /// Derive the mode from a platform query.
    #[must_use]
    pub fn detect(platform: &dyn PlatformAuthenticator) -> Self {
        if !platform.is_platform_authenticator_available() {
            return Self::Blocked;
        }
        if platform.supports_key_derivation_extension() {
            Self::WebauthnPrf
        } else {
            Self::WebauthnGate
        }
    }

    /// Wire name, e.g. `"webauthn_gate"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::WebauthnGate => "webauthn_gate",
            Self::WebauthnPrf => "webauthn_prf",
        }
    }

    /// Returns `true` unless the mode is [`Blocked`](Self::Blocked).
    #[must_use]
    pub const fn allows_secure_storage(&self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

impl fmt::Display for SecureStorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticator with answers fixed at construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StaticAuthenticator {
    /// Answer for [`PlatformAuthenticator::is_platform_authenticator_available`].
    pub authenticator_available: bool,
    /// Answer for [`PlatformAuthenticator::supports_key_derivation_extension`].
    pub key_derivation_extension: bool,
}

impl StaticAuthenticator {
    /// Build the authenticator that reports `mode`.
    #[must_use]
    pub const fn for_mode(mode: SecureStorageMode) -> Self {
        match mode {
            SecureStorageMode::Blocked => Self {
                authenticator_available: false,
                key_derivation_extension: false,
            },
            SecureStorageMode::WebauthnGate => Self {
                authenticator_available: true,
                key_derivation_extension: false,
            },
            SecureStorageMode::WebauthnPrf => Self {
                authenticator_available: true,
                key_derivation_extension: true,
            },
        }
    }
}

impl PlatformAuthenticator for StaticAuthenticator {
    fn is_platform_authenticator_available(&self) -> bool {
        self.authenticator_available
    }

    fn supports_key_derivation_extension(&self) -> bool {
        self.authenticator_available && self.key_derivation_extension
    }
}

/// Fallback when the host cannot answer: always [`SecureStorageMode::Blocked`].
#[derive(Clone, Copy, Debug, Default)]
pub struct NullAuthenticator;

impl PlatformAuthenticator for NullAuthenticator {
    fn is_platform_authenticator_available(&self) -> bool {
        false
    }

    fn supports_key_derivation_extension(&self) -> bool {
        false
    }
}
