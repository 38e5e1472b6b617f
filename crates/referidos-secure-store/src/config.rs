//! Secure store settings, kept as plain JSON next to the database.
//!
//! Nothing here is secret. A missing or unreadable file yields the defaults,
//! so a damaged config never locks a user out of their stored credentials.

use std::fs;
use std::path::Path;

use referidos_crypto_core::{DEFAULT_PIN_ITERATIONS, MIN_PIN_ITERATIONS};
use serde::{Deserialize, Serialize};

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE: &str = "secure_store.json";

/// Most failed PIN verifications a config may allow before lockout.
pub const MAX_PIN_ATTEMPTS: u32 = 10;

/// Shortest lockout a config may set, in milliseconds.
pub const MIN_LOCKOUT_DURATION_MS: u64 = 60_000;

/// Tunable policy for the secure store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecureStoreConfig {
    /// Failed PIN verifications before lockout and PIN erasure.
    #[serde(default = "default_max_pin_attempts")]
    pub max_pin_attempts: u32,

    /// Lockout length once the threshold is reached, in milliseconds.
    #[serde(default = "default_lockout_duration_ms")]
    pub lockout_duration_ms: u64,

    /// PBKDF2 iterations for newly set PINs.
    #[serde(default = "default_pin_iterations")]
    pub pin_iterations: u32,

    /// `SQLite` file name inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

impl Default for SecureStoreConfig {
    fn default() -> Self {
        Self {
            max_pin_attempts: default_max_pin_attempts(),
            lockout_duration_ms: default_lockout_duration_ms(),
            pin_iterations: default_pin_iterations(),
            database_file: default_database_file(),
        }
    }
}

const fn default_max_pin_attempts() -> u32 {
    10
}
const fn default_lockout_duration_ms() -> u64 {
    300_000
}
const fn default_pin_iterations() -> u32 {
    DEFAULT_PIN_ITERATIONS
}
fn default_database_file() -> String {
    "secure_store.db".into()
}

impl SecureStoreConfig {
    /// Load from `{data_dir}/secure_store.json`, falling back to defaults.
    #[must_use]
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(CONFIG_FILE);
        fs::read_to_string(&path)
            .map_or_else(
                |_| Self::default(),
                |contents| serde_json::from_str(&contents).unwrap_or_default(),
            )
            .validated()
    }

    /// Persist atomically (write `.tmp`, then rename), owner-only on Unix.
    ///
    /// # Errors
    ///
    /// Returns an `io::Error` if the directory is missing or the write or
    /// rename fails.
    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        let path = data_dir.join(CONFIG_FILE);
        let tmp = data_dir.join(".secure_store.json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp, &json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp, &path)
    }

    /// Clamp values that would weaken or disable the policy.
    ///
    /// - between 1 and [`MAX_PIN_ATTEMPTS`] attempts before lockout;
    /// - a lockout of at least [`MIN_LOCKOUT_DURATION_MS`];
    /// - PBKDF2 iterations never below the crypto-core floor;
    /// - an empty database file name falls back to the default.
    #[must_use]
    pub fn validated(mut self) -> Self {
        self.max_pin_attempts = self.max_pin_attempts.clamp(1, MAX_PIN_ATTEMPTS);
        self.lockout_duration_ms = self.lockout_duration_ms.max(MIN_LOCKOUT_DURATION_MS);
        self.pin_iterations = self.pin_iterations.max(MIN_PIN_ITERATIONS);
        if self.database_file.trim().is_empty() {
            self.database_file = default_database_file();
        }
        self
    }
}
