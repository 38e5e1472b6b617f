//! SQLite-backed [`KeyValueStore`].
//!
//! One table, `kv_store(key TEXT PRIMARY KEY, value TEXT NOT NULL)`, holding
//! the JSON text of each record. The file itself is not encrypted: every
//! sensitive record is already sealed before it reaches this layer, and the
//! wrapping key anchoring the hierarchy is device-bound by living here.
//!
//! WAL mode plus a busy timeout lets several processes share one file; the
//! compare-and-set needed by key creation is `INSERT OR IGNORE` followed by a
//! read of whatever row won.

use std::fmt;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::SecureStoreError;
use crate::store::KeyValueStore;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);";

/// How long a writer waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the on-disk record store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SqliteStore(***)")
    }
}

impl SqliteStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`SecureStoreError::StorageUnavailable`] if the file cannot be
    /// opened or the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, SecureStoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn)
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`SecureStoreError::StorageUnavailable`] if `SQLite` fails to
    /// initialize.
    pub fn open_in_memory() -> Result<Self, SecureStoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SecureStoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored records.
    ///
    /// # Errors
    ///
    /// Returns [`SecureStoreError::StorageUnavailable`] if the query fails.
    pub fn count(&self) -> Result<u64, SecureStoreError> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM kv_store", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or_default())
    }
}

fn select(conn: &Connection, key: &str) -> Result<Option<Value>, SecureStoreError> {
    let text: Option<String> = conn
        .query_row(
            "SELECT value FROM kv_store WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    text.map(|t| {
        serde_json::from_str(&t)
            .map_err(|e| SecureStoreError::StorageCorrupted(format!("{key}: {e}")))
    })
    .transpose()
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, SecureStoreError> {
        select(&self.conn(), key)
    }

    fn put(&self, key: &str, record: Value) -> Result<(), SecureStoreError> {
        let text = serde_json::to_string(&record)?;
        self.conn().execute(
            "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, text],
        )?;
        Ok(())
    }

    fn put_if_absent(&self, key: &str, record: Value) -> Result<Value, SecureStoreError> {
        let text = serde_json::to_string(&record)?;
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO kv_store (key, value) VALUES (?1, ?2)",
            params![key, text],
        )?;
        if inserted == 1 {
            return Ok(record);
        }
        select(&conn, key)?.ok_or_else(|| {
            SecureStoreError::StorageUnavailable(format!("{key} vanished during create"))
        })
    }

    fn delete(&self, key: &str) -> Result<(), SecureStoreError> {
        self.conn()
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }
}
