//! # Durable Key-Value Storage
//!
//! Each logical store (routes, reminders) owns one key and writes its whole
//! collection as a single JSON string on every mutation. Backends only need to
//! get, set and remove strings.
//!
//! - [`MemoryStorage`]: shared in-memory map (tests, ephemeral sessions)
//! - [`FileStorage`]: one `<key>.json` file per key in a directory, unsafe
//!   key bytes percent-encoded
//! - [`SqliteStorage`]: a single SQLite table (`persistence` feature)

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;

use crate::{Result, TrackerError};

/// Synchronous string key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Missing keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one. Durable on return.
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

fn lock_err<T>(_: T) -> TrackerError {
    TrackerError::Storage {
        message: "storage lock poisoned".to_string(),
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.entries.lock().map_err(lock_err)
    }
}

impl KeyValueStore for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries()?.remove(key);
        Ok(())
    }
}

// ============================================================================
// Files
// ============================================================================

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!("[Storage] File storage at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `[A-Za-z0-9_-]` pass through; every other byte becomes `%XX`, so
    /// distinct keys never share a file.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut file = String::with_capacity(key.len());
        for b in key.bytes() {
            if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
                file.push(b as char);
            } else {
                file.push_str(&format!("%{:02X}", b));
            }
        }
        self.dir.join(format!("{}.json", file))
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path_for(key)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// SQLite
// ============================================================================

#[cfg(feature = "persistence")]
pub use sqlite::SqliteStorage;

#[cfg(feature = "persistence")]
mod sqlite {
    use std::sync::{Mutex, MutexGuard};

    use rusqlite::{params, Connection, OptionalExtension};

    use super::{lock_err, KeyValueStore};
    use crate::Result;

    /// Key-value storage in a single SQLite table.
    pub struct SqliteStorage {
        db: Mutex<Connection>,
    }

    impl SqliteStorage {
        /// Open (or create) the database at `db_path`.
        pub fn new(db_path: &str) -> Result<Self> {
            let db = Connection::open(db_path)?;
            Self::init_schema(&db)?;
            log::info!("[Storage] SQLite storage at {}", db_path);
            Ok(Self { db: Mutex::new(db) })
        }

        /// Create an in-memory database (for testing).
        pub fn in_memory() -> Result<Self> {
            Self::new(":memory:")
        }

        fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS kv_store (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                "#,
            )
        }

        fn db(&self) -> Result<MutexGuard<'_, Connection>> {
            self.db.lock().map_err(lock_err)
        }
    }

    impl KeyValueStore for SqliteStorage {
        fn get(&self, key: &str) -> Result<Option<String>> {
            let value = self
                .db()?
                .query_row(
                    "SELECT value FROM kv_store WHERE key = ?",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.db()?.execute(
                "INSERT OR REPLACE INTO kv_store (key, value) VALUES (?, ?)",
                params![key, value],
            )?;
            Ok(())
        }

        fn remove(&self, key: &str) -> Result<()> {
            self.db()?
                .execute("DELETE FROM kv_store WHERE key = ?", params![key])?;
            Ok(())
        }
    }

}

// ============================================================================
// Test support
// ============================================================================

/// Memory-backed store whose writes can be switched to fail, for exercising
/// write-failure paths.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct FailingStorage {
    inner: MemoryStorage,
    failing: Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(test)]
impl FailingStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every later `set`/`remove` returns [`TrackerError::Storage`].
    pub(crate) fn fail_writes(&self) {
        self.failing
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(TrackerError::Storage {
                message: "disk full".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
impl KeyValueStore for FailingStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check()?;
        self.inner.remove(key)
    }
}
