//! Byte-oriented key-value storage.
//!
//! Capacity and eviction are not this layer's concern; [`ResultCache`] and
//! [`HistoryLog`] decide what stays.
//!
//! [`ResultCache`]: crate::ResultCache
//! [`HistoryLog`]: crate::HistoryLog

use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, lost on exit
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// SQLite-backed store in a single `kv` table
pub struct SqliteKvStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl SqliteKvStore {
    /// Open (or create) `study.db` under `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let db_path = data_dir.join("study.db");

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        Self::init_schema(&conn)?;
        tracing::debug!(path = %db_path.display(), "opened study store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    /// Platform data directory for the study database
    pub fn default_data_dir() -> PathBuf {
        directories::ProjectDirs::from("org.local", "Bible Study", "BibleStudy")
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./data"))
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store() {
        let store = MemoryKvStore::new();
        assert!(store.get("language").unwrap().is_none());
        store.set("language", b"es").unwrap();
        assert_eq!(store.get("language").unwrap().as_deref(), Some(&b"es"[..]));
        store.remove("language").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_sqlite_store_persists() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = SqliteKvStore::open(temp_dir.path()).unwrap();
            store.set("study_cache", b"[]").unwrap();
            store.set("study_cache", b"[1]").unwrap();
        }

        let store = SqliteKvStore::open(temp_dir.path()).unwrap();
        assert_eq!(store.get("study_cache").unwrap(), Some(b"[1]".to_vec()));
        store.remove("study_cache").unwrap();
        assert!(store.get("study_cache").unwrap().is_none());
        assert!(store.db_path().ends_with("study.db"));
    }
}
