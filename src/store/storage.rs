//! Cache store trait with SQLite and in-memory implementations.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::keys::RequestKey;

/// The payload stored for one request key.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedBody {
  pub body: Vec<u8>,
  pub content_type: Option<String>,
  pub status: u16,
}

impl CachedBody {
  /// A 200 JSON body, the shape used for chapter content and the
  /// pending queue.
  pub fn json(value: &serde_json::Value) -> Result<Self> {
    let body = serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize body: {}", e))?;
    Ok(Self {
      body,
      content_type: Some("application/json".to_string()),
      status: 200,
    })
  }
}

/// A cached body together with when it was stored.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  pub body: CachedBody,
  pub cached_at: DateTime<Utc>,
}

/// Trait for durable cache partitions.
///
/// Entries are keyed by (partition name, request key). Writes
/// overwrite; there is no per-entry expiry, only whole-partition purge
/// on version change.
pub trait CacheStore: Send + Sync {
  /// Store or overwrite an entry.
  fn put(&self, partition: &str, key: &RequestKey, body: &CachedBody) -> Result<()>;

  /// Look up an entry by exact key.
  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<StoredEntry>>;

  /// Remove one entry. Returns whether it existed.
  fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool>;

  /// Names of all partitions that currently hold entries.
  fn partitions(&self) -> Result<Vec<String>>;

  /// Delete every entry in a partition. Returns how many were removed.
  fn drop_partition(&self, partition: &str) -> Result<usize>;

  /// Number of entries in a partition.
  fn entry_count(&self, partition: &str) -> Result<usize>;
}

/// SQLite-backed store used outside of tests.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  /// Open the store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<std::path::PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("readsync").join("cache.db"))
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for the cache table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    partition TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    request_path TEXT NOT NULL,
    body BLOB NOT NULL,
    content_type TEXT,
    status INTEGER NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (partition, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_partition
    ON cache_entries(partition);
"#;

impl CacheStore for SqliteStore {
  fn put(&self, partition: &str, key: &RequestKey, body: &CachedBody) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO cache_entries (partition, key_hash, request_path, body, content_type, status, cached_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![partition, key.hash(), key.path(), body.body, body.content_type, body.status],
      )
      .map_err(|e| eyre!("Failed to store entry {}: {}", key.path(), e))?;

    Ok(())
  }

  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<StoredEntry>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT body, content_type, status, cached_at FROM cache_entries
         WHERE partition = ? AND key_hash = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(Vec<u8>, Option<String>, u16, String)> = stmt
      .query_row(params![partition, key.hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to query entry {}: {}", key.path(), e))?;

    match row {
      Some((body, content_type, status, cached_at_str)) => Ok(Some(StoredEntry {
        body: CachedBody {
          body,
          content_type,
          status,
        },
        cached_at: parse_datetime(&cached_at_str)?,
      })),
      None => Ok(None),
    }
  }

  fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let deleted = conn
      .execute(
        "DELETE FROM cache_entries WHERE partition = ? AND key_hash = ?",
        params![partition, key.hash()],
      )
      .map_err(|e| eyre!("Failed to delete entry {}: {}", key.path(), e))?;

    Ok(deleted > 0)
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT DISTINCT partition FROM cache_entries ORDER BY partition")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn drop_partition(&self, partition: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let deleted = conn
      .execute(
        "DELETE FROM cache_entries WHERE partition = ?",
        params![partition],
      )
      .map_err(|e| eyre!("Failed to drop partition {}: {}", partition, e))?;

    Ok(deleted)
  }

  fn entry_count(&self, partition: &str) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM cache_entries WHERE partition = ?",
        params![partition],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count partition {}: {}", partition, e))?;

    Ok(count as usize)
  }
}

/// In-memory store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<(String, String), StoredEntry>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryStore {
  fn put(&self, partition: &str, key: &RequestKey, body: &CachedBody) -> Result<()> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    entries.insert(
      (partition.to_string(), key.hash().to_string()),
      StoredEntry {
        body: body.clone(),
        cached_at: Utc::now(),
      },
    );
    Ok(())
  }

  fn get(&self, partition: &str, key: &RequestKey) -> Result<Option<StoredEntry>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      entries
        .get(&(partition.to_string(), key.hash().to_string()))
        .cloned(),
    )
  }

  fn delete(&self, partition: &str, key: &RequestKey) -> Result<bool> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      entries
        .remove(&(partition.to_string(), key.hash().to_string()))
        .is_some(),
    )
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let mut names: Vec<String> = entries.keys().map(|(p, _)| p.clone()).collect();
    names.sort();
    names.dedup();
    Ok(names)
  }

  fn drop_partition(&self, partition: &str) -> Result<usize> {
    let mut entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = entries.len();
    entries.retain(|(p, _), _| p != partition);
    Ok(before - entries.len())
  }

  fn entry_count(&self, partition: &str) -> Result<usize> {
    let entries = self
      .entries
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(entries.keys().filter(|(p, _)| p == partition).count())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::keys::RequestKey;

  fn entry(bytes: &[u8]) -> CachedBody {
    CachedBody {
      body: bytes.to_vec(),
      content_type: Some("text/html".to_string()),
      status: 200,
    }
  }

  fn stores() -> Vec<Box<dyn CacheStore>> {
    vec![
      Box::new(MemoryStore::new()),
      Box::new(SqliteStore::open_in_memory().unwrap()),
    ]
  }

  #[test]
  fn test_put_get_roundtrip() {
    for store in stores() {
      let key = RequestKey::from_path("/index.html");
      store.put("static-v1", &key, &entry(b"<html>shell</html>")).unwrap();

      let stored = store.get("static-v1", &key).unwrap().unwrap();
      assert_eq!(stored.body.body, b"<html>shell</html>");
      assert_eq!(stored.body.content_type.as_deref(), Some("text/html"));
      assert_eq!(stored.body.status, 200);
    }
  }

  #[test]
  fn test_overwrite_last_write_wins() {
    for store in stores() {
      let key = RequestKey::from_path("/chapter/1");
      store.put("offline-v1", &key, &entry(b"first")).unwrap();
      store.put("offline-v1", &key, &entry(b"second")).unwrap();

      let stored = store.get("offline-v1", &key).unwrap().unwrap();
      assert_eq!(stored.body.body, b"second");
      assert_eq!(store.entry_count("offline-v1").unwrap(), 1);
    }
  }

  #[test]
  fn test_get_respects_partition() {
    for store in stores() {
      let key = RequestKey::from_path("/index.html");
      store.put("static-v1", &key, &entry(b"x")).unwrap();
      assert!(store.get("offline-v1", &key).unwrap().is_none());
    }
  }

  #[test]
  fn test_delete_reports_existence() {
    for store in stores() {
      let key = RequestKey::from_path("/pending-activities");
      store.put("offline-v1", &key, &entry(b"[]")).unwrap();

      assert!(store.delete("offline-v1", &key).unwrap());
      assert!(!store.delete("offline-v1", &key).unwrap());
      assert!(store.get("offline-v1", &key).unwrap().is_none());
    }
  }

  #[test]
  fn test_partitions_and_drop() {
    for store in stores() {
      store
        .put("static-v1", &RequestKey::from_path("/a"), &entry(b"a"))
        .unwrap();
      store
        .put("static-v2", &RequestKey::from_path("/a"), &entry(b"a"))
        .unwrap();
      store
        .put("offline-v2", &RequestKey::from_path("/b"), &entry(b"b"))
        .unwrap();

      assert_eq!(
        store.partitions().unwrap(),
        vec!["offline-v2", "static-v1", "static-v2"]
      );

      assert_eq!(store.drop_partition("static-v1").unwrap(), 1);
      assert_eq!(store.partitions().unwrap(), vec!["offline-v2", "static-v2"]);
    }
  }
}
