//! Durable key/value storage shared by every tab.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::db::Database;

static NEXT_TAB_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the writer of a storage change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(u64);

impl TabId {
  pub fn new() -> Self {
    Self(NEXT_TAB_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl Default for TabId {
  fn default() -> Self {
    Self::new()
  }
}

/// A value changed. Delivered to every subscriber, including the writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
  pub key: String,
  pub old_value: Option<String>,
  pub new_value: Option<String>,
  pub source: TabId,
}

pub trait LocalStorage: Send + Sync {
  fn get_item(&self, key: &str) -> Result<Option<String>>;

  fn set_item(&self, key: &str, value: &str, source: TabId) -> Result<()>;

  /// Change counter for a key; 0 when it was never written.
  fn revision(&self, key: &str) -> Result<u64>;

  fn subscribe(&self) -> broadcast::Receiver<StorageEvent>;
}

/// SQLite-backed local storage.
///
/// Handles opened on the same database file see each other's writes through
/// [`LocalStorage::revision`]; change events only reach subscribers of the
/// same handle.
pub struct SqliteLocalStorage {
  conn: Mutex<Connection>,
  events: broadcast::Sender<StorageEvent>,
}

impl SqliteLocalStorage {
  pub fn new(db: Database) -> Self {
    let (events, _) = broadcast::channel(64);
    Self {
      conn: Mutex::new(db.into_connection()),
      events,
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl LocalStorage for SqliteLocalStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT value FROM local_storage WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key, e))
  }

  fn set_item(&self, key: &str, value: &str, source: TabId) -> Result<()> {
    let old_value = {
      let mut conn = self.lock()?;
      let tx = conn
        .transaction()
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

      let old_value: Option<String> = tx
        .query_row(
          "SELECT value FROM local_storage WHERE key = ?",
          params![key],
          |row| row.get(0),
        )
        .optional()
        .map_err(|e| eyre!("Failed to read {}: {}", key, e))?;

      tx.execute(
        "INSERT INTO local_storage (key, value, revision) VALUES (?1, ?2, 1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, revision = revision + 1",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write {}: {}", key, e))?;

      tx.commit()
        .map_err(|e| eyre!("Failed to commit {}: {}", key, e))?;
      old_value
    };

    // Nobody listening is not an error
    let _ = self.events.send(StorageEvent {
      key: key.to_string(),
      old_value,
      new_value: Some(value.to_string()),
      source,
    });

    Ok(())
  }

  fn revision(&self, key: &str) -> Result<u64> {
    let conn = self.lock()?;
    let revision: Option<i64> = conn
      .query_row(
        "SELECT revision FROM local_storage WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read revision of {}: {}", key, e))?;

    Ok(revision.unwrap_or(0).max(0) as u64)
  }

  fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
    self.events.subscribe()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn storage() -> SqliteLocalStorage {
    SqliteLocalStorage::new(Database::open_in_memory().unwrap())
  }

  #[test]
  fn test_set_and_get() {
    let storage = storage();
    assert_eq!(storage.get_item("k").unwrap(), None);
    assert_eq!(storage.revision("k").unwrap(), 0);

    storage.set_item("k", "one", TabId::new()).unwrap();
    storage.set_item("k", "two", TabId::new()).unwrap();
    assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("two"));
    assert_eq!(storage.revision("k").unwrap(), 2);
  }

  #[test]
  fn test_events_carry_old_and_new_values() {
    let storage = storage();
    let mut events = storage.subscribe();
    let tab = TabId::new();

    storage.set_item("k", "one", tab).unwrap();
    storage.set_item("k", "two", tab).unwrap();

    let first = events.try_recv().unwrap();
    assert_eq!(first.old_value, None);
    assert_eq!(first.source, tab);

    let second = events.try_recv().unwrap();
    assert_eq!(second.old_value.as_deref(), Some("one"));
    assert_eq!(second.new_value.as_deref(), Some("two"));
  }

  #[test]
  fn test_handles_on_one_file_share_revisions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("qretro.db");
    let a = SqliteLocalStorage::new(Database::open(Some(&path)).unwrap());
    let b = SqliteLocalStorage::new(Database::open(Some(&path)).unwrap());

    a.set_item("k", "v", TabId::new()).unwrap();
    assert_eq!(b.revision("k").unwrap(), 1);
    assert_eq!(b.get_item("k").unwrap().as_deref(), Some("v"));
  }

  #[test]
  fn test_tab_ids_are_unique() {
    assert_ne!(TabId::new(), TabId::new());
  }
}
