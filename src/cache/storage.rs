//! SQLite implementation of [`CacheStorage`].

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::Mutex;

use super::request::Response;
use super::traits::{CacheStorage, PartitionUsage};
use crate::db::Database;

/// SQLite-based cache partition storage.
pub struct SqliteCacheStorage {
  conn: Mutex<Connection>,
}

impl SqliteCacheStorage {
  pub fn new(db: Database) -> Self {
    Self {
      conn: Mutex::new(db.into_connection()),
    }
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn partition_id(conn: &Connection, partition: &str) -> Result<Option<i64>> {
  conn
    .query_row(
      "SELECT id FROM cache_partitions WHERE name = ?",
      params![partition],
      |row| row.get(0),
    )
    .optional()
    .map_err(|e| eyre!("Failed to look up partition {}: {}", partition, e))
}

fn ensure_partition(conn: &Connection, partition: &str) -> Result<i64> {
  conn
    .execute(
      "INSERT OR IGNORE INTO cache_partitions (name) VALUES (?)",
      params![partition],
    )
    .map_err(|e| eyre!("Failed to open partition {}: {}", partition, e))?;

  partition_id(conn, partition)?.ok_or_else(|| eyre!("Partition {} vanished after open", partition))
}

fn decode_response(
  status: u16,
  status_text: String,
  headers: String,
  body: Vec<u8>,
) -> Result<Response> {
  let headers: BTreeMap<String, String> =
    serde_json::from_str(&headers).map_err(|e| eyre!("Failed to decode cached headers: {}", e))?;
  Ok(Response {
    status,
    status_text,
    headers,
    body,
  })
}

type ResponseRow = (u16, String, String, Vec<u8>);

impl CacheStorage for SqliteCacheStorage {
  fn open(&self, partition: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_partition(&conn, partition)?;
    Ok(())
  }

  fn partitions(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_partitions ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list partitions: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read partition name: {}", e))?;

    Ok(names)
  }

  fn delete_partition(&self, partition: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let Some(id) = partition_id(&tx, partition)? else {
      return Ok(false);
    };

    tx.execute(
      "DELETE FROM cache_entries WHERE partition_id = ?",
      params![id],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", partition, e))?;
    tx.execute("DELETE FROM cache_partitions WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to delete partition {}: {}", partition, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(true)
  }

  fn get(&self, partition: &str, key: &str) -> Result<Option<Response>> {
    let conn = self.lock()?;
    let row: Option<ResponseRow> = conn
      .query_row(
        "SELECT e.status, e.status_text, e.headers, e.body
         FROM cache_entries e
         INNER JOIN cache_partitions p ON p.id = e.partition_id
         WHERE p.name = ? AND e.request_key = ?",
        params![partition, key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {} in {}: {}", key, partition, e))?;

    row
      .map(|(status, text, headers, body)| decode_response(status, text, headers, body))
      .transpose()
  }

  fn match_any(&self, key: &str) -> Result<Option<Response>> {
    let conn = self.lock()?;
    let row: Option<ResponseRow> = conn
      .query_row(
        "SELECT e.status, e.status_text, e.headers, e.body
         FROM cache_entries e
         INNER JOIN cache_partitions p ON p.id = e.partition_id
         WHERE e.request_key = ?
         ORDER BY p.id
         LIMIT 1",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {}: {}", key, e))?;

    row
      .map(|(status, text, headers, body)| decode_response(status, text, headers, body))
      .transpose()
  }

  fn put(&self, partition: &str, key: &str, response: &Response) -> Result<()> {
    let mut conn = self.lock()?;
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    let id = ensure_partition(&tx, partition)?;

    // Replace rather than update so the key moves to the end of the order
    tx.execute(
      "DELETE FROM cache_entries WHERE partition_id = ? AND request_key = ?",
      params![id, key],
    )
    .map_err(|e| eyre!("Failed to replace {}: {}", key, e))?;
    tx.execute(
      "INSERT INTO cache_entries (partition_id, request_key, status, status_text, headers, body)
       VALUES (?, ?, ?, ?, ?, ?)",
      params![
        id,
        key,
        response.status,
        response.status_text,
        headers,
        response.body
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn keys(&self, partition: &str) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT e.request_key FROM cache_entries e
         INNER JOIN cache_partitions p ON p.id = e.partition_id
         WHERE p.name = ?
         ORDER BY e.seq",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map(params![partition], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list keys of {}: {}", partition, e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read key: {}", e))?;

    Ok(keys)
  }

  fn delete(&self, partition: &str, key: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute(
        "DELETE FROM cache_entries
         WHERE request_key = ?
           AND partition_id = (SELECT id FROM cache_partitions WHERE name = ?)",
        params![key, partition],
      )
      .map_err(|e| eyre!("Failed to delete {} from {}: {}", key, partition, e))?;

    Ok(removed > 0)
  }

  fn usage(&self, partition: &str) -> Result<PartitionUsage> {
    let conn = self.lock()?;
    let (entries, bytes): (i64, i64) = conn
      .query_row(
        "SELECT COUNT(e.seq), COALESCE(SUM(LENGTH(e.body)), 0)
         FROM cache_entries e
         INNER JOIN cache_partitions p ON p.id = e.partition_id
         WHERE p.name = ?",
        params![partition],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .map_err(|e| eyre!("Failed to measure {}: {}", partition, e))?;

    Ok(PartitionUsage {
      entries: entries.max(0) as usize,
      bytes: bytes.max(0) as u64,
    })
  }

  fn active_version(&self, scope: &str) -> Result<Option<String>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT active_version FROM worker_registration WHERE scope = ?",
        params![scope],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read registration for {}: {}", scope, e))
  }

  fn set_active_version(&self, scope: &str, version: &str) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO worker_registration (scope, active_version, activated_at)
         VALUES (?, ?, datetime('now'))",
        params![scope, version],
      )
      .map_err(|e| eyre!("Failed to record registration for {}: {}", scope, e))?;
    Ok(())
  }
}
