//! SQL schema for the cache partitions, worker registration and local storage.

pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Named, versioned cache partitions (creation order = id order)
CREATE TABLE IF NOT EXISTS cache_partitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored responses; seq preserves insertion order for FIFO eviction
CREATE TABLE IF NOT EXISTS cache_entries (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    partition_id INTEGER NOT NULL,
    request_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (partition_id, request_key),
    FOREIGN KEY (partition_id) REFERENCES cache_partitions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_partition
    ON cache_entries(partition_id, seq);

-- The version currently in control of a scope
CREATE TABLE IF NOT EXISTS worker_registration (
    scope TEXT PRIMARY KEY,
    active_version TEXT NOT NULL,
    activated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Key/value durable storage with a per-key change counter
CREATE TABLE IF NOT EXISTS local_storage (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 1
);
"#;
