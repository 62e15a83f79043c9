//! Best-effort persistence of queue snapshots.
//!
//! Values are opaque JSON strings stored under `(base_key, key)`; a SQLite
//! backend with pooled connections and an in-memory backend are provided.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, params};

/// Namespace under which queue snapshots are stored.
pub const QUEUE_STATE_NAMESPACE: &str = "player_queue_state";

/// Key/value contract used for crash-recovery snapshots.
pub trait SnapshotStore: Send + Sync {
    /// Read a value, `None` when absent.
    fn get(&self, base_key: &str, key: &str) -> Result<Option<String>>;
    /// Insert or overwrite a value.
    fn set(&self, base_key: &str, key: &str, value: &str) -> Result<()>;
    /// Delete every value under `base_key`.
    fn delete(&self, base_key: &str) -> Result<()>;
}

/// Base key of a queue's snapshot entries.
pub fn queue_base_key(queue_id: &str) -> String {
    format!("{QUEUE_STATE_NAMESPACE}/{queue_id}")
}

#[derive(Clone)]
pub struct SqliteSnapshotStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteSnapshotStore {
    /// Open (or create) a snapshot database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create snapshot dir {:?}", parent))?;
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .context("create snapshot db pool")?;
        Self::with_pool(pool)
    }

    /// Private in-memory database (single pooled connection).
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .context("create snapshot db pool")?;
        Self::with_pool(pool)
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>) -> Result<Self> {
        {
            let conn = pool.get().context("open snapshot db")?;
            init_schema(&conn)?;
        }
        Ok(Self { pool })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            base_key TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at_ms INTEGER NOT NULL,
            PRIMARY KEY (base_key, key)
        );
        "#,
    )
    .context("create snapshot schema")?;
    Ok(())
}

fn now_ms() -> i64 {
    (queue_hub_types::unix_now() * 1000.0) as i64
}

impl SnapshotStore for SqliteSnapshotStore {
    fn get(&self, base_key: &str, key: &str) -> Result<Option<String>> {
        let conn = self.pool.get().context("open snapshot db")?;
        conn.query_row(
            "SELECT value FROM snapshots WHERE base_key = ?1 AND key = ?2",
            params![base_key, key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("read snapshot {base_key}/{key}"))
    }

    fn set(&self, base_key: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.pool.get().context("open snapshot db")?;
        conn.execute(
            r#"
            INSERT INTO snapshots (base_key, key, value, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(base_key, key) DO UPDATE SET
                value = excluded.value,
                updated_at_ms = excluded.updated_at_ms
            "#,
            params![base_key, key, value, now_ms()],
        )
        .with_context(|| format!("write snapshot {base_key}/{key}"))?;
        Ok(())
    }

    fn delete(&self, base_key: &str) -> Result<()> {
        let conn = self.pool.get().context("open snapshot db")?;
        conn.execute("DELETE FROM snapshots WHERE base_key = ?1", params![base_key])
            .with_context(|| format!("delete snapshot {base_key}"))?;
        Ok(())
    }
}

/// Mutex-guarded map backend.
#[derive(Default)]
pub struct MemorySnapshotStore {
    values: Mutex<HashMap<(String, String), String>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn get(&self, base_key: &str, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        Ok(values
            .get(&(base_key.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&self, base_key: &str, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        values.insert((base_key.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn delete(&self, base_key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        values.retain(|(base, _), _| base != base_key);
        Ok(())
    }
}
