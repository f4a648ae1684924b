//! SQLite-backed content store
//!
//! One shared [`SqliteStore`] bootstraps the schema and hands each worker
//! thread its own [`SqliteWriter`] connection. Writers take the write lock
//! up front with `BEGIN IMMEDIATE` so lock acquisition order is uniform
//! across threads, and retry busy errors with jittered exponential backoff
//! before giving up.

use rand::Rng;
use rusqlite::{params, Connection, ErrorCode, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::storage::{ContentSink, ContentWriter, StorageError, StorageResult};
use crate::ContentRecord;

/// Maximum write attempts before a busy error becomes fatal
const MAX_BUSY_RETRIES: u32 = 5;

/// Base delay for busy backoff (doubled per attempt, plus jitter)
const BUSY_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Busy handler timeout applied to every connection
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS content (
    content_type TEXT NOT NULL,
    content_id   TEXT NOT NULL,
    name         TEXT NOT NULL DEFAULT '',
    folder_id    TEXT,
    updated_at   TEXT,
    payload      TEXT NOT NULL,
    saved_at     TEXT NOT NULL,
    PRIMARY KEY (content_type, content_id)
);
CREATE INDEX IF NOT EXISTS idx_content_folder ON content (content_type, folder_id);
";

/// Shared handle to a SQLite database file.
///
/// Opening the store bootstraps the schema; workers then get their own
/// connections via [`ContentSink::open_writer`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the
    /// schema exists.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
            }
        }

        let store = Self { path };
        let conn = store.open_connection()?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        debug!("Opened content store at {}", store.path.display());
        Ok(store)
    }

    /// Path to the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_connection(&self) -> StorageResult<Connection> {
        let conn =
            Connection::open(&self.path).map_err(|e| StorageError::Database(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(conn)
    }

    /// Count stored items per content type.
    pub fn count_by_type(&self) -> StorageResult<std::collections::BTreeMap<String, u64>> {
        let conn = self.open_connection()?;
        let mut stmt = conn
            .prepare("SELECT content_type, COUNT(*) FROM content GROUP BY content_type")
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut counts = std::collections::BTreeMap::new();
        for row in rows {
            let (content_type, count) = row.map_err(|e| StorageError::Database(e.to_string()))?;
            counts.insert(content_type, count);
        }
        Ok(counts)
    }

    /// List stored item ids and names for one content type, newest first.
    pub fn list_content(
        &self,
        content_type: &str,
        limit: u64,
    ) -> StorageResult<Vec<(String, String)>> {
        let conn = self.open_connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT content_id, name FROM content \
                 WHERE content_type = ?1 ORDER BY saved_at DESC LIMIT ?2",
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![content_type, limit], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row.map_err(|e| StorageError::Database(e.to_string()))?);
        }
        Ok(items)
    }
}

impl ContentSink for SqliteStore {
    fn open_writer(&self) -> StorageResult<Box<dyn ContentWriter>> {
        let conn = self.open_connection()?;
        Ok(Box::new(SqliteWriter { conn }))
    }
}

/// Per-worker writer owning a single connection.
pub struct SqliteWriter {
    conn: Connection,
}

impl SqliteWriter {
    fn try_save(&mut self, record: &ContentRecord) -> rusqlite::Result<()> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO content \
                 (content_type, content_id, name, folder_id, updated_at, payload, saved_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT (content_type, content_id) DO UPDATE SET \
                 name = excluded.name, \
                 folder_id = excluded.folder_id, \
                 updated_at = excluded.updated_at, \
                 payload = excluded.payload, \
                 saved_at = excluded.saved_at",
            params![
                record.content_type.to_string(),
                record.id,
                record.name,
                record.folder_id,
                record.updated_at.map(|dt| dt.to_rfc3339()),
                record.payload.to_string(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()
    }
}

impl ContentWriter for SqliteWriter {
    fn save_content(&mut self, record: &ContentRecord) -> StorageResult<()> {
        record
            .validate()
            .map_err(StorageError::InvalidRecord)?;

        let mut last_message = String::new();
        for attempt in 0..MAX_BUSY_RETRIES {
            match self.try_save(record) {
                Ok(()) => return Ok(()),
                Err(e) if is_busy(&e) => {
                    last_message = e.to_string();
                    let backoff = busy_backoff(attempt);
                    warn!(
                        "Database busy saving {} {} (attempt {}/{}), retrying in {:?}",
                        record.content_type, record.id, attempt + 1, MAX_BUSY_RETRIES, backoff
                    );
                    std::thread::sleep(backoff);
                }
                Err(e) => return Err(StorageError::Database(e.to_string())),
            }
        }

        Err(StorageError::Busy {
            attempts: MAX_BUSY_RETRIES,
            message: last_message,
        })
    }
}

/// Whether a rusqlite error is a lock-contention error worth retrying.
fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

/// Exponential backoff with random jitter to de-synchronize writers.
fn busy_backoff(attempt: u32) -> Duration {
    let base = BUSY_BACKOFF_BASE * 2u32.saturating_pow(attempt);
    let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
    base + Duration::from_millis(jitter)
}
