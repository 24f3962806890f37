//! SQLite-backed persistent metadata store.
//!
//! One logical table maps NFC-normalized absolute path to the serialized
//! metadata record plus its modification-time/size fingerprint. The store
//! survives process restarts; entries are derived data, so last-write-wins
//! on concurrent writers is acceptable.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::entry::CacheEntry;
use crate::files::Fingerprint;
use crate::metadata::{ExtractionMode, MetadataRecord};

/// Errors from the persistent cache tier.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// Underlying SQLite failure.
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored record could not be (de)serialized.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

const SCHEMA_VERSION: i32 = 1;

/// Persistent metadata cache over a single SQLite database file.
///
/// The connection is guarded by a mutex: rusqlite connections are not
/// `Sync`, and writer serialization is the policy anyway.
pub struct MetadataDb {
    conn: Mutex<Connection>,
}

impl MetadataDb {
    /// Open or create the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            // Ignore failure here; the open below will report it usefully
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (tests, `--no-cache` fallback paths).
    pub fn open_in_memory() -> CacheResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CacheResult<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (
                path         TEXT PRIMARY KEY,
                fields       TEXT NOT NULL,
                mode         TEXT NOT NULL,
                mtime_ns     INTEGER NOT NULL,
                size         INTEGER NOT NULL,
                extracted_at TEXT NOT NULL
            );",
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetch the stored entry for a normalized path, if any.
    ///
    /// This returns whatever is stored; fingerprint validity is the
    /// caller's check (the two-tier facade does it).
    pub fn get(&self, path_key: &str) -> CacheResult<Option<CacheEntry>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT fields, mode, mtime_ns, size, extracted_at
                 FROM metadata WHERE path = ?1",
                params![path_key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((fields_json, mode_json, mtime_ns, size, extracted_at)) = row else {
            return Ok(None);
        };

        let fields = serde_json::from_str(&fields_json)?;
        let mode: ExtractionMode = serde_json::from_str(&mode_json)?;
        let extracted_at = extracted_at
            .parse()
            .unwrap_or_else(|_| chrono::Utc::now());

        let mut record = MetadataRecord::new(fields, mode);
        record.extracted_at = extracted_at;

        Ok(Some(CacheEntry::new(
            path_key.to_string(),
            record,
            Fingerprint {
                mtime_ns,
                size: size as u64,
            },
        )))
    }

    /// Insert or replace the entry for its path.
    pub fn put(&self, entry: &CacheEntry) -> CacheResult<()> {
        let fields_json = serde_json::to_string(
            &entry.record.iter().collect::<std::collections::BTreeMap<_, _>>(),
        )?;
        let mode_json = serde_json::to_string(&entry.record.mode)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO metadata
                 (path, fields, mode, mtime_ns, size, extracted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.path,
                fields_json,
                mode_json,
                entry.fingerprint.mtime_ns,
                entry.fingerprint.size as i64,
                entry.record.extracted_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Remove the entry for a path. Removing a missing path is not an error.
    pub fn invalidate(&self, path_key: &str) -> CacheResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM metadata WHERE path = ?1", params![path_key])?;
        Ok(())
    }

    /// Drop every entry.
    pub fn clear(&self) -> CacheResult<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute("DELETE FROM metadata", [])?;
        Ok(n)
    }

    /// Number of stored entries.
    pub fn len(&self) -> CacheResult<usize> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }
}
