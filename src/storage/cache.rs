//! SQLite-backed response cache
//!
//! Maps a detail-page URL to the raw body last fetched for it.

use crate::storage::schema::initialize_schema;
use crate::StorageError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// URL -> body cache kept across runs
pub struct ResponseCache {
    conn: Connection,
}

impl ResponseCache {
    /// Opens or creates the cache database at `path`
    pub fn new(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory cache (for testing)
    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Returns the cached body for `url`, if any
    pub fn get(&self, url: &str) -> Result<Option<String>, StorageError> {
        let body = self
            .conn
            .query_row(
                "SELECT body FROM responses WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    /// Stores (or replaces) the body for `url`
    pub fn put(&self, url: &str, body: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO responses (url, body, fetched_at) VALUES (?1, ?2, ?3)",
            params![url, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Number of cached responses
    pub fn len(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM responses", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
