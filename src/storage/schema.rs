//! Response cache schema
//!
//! The cache database holds one row per detail-page URL. There is no expiry:
//! school pages change rarely and a stale row is refreshed by `rescrape`.

/// SQL schema for the cache database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS responses (
    url TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    fetched_at TEXT NOT NULL
);
"#;

/// Initializes the cache schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
