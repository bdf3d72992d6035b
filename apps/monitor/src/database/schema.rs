use chrono::Utc;
use libsql::{Connection, params};
use tracing::{debug, info};

use crate::error::StorageError;

/// Schema version, recorded once per database file
const SCHEMA_VERSION: i64 = 1;

/// Create the history schema if it does not exist yet.
///
/// Safe to call any number of times; later calls change nothing.
pub async fn ensure_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS checks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            endpoint TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('up', 'down')),
            response_time_ms REAL,
            status_code INTEGER,
            checked_at TEXT NOT NULL
        )",
        (),
    )
    .await?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_checks_endpoint_id ON checks (endpoint, id)",
        (),
    )
    .await?;

    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?, ?)",
            params![SCHEMA_VERSION, Utc::now().to_rfc3339()],
        )
        .await?;

    if inserted > 0 {
        info!("Initialized history schema (version {})", SCHEMA_VERSION);
    } else {
        debug!("History schema already present (version {})", SCHEMA_VERSION);
    }

    Ok(())
}
