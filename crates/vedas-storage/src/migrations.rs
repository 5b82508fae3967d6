//! Database schema migrations.
//!
//! Applies the schema for the `local_storage` key/value table and tracks
//! applied versions in `schema_migrations`.

use rusqlite::Connection;
use tracing::info;

use vedas_core::error::VedasError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), VedasError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| VedasError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| VedasError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: local_storage");
    }

    Ok(())
}

/// Version 1: key/value table holding serialized session lists.
fn apply_v1(conn: &Connection) -> Result<(), VedasError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS local_storage (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'local_storage');
        ",
    )
    .map_err(|e| VedasError::Storage(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}
