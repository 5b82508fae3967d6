//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access and
//! exposes the `local_storage` key/value table with get/set/remove semantics.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use vedas_core::error::VedasError;

use crate::migrations;

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL and runs all pending migrations.
    pub fn new(path: &Path) -> Result<Self, VedasError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| VedasError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| VedasError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, VedasError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| VedasError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, VedasError>
    where
        F: FnOnce(&Connection) -> Result<T, VedasError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| VedasError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Read the value stored under `key`.
    pub fn get_item(&self, key: &str) -> Result<Option<String>, VedasError> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM local_storage WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| VedasError::Storage(format!("Failed to read {}: {}", key, e)))
        })
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn set_item(&self, key: &str, value: &str) -> Result<(), VedasError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO local_storage (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                rusqlite::params![key, value, Utc::now().timestamp()],
            )
            .map_err(|e| VedasError::Storage(format!("Failed to write {}: {}", key, e)))?;
            Ok(())
        })
    }

    /// Remove `key`. Returns whether it existed.
    pub fn remove_item(&self, key: &str) -> Result<bool, VedasError> {
        self.with_conn(|conn| {
            let removed = conn
                .execute(
                    "DELETE FROM local_storage WHERE key = ?1",
                    rusqlite::params![key],
                )
                .map_err(|e| VedasError::Storage(format!("Failed to remove {}: {}", key, e)))?;
            Ok(removed > 0)
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
