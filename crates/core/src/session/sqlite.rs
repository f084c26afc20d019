//! SQLite-backed session store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{SessionStore, SessionStoreError};

/// SQLite-backed key-value session store.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) the store at `path`.
    pub fn new(path: &Path) -> Result<Self, SessionStoreError> {
        let conn = Connection::open(path).map_err(|e| SessionStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, SessionStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| SessionStoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SessionStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS session_kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| SessionStoreError::Database(e.to_string()))
    }
}

impl SessionStore for SqliteSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>, SessionStoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SessionStoreError::Database(e.to_string()))?;
        conn.query_row(
            "SELECT value FROM session_kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| SessionStoreError::Database(e.to_string()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SessionStoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SessionStoreError::Database(e.to_string()))?;
        conn.execute(
            r#"
            INSERT INTO session_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, value, Utc::now().to_rfc3339()],
        )
        .map_err(|e| SessionStoreError::Database(e.to_string()))?;
        Ok(())
    }
}
