//! SQLite-backed record storage.
//!
//! One row per user holding the same JSON document the file store writes,
//! so records move between backends unchanged.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{decode, encode, TaskStore};
use crate::error::StoreError;
use crate::record::UserRecord;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open the database at `path`, creating the schema if needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                user_id    TEXT PRIMARY KEY,
                body       TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".into()))
    }
}

impl TaskStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn read(&self, user: &str) -> Result<UserRecord, StoreError> {
        let body: Option<String> = self
            .conn()?
            .query_row(
                "SELECT body FROM records WHERE user_id = ?1",
                params![user],
                |row| row.get(0),
            )
            .optional()?;
        match body {
            Some(json) => decode(&json),
            None => Err(StoreError::NotFound(user.to_string())),
        }
    }

    fn write(&self, user: &str, record: &UserRecord) -> Result<(), StoreError> {
        let body = encode(record)?;
        self.conn()?.execute(
            "INSERT INTO records (user_id, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![user, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
