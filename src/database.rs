//! SQLite connection scoping and schema bootstrap.
//!
//! [`Database`] only remembers where the database lives. Each store operation
//! calls [`Database::connect`], does its work (inside a transaction when it
//! writes) and drops the connection again, so no engine handle outlives a call.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use tracing::debug;

use crate::error::Result;

/// DDL for the four tables; must match [`crate::schema`].
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY NOT NULL,
    font_family TEXT NOT NULL,
    font_size INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS api_keys (
    id INTEGER PRIMARY KEY NOT NULL,
    encrypted_key TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chat_sessions (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS chats (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    session_id TEXT NOT NULL REFERENCES chat_sessions (id),
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    model TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS chats_session_id ON chats (session_id);
"#;

/// Per-connection settings. Foreign keys are off by default in SQLite.
const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;";

/// Handle to the SQLite file shared by the vault, preference and session stores.
#[derive(Debug, Clone)]
pub struct Database {
    url: String,
}

impl Database {
    /// Open (creating if needed) the database at `url` and make sure all tables exist.
    pub fn open(url: impl Into<String>) -> Result<Self> {
        let database = Self { url: url.into() };
        let mut conn = database.connect()?;
        conn.batch_execute(SCHEMA_SQL)?;
        debug!("Schema ready at {}", database.url);
        Ok(database)
    }

    /// Location of the database file.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Establish a fresh connection with foreign keys enforced.
    pub fn connect(&self) -> Result<SqliteConnection> {
        let mut conn = SqliteConnection::establish(&self.url)?;
        conn.batch_execute(CONNECTION_PRAGMAS)?;
        Ok(conn)
    }
}

/// Throwaway database inside a temp dir, kept alive by the returned guard.
#[cfg(test)]
pub(crate) fn test_database() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("mdchat-test.db");
    let database = Database::open(path.to_string_lossy().to_string()).expect("open database");
    (dir, database)
}
