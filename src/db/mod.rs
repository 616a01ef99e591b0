// src/db/mod.rs

//! SQLite database access
//!
//! All persistent state lives in one SQLite database. This module owns
//! opening and initializing it; the schema itself is defined in
//! [`schema`] and the row models in [`models`].

pub mod models;
pub mod schema;

use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::error::Result;

/// Initialize a database at the given path
///
/// Creates parent directories as needed and brings the schema up to date.
pub fn init(path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    open(path)?;
    Ok(())
}

/// Open a database, configure pragmas, and apply pending migrations
pub fn open(path: &str) -> Result<Connection> {
    debug!("opening database at {}", path);
    let conn = Connection::open(path)?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (tests and ephemeral use)
pub fn open_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/path/provenv.db");
        let path = path.to_str().unwrap();

        init(path).unwrap();
        assert!(Path::new(path).exists());
    }

    #[test]
    fn test_open_sets_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provenv.db");
        let conn = open(path.to_str().unwrap()).unwrap();

        let foreign_keys: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(foreign_keys, 1);

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_open_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("provenv.db");

        open(path.to_str().unwrap()).unwrap();
        let conn = open(path.to_str().unwrap()).unwrap();
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(result, 1);
    }
}
