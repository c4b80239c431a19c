// src/db/mod.rs

//! Database access layer for strata
//!
//! Connection management, schema migrations, and a small transaction
//! helper. All state lives in a single SQLite database.

pub mod models;
pub mod paths;
pub mod schema;

use crate::error::Result;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Initialize a new database (or migrate an existing one) at the given path
pub fn init(db_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(db_path).parent() {
        fs::create_dir_all(parent)?;
    }

    let conn = open(db_path)?;
    schema::migrate(&conn)?;
    Ok(())
}

/// Open a connection to an existing database
pub fn open(db_path: &str) -> Result<Connection> {
    debug!("Opening database at {}", db_path);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    Ok(conn)
}

/// Run a closure inside a database transaction
///
/// The transaction commits if the closure returns Ok and rolls back if it
/// returns an error or panics.
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&rusqlite::Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let result = f(&tx)?;
    tx.commit()?;
    Ok(result)
}
