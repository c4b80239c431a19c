// src/db/models/inc_file.rs

//! IncFile model - include files tracked as dependency targets

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// An include file within a layer branch
#[derive(Debug, Clone)]
pub struct IncFile {
    pub id: Option<i64>,
    pub layerbranch_id: i64,
    /// Layer-relative path of the include file
    pub path: String,
}

impl IncFile {
    /// Create a new IncFile
    pub fn new(layerbranch_id: i64, path: String) -> Self {
        Self {
            id: None,
            layerbranch_id,
            path,
        }
    }

    /// Insert this include file into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO incfiles (layerbranch_id, path) VALUES (?1, ?2)",
            params![&self.layerbranch_id, &self.path],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find an include file by its layer-relative path
    pub fn find_by_path(
        conn: &Connection,
        layerbranch_id: i64,
        path: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layerbranch_id, path FROM incfiles
             WHERE layerbranch_id = ?1 AND path = ?2",
        )?;

        let inc = stmt
            .query_row(params![layerbranch_id, path], Self::from_row)
            .optional()?;

        Ok(inc)
    }

    /// List all include files for a layer branch
    pub fn list_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layerbranch_id, path FROM incfiles
             WHERE layerbranch_id = ?1 ORDER BY path",
        )?;

        let incs = stmt
            .query_map([layerbranch_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(incs)
    }

    /// Update this include file's path
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::InitError("Cannot update include file without ID".to_string())
        })?;

        conn.execute(
            "UPDATE incfiles SET path = ?1 WHERE id = ?2",
            params![&self.path, id],
        )?;
        Ok(())
    }

    /// Delete an include file by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM incfiles WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Delete all include files for a layer branch
    pub fn delete_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<usize> {
        let count = conn.execute(
            "DELETE FROM incfiles WHERE layerbranch_id = ?1",
            [layerbranch_id],
        )?;
        Ok(count)
    }

    /// Convert a database row to an IncFile
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            layerbranch_id: row.get(1)?,
            path: row.get(2)?,
        })
    }
}
