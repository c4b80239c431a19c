// src/db/models/append.rs

//! BbAppend model - path-keyed append files

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// An append file within a layer branch
#[derive(Debug, Clone)]
pub struct BbAppend {
    pub id: Option<i64>,
    pub layerbranch_id: i64,
    /// Directory of the append file, relative to the layer root
    pub filepath: String,
    pub filename: String,
}

impl BbAppend {
    /// Create a new BbAppend
    pub fn new(layerbranch_id: i64, filepath: String, filename: String) -> Self {
        Self {
            id: None,
            layerbranch_id,
            filepath,
            filename,
        }
    }

    /// Layer-relative path of the append file
    pub fn full_path(&self) -> String {
        if self.filepath.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.filepath, self.filename)
        }
    }

    /// Insert this append into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO appends (layerbranch_id, filepath, filename) VALUES (?1, ?2, ?3)",
            params![&self.layerbranch_id, &self.filepath, &self.filename],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find an append by its layer-relative path
    pub fn find_by_path(
        conn: &Connection,
        layerbranch_id: i64,
        filepath: &str,
        filename: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layerbranch_id, filepath, filename FROM appends
             WHERE layerbranch_id = ?1 AND filepath = ?2 AND filename = ?3",
        )?;

        let append = stmt
            .query_row(params![layerbranch_id, filepath, filename], Self::from_row)
            .optional()?;

        Ok(append)
    }

    /// List all appends for a layer branch
    pub fn list_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layerbranch_id, filepath, filename FROM appends
             WHERE layerbranch_id = ?1 ORDER BY filepath, filename",
        )?;

        let appends = stmt
            .query_map([layerbranch_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(appends)
    }

    /// Update this append's path fields
    pub fn update(&self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::InitError("Cannot update append without ID".to_string())
        })?;

        conn.execute(
            "UPDATE appends SET filepath = ?1, filename = ?2 WHERE id = ?3",
            params![&self.filepath, &self.filename, id],
        )?;
        Ok(())
    }

    /// Delete an append by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM appends WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Delete all appends for a layer branch
    pub fn delete_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<usize> {
        let count = conn.execute(
            "DELETE FROM appends WHERE layerbranch_id = ?1",
            [layerbranch_id],
        )?;
        Ok(count)
    }

    /// Convert a database row to a BbAppend
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            layerbranch_id: row.get(1)?,
            filepath: row.get(2)?,
            filename: row.get(3)?,
        })
    }
}
