// src/db/models/bbclass.rs

//! BbClass model - name-keyed build classes

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A build class within a layer branch
#[derive(Debug, Clone)]
pub struct BbClass {
    pub id: Option<i64>,
    pub layerbranch_id: i64,
    pub name: String,
}

impl BbClass {
    /// Create a new BbClass
    pub fn new(layerbranch_id: i64, name: String) -> Self {
        Self {
            id: None,
            layerbranch_id,
            name,
        }
    }

    /// Insert this class into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO classes (layerbranch_id, name) VALUES (?1, ?2)",
            params![&self.layerbranch_id, &self.name],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a class by name within a layer branch
    pub fn find_by_name(
        conn: &Connection,
        layerbranch_id: i64,
        name: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layerbranch_id, name FROM classes
             WHERE layerbranch_id = ?1 AND name = ?2",
        )?;

        let class = stmt
            .query_row(params![layerbranch_id, name], Self::from_row)
            .optional()?;

        Ok(class)
    }

    /// List all classes for a layer branch
    pub fn list_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layerbranch_id, name FROM classes
             WHERE layerbranch_id = ?1 ORDER BY name",
        )?;

        let classes = stmt
            .query_map([layerbranch_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(classes)
    }

    /// Delete a class by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM classes WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Delete all classes for a layer branch
    pub fn delete_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<usize> {
        let count = conn.execute(
            "DELETE FROM classes WHERE layerbranch_id = ?1",
            [layerbranch_id],
        )?;
        Ok(count)
    }

    /// Convert a database row to a BbClass
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            layerbranch_id: row.get(1)?,
            name: row.get(2)?,
        })
    }
}
