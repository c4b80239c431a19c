// src/db/models/distro.rs

//! Distro model - name-keyed distribution definitions

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A distro definition within a layer branch
#[derive(Debug, Clone)]
pub struct Distro {
    pub id: Option<i64>,
    pub layerbranch_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub updated: Option<String>,
}

impl Distro {
    /// Create a new Distro
    pub fn new(layerbranch_id: i64, name: String) -> Self {
        Self {
            id: None,
            layerbranch_id,
            name,
            description: None,
            updated: None,
        }
    }

    /// Insert this distro into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO distros (layerbranch_id, name, description, updated)
             VALUES (?1, ?2, ?3, ?4)",
            params![&self.layerbranch_id, &self.name, &self.description, &now],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        self.updated = Some(now);
        Ok(id)
    }

    /// Find a distro by name within a layer branch
    pub fn find_by_name(
        conn: &Connection,
        layerbranch_id: i64,
        name: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layerbranch_id, name, description, updated
             FROM distros WHERE layerbranch_id = ?1 AND name = ?2",
        )?;

        let distro = stmt
            .query_row(params![layerbranch_id, name], Self::from_row)
            .optional()?;

        Ok(distro)
    }

    /// List all distros for a layer branch
    pub fn list_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layerbranch_id, name, description, updated
             FROM distros WHERE layerbranch_id = ?1 ORDER BY name",
        )?;

        let distros = stmt
            .query_map([layerbranch_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(distros)
    }

    /// Update this distro's description, bumping its updated timestamp
    pub fn update(&mut self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::InitError("Cannot update distro without ID".to_string())
        })?;

        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE distros SET name = ?1, description = ?2, updated = ?3 WHERE id = ?4",
            params![&self.name, &self.description, &now, id],
        )?;

        self.updated = Some(now);
        Ok(())
    }

    /// Delete a distro by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM distros WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Delete all distros for a layer branch
    pub fn delete_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<usize> {
        let count = conn.execute(
            "DELETE FROM distros WHERE layerbranch_id = ?1",
            [layerbranch_id],
        )?;
        Ok(count)
    }

    /// Convert a database row to a Distro
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            layerbranch_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            updated: row.get(4)?,
        })
    }
}
