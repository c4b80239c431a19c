// src/db/models/recipe.rs

//! Recipe model - evaluator-backed metadata records, path-keyed
//!
//! A recipe is identified by (layerbranch, filepath, filename). The pn/pv
//! and descriptive fields are filled in by the metadata evaluator; list
//! fields are stored as JSON text columns.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// A recipe record describing how to build one software package
#[derive(Debug, Clone)]
pub struct Recipe {
    pub id: Option<i64>,
    pub layerbranch_id: i64,
    /// Directory of the recipe file, relative to the layer root
    pub filepath: String,
    pub filename: String,
    pub pn: String,
    pub pv: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub section: Option<String>,
    pub license: Option<String>,
    pub homepage: Option<String>,
    pub provides: Vec<String>,
    pub depends: Vec<String>,
    pub inherits: Vec<String>,
    pub src_uris: Vec<String>,
    pub updated: Option<String>,
}

impl Recipe {
    /// Create a new Recipe
    pub fn new(
        layerbranch_id: i64,
        filepath: String,
        filename: String,
        pn: String,
        pv: String,
    ) -> Self {
        Self {
            id: None,
            layerbranch_id,
            filepath,
            filename,
            pn,
            pv,
            summary: None,
            description: None,
            section: None,
            license: None,
            homepage: None,
            provides: Vec::new(),
            depends: Vec::new(),
            inherits: Vec::new(),
            src_uris: Vec::new(),
            updated: None,
        }
    }

    /// Layer-relative path of the recipe file
    pub fn full_path(&self) -> String {
        if self.filepath.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.filepath, self.filename)
        }
    }

    /// Insert this recipe into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO recipes (layerbranch_id, filepath, filename, pn, pv, summary,
                                  description, section, license, homepage, provides, depends,
                                  inherits, src_uris, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                &self.layerbranch_id,
                &self.filepath,
                &self.filename,
                &self.pn,
                &self.pv,
                &self.summary,
                &self.description,
                &self.section,
                &self.license,
                &self.homepage,
                serde_json::to_string(&self.provides)?,
                serde_json::to_string(&self.depends)?,
                serde_json::to_string(&self.inherits)?,
                serde_json::to_string(&self.src_uris)?,
                &now,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        self.updated = Some(now);
        Ok(id)
    }

    /// Find a recipe by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM recipes WHERE id = ?1",
            Self::COLUMNS
        ))?;

        let recipe = stmt.query_row([id], Self::from_row).optional()?;

        Ok(recipe)
    }

    /// Find a recipe by its layer-relative path
    pub fn find_by_path(
        conn: &Connection,
        layerbranch_id: i64,
        filepath: &str,
        filename: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM recipes
             WHERE layerbranch_id = ?1 AND filepath = ?2 AND filename = ?3",
            Self::COLUMNS
        ))?;

        let recipe = stmt
            .query_row(params![layerbranch_id, filepath, filename], Self::from_row)
            .optional()?;

        Ok(recipe)
    }

    /// List all recipes for a layer branch
    pub fn list_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM recipes WHERE layerbranch_id = ?1 ORDER BY filepath, filename",
            Self::COLUMNS
        ))?;

        let recipes = stmt
            .query_map([layerbranch_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(recipes)
    }

    /// Update all mutable fields of this recipe, bumping its updated timestamp
    pub fn update(&mut self, conn: &Connection) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::InitError("Cannot update recipe without ID".to_string())
        })?;

        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE recipes SET filepath = ?1, filename = ?2, pn = ?3, pv = ?4, summary = ?5,
                                description = ?6, section = ?7, license = ?8, homepage = ?9,
                                provides = ?10, depends = ?11, inherits = ?12, src_uris = ?13,
                                updated = ?14
             WHERE id = ?15",
            params![
                &self.filepath,
                &self.filename,
                &self.pn,
                &self.pv,
                &self.summary,
                &self.description,
                &self.section,
                &self.license,
                &self.homepage,
                serde_json::to_string(&self.provides)?,
                serde_json::to_string(&self.depends)?,
                serde_json::to_string(&self.inherits)?,
                serde_json::to_string(&self.src_uris)?,
                &now,
                id,
            ],
        )?;

        self.updated = Some(now);
        Ok(())
    }

    /// Delete a recipe by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM recipes WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Delete all recipes for a layer branch
    pub fn delete_for_layerbranch(conn: &Connection, layerbranch_id: i64) -> Result<usize> {
        let count = conn.execute(
            "DELETE FROM recipes WHERE layerbranch_id = ?1",
            [layerbranch_id],
        )?;
        Ok(count)
    }

    const COLUMNS: &'static str = "id, layerbranch_id, filepath, filename, pn, pv, summary, \
                                   description, section, license, homepage, provides, depends, \
                                   inherits, src_uris, updated";

    /// Convert a database row to a Recipe
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            layerbranch_id: row.get(1)?,
            filepath: row.get(2)?,
            filename: row.get(3)?,
            pn: row.get(4)?,
            pv: row.get(5)?,
            summary: row.get(6)?,
            description: row.get(7)?,
            section: row.get(8)?,
            license: row.get(9)?,
            homepage: row.get(10)?,
            provides: parse_list(row, 11)?,
            depends: parse_list(row, 12)?,
            inherits: parse_list(row, 13)?,
            src_uris: parse_list(row, 14)?,
            updated: row.get(15)?,
        })
    }
}

/// Decode a JSON list column, treating NULL as empty
fn parse_list(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let json: Option<String> = row.get(idx)?;
    match json {
        Some(json) => serde_json::from_str(&json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        }),
        None => Ok(Vec::new()),
    }
}
