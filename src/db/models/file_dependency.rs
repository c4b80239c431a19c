// src/db/models/file_dependency.rs

//! FileDependency model - recipe -> file edges discovered during evaluation
//!
//! Each edge records that evaluating a recipe also depended on reading a
//! given layer-relative file (an include file, a class, a machine conf).
//! Edges are fully replaced on every re-evaluation of their owning recipe.

use crate::error::Result;
use rusqlite::{Connection, Row, params, params_from_iter};

/// One (recipe, file path) dependency edge
#[derive(Debug, Clone)]
pub struct FileDependency {
    pub id: Option<i64>,
    pub recipe_id: i64,
    /// Layer-relative path of the depended-on file
    pub path: String,
}

impl FileDependency {
    /// Replace all dependency edges for a recipe with the given set
    ///
    /// A changed recipe may drop or gain dependencies, so the old edges are
    /// never merged with the new ones.
    pub fn replace_for_recipe(conn: &Connection, recipe_id: i64, paths: &[String]) -> Result<()> {
        conn.execute(
            "DELETE FROM file_dependencies WHERE recipe_id = ?1",
            [recipe_id],
        )?;

        let mut stmt =
            conn.prepare("INSERT OR IGNORE INTO file_dependencies (recipe_id, path) VALUES (?1, ?2)")?;
        for path in paths {
            stmt.execute(params![recipe_id, path])?;
        }

        Ok(())
    }

    /// List all dependency edges for a recipe
    pub fn list_for_recipe(conn: &Connection, recipe_id: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, recipe_id, path FROM file_dependencies
             WHERE recipe_id = ?1 ORDER BY path",
        )?;

        let deps = stmt
            .query_map([recipe_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(deps)
    }

    /// Find the recipes within a layer branch that depend on any of the
    /// given layer-relative paths
    ///
    /// This is the reverse-dependency query: "if file F changed, which
    /// recipes must be re-evaluated even though F is not itself a recipe."
    pub fn recipes_depending_on(
        conn: &Connection,
        layerbranch_id: i64,
        paths: &[String],
    ) -> Result<Vec<i64>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = paths
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");

        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT fd.recipe_id FROM file_dependencies fd
             JOIN recipes r ON r.id = fd.recipe_id
             WHERE r.layerbranch_id = ?1 AND fd.path IN ({})
             ORDER BY fd.recipe_id",
            placeholders
        ))?;

        let mut values: Vec<rusqlite::types::Value> =
            vec![rusqlite::types::Value::Integer(layerbranch_id)];
        values.extend(
            paths
                .iter()
                .map(|p| rusqlite::types::Value::Text(p.clone())),
        );

        let ids = stmt
            .query_map(params_from_iter(values), |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;

        Ok(ids)
    }

    /// Convert a database row to a FileDependency
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            recipe_id: row.get(1)?,
            path: row.get(2)?,
        })
    }
}
