// src/db/models/layer_branch.rs

//! LayerBranch model - the (layer, branch) pairing carrying sync watermarks
//!
//! At most one LayerBranch exists per (layer, branch) pair. The watermark
//! columns are mutated exclusively by the update orchestrator after a sync;
//! `vcs_last_rev` decides incremental vs. full on the next run.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

/// One tracked (layer, branch) pairing
#[derive(Debug, Clone)]
pub struct LayerBranch {
    pub id: Option<i64>,
    pub layer: String,
    pub branch: String,
    pub vcs_url: String,
    /// Layer root within the repository; empty when the layer is the repo root
    pub vcs_subdir: String,
    /// Checked-out branch name when it differs from the logical branch
    pub actual_branch: Option<String>,
    /// Declared layer dependencies, in declaration order
    pub dependencies: Vec<String>,
    pub vcs_last_fetch: Option<String>,
    pub vcs_last_rev: Option<String>,
    pub vcs_last_commit: Option<String>,
}

impl LayerBranch {
    /// Create a new LayerBranch
    pub fn new(layer: String, branch: String, vcs_url: String) -> Self {
        Self {
            id: None,
            layer,
            branch,
            vcs_url,
            vcs_subdir: String::new(),
            actual_branch: None,
            dependencies: Vec::new(),
            vcs_last_fetch: None,
            vcs_last_rev: None,
            vcs_last_commit: None,
        }
    }

    /// The branch name to check out (actual branch wins when set)
    pub fn checkout_branch(&self) -> &str {
        self.actual_branch.as_deref().unwrap_or(&self.branch)
    }

    /// Insert this layer branch into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let deps_json = serde_json::to_string(&self.dependencies)?;
        conn.execute(
            "INSERT INTO layerbranches (layer, branch, vcs_url, vcs_subdir, actual_branch, dependencies)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &self.layer,
                &self.branch,
                &self.vcs_url,
                &self.vcs_subdir,
                &self.actual_branch,
                &deps_json,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// Find a layer branch by (layer, branch)
    pub fn find_by_layer_and_branch(
        conn: &Connection,
        layer: &str,
        branch: &str,
    ) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layer, branch, vcs_url, vcs_subdir, actual_branch, dependencies,
                    vcs_last_fetch, vcs_last_rev, vcs_last_commit
             FROM layerbranches WHERE layer = ?1 AND branch = ?2",
        )?;

        let lb = stmt.query_row([layer, branch], Self::from_row).optional()?;

        Ok(lb)
    }

    /// List all layer branches for a branch name
    pub fn list_for_branch(conn: &Connection, branch: &str) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layer, branch, vcs_url, vcs_subdir, actual_branch, dependencies,
                    vcs_last_fetch, vcs_last_rev, vcs_last_commit
             FROM layerbranches WHERE branch = ?1 ORDER BY layer",
        )?;

        let lbs = stmt
            .query_map([branch], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(lbs)
    }

    /// List all layer branches
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, layer, branch, vcs_url, vcs_subdir, actual_branch, dependencies,
                    vcs_last_fetch, vcs_last_rev, vcs_last_commit
             FROM layerbranches ORDER BY layer, branch",
        )?;

        let lbs = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(lbs)
    }

    /// Update the fetch timestamp to now
    ///
    /// Called on every update attempt, successful or not.
    pub fn touch_last_fetch(&mut self, conn: &Connection) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE layerbranches SET vcs_last_fetch = ?1 WHERE id = ?2",
            params![&now, &self.id],
        )?;
        self.vcs_last_fetch = Some(now);
        Ok(())
    }

    /// Record the synchronized revision and its commit timestamp
    ///
    /// Only called after a successful, non-dry-run commit.
    pub fn set_watermark(&mut self, conn: &Connection, rev: &str, commit_time: &str) -> Result<()> {
        conn.execute(
            "UPDATE layerbranches SET vcs_last_rev = ?1, vcs_last_commit = ?2 WHERE id = ?3",
            params![rev, commit_time, &self.id],
        )?;
        self.vcs_last_rev = Some(rev.to_string());
        self.vcs_last_commit = Some(commit_time.to_string());
        Ok(())
    }

    /// Delete a layer branch by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM layerbranches WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Convert a database row to a LayerBranch
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let deps_json: Option<String> = row.get(6)?;
        let dependencies = match deps_json {
            Some(json) => serde_json::from_str(&json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?,
            None => Vec::new(),
        };

        Ok(Self {
            id: Some(row.get(0)?),
            layer: row.get(1)?,
            branch: row.get(2)?,
            vcs_url: row.get(3)?,
            vcs_subdir: row.get(4)?,
            actual_branch: row.get(5)?,
            dependencies,
            vcs_last_fetch: row.get(7)?,
            vcs_last_rev: row.get(8)?,
            vcs_last_commit: row.get(9)?,
        })
    }
}
