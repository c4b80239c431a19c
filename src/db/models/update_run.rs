// src/db/models/update_run.rs

//! UpdateRun model - one row per orchestrator invocation
//!
//! Created when an update starts and finalized when it ends, whether it
//! succeeded, failed, or was interrupted. Warning/error counts are derived
//! from the run log's `WARNING:` / `ERROR:` line prefixes.

use crate::error::Result;
use rusqlite::{Connection, Row, params};

/// A recorded orchestrator invocation
#[derive(Debug, Clone)]
pub struct UpdateRun {
    pub id: Option<i64>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub log: Option<String>,
    pub errors: i64,
    pub warnings: i64,
    pub retcode: Option<i64>,
}

impl UpdateRun {
    /// Insert a new run row marking the start of an invocation
    pub fn start(conn: &Connection) -> Result<Self> {
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO update_runs (started_at) VALUES (?1)",
            params![&now],
        )?;

        Ok(Self {
            id: Some(conn.last_insert_rowid()),
            started_at: Some(now),
            finished_at: None,
            log: None,
            errors: 0,
            warnings: 0,
            retcode: None,
        })
    }

    /// Finalize the run with its log, derived counts, and return code
    pub fn finish(
        &mut self,
        conn: &Connection,
        log: &str,
        errors: i64,
        warnings: i64,
        retcode: i64,
    ) -> Result<()> {
        let id = self.id.ok_or_else(|| {
            crate::error::Error::InitError("Cannot finish update run without ID".to_string())
        })?;

        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE update_runs SET finished_at = ?1, log = ?2, errors = ?3, warnings = ?4,
                                    retcode = ?5
             WHERE id = ?6",
            params![&now, log, errors, warnings, retcode, id],
        )?;

        self.finished_at = Some(now);
        self.log = Some(log.to_string());
        self.errors = errors;
        self.warnings = warnings;
        self.retcode = Some(retcode);
        Ok(())
    }

    /// List the most recent runs, newest first
    pub fn list_recent(conn: &Connection, limit: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, log, errors, warnings, retcode
             FROM update_runs ORDER BY id DESC LIMIT ?1",
        )?;

        let runs = stmt
            .query_map([limit], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }

    /// Convert a database row to an UpdateRun
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            log: row.get(3)?,
            errors: row.get(4)?,
            warnings: row.get(5)?,
            retcode: row.get(6)?,
        })
    }
}
