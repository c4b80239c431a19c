// src/db/schema.rs

//! Database schema definitions and migrations for strata
//!
//! This module defines the SQLite schema for all core tables and provides
//! a migration system to evolve the schema over time.

use crate::error::Result;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    // Apply migrations in order
    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => panic!("Unknown migration version: {}", version),
    }
}

/// Initial schema - Version 1
///
/// Creates all core tables for strata:
/// - layerbranches: one row per tracked (layer, branch) pairing
/// - recipes: evaluator-backed metadata records, path-keyed
/// - machines / distros / classes: name-keyed metadata records
/// - appends / incfiles: path-keyed auxiliary records
/// - file_dependencies: recipe -> file edges discovered during evaluation
/// - update_runs: one row per orchestrator invocation
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- LayerBranches: the (layer, branch) pairing carrying sync watermarks
        CREATE TABLE layerbranches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            layer TEXT NOT NULL,
            branch TEXT NOT NULL,
            vcs_url TEXT NOT NULL,
            vcs_subdir TEXT NOT NULL DEFAULT '',
            actual_branch TEXT,
            dependencies TEXT,
            vcs_last_fetch TEXT,
            vcs_last_rev TEXT,
            vcs_last_commit TEXT,
            UNIQUE(layer, branch)
        );

        CREATE INDEX idx_layerbranches_branch ON layerbranches(branch);

        -- Recipes: path-keyed, fields filled by the evaluator
        CREATE TABLE recipes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            layerbranch_id INTEGER NOT NULL,
            filepath TEXT NOT NULL,
            filename TEXT NOT NULL,
            pn TEXT NOT NULL,
            pv TEXT NOT NULL,
            summary TEXT,
            description TEXT,
            section TEXT,
            license TEXT,
            homepage TEXT,
            provides TEXT,
            depends TEXT,
            inherits TEXT,
            src_uris TEXT,
            updated TEXT,
            UNIQUE(layerbranch_id, filepath, filename),
            FOREIGN KEY (layerbranch_id) REFERENCES layerbranches(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_recipes_layerbranch ON recipes(layerbranch_id);
        CREATE INDEX idx_recipes_pn ON recipes(pn);

        -- Machines: name-keyed
        CREATE TABLE machines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            layerbranch_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            updated TEXT,
            UNIQUE(layerbranch_id, name),
            FOREIGN KEY (layerbranch_id) REFERENCES layerbranches(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_machines_layerbranch ON machines(layerbranch_id);

        -- Distros: name-keyed
        CREATE TABLE distros (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            layerbranch_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            updated TEXT,
            UNIQUE(layerbranch_id, name),
            FOREIGN KEY (layerbranch_id) REFERENCES layerbranches(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_distros_layerbranch ON distros(layerbranch_id);

        -- Classes: name-keyed
        CREATE TABLE classes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            layerbranch_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            UNIQUE(layerbranch_id, name),
            FOREIGN KEY (layerbranch_id) REFERENCES layerbranches(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_classes_layerbranch ON classes(layerbranch_id);

        -- Appends: path-keyed
        CREATE TABLE appends (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            layerbranch_id INTEGER NOT NULL,
            filepath TEXT NOT NULL,
            filename TEXT NOT NULL,
            UNIQUE(layerbranch_id, filepath, filename),
            FOREIGN KEY (layerbranch_id) REFERENCES layerbranches(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_appends_layerbranch ON appends(layerbranch_id);

        -- Include files: path-keyed, tracked as dependency targets
        CREATE TABLE incfiles (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            layerbranch_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            UNIQUE(layerbranch_id, path),
            FOREIGN KEY (layerbranch_id) REFERENCES layerbranches(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_incfiles_layerbranch ON incfiles(layerbranch_id);

        -- File dependencies: recipe -> layer-relative path edges
        CREATE TABLE file_dependencies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            recipe_id INTEGER NOT NULL,
            path TEXT NOT NULL,
            UNIQUE(recipe_id, path),
            FOREIGN KEY (recipe_id) REFERENCES recipes(id) ON DELETE CASCADE
        );

        CREATE INDEX idx_file_dependencies_recipe ON file_dependencies(recipe_id);
        CREATE INDEX idx_file_dependencies_path ON file_dependencies(path);

        -- Update runs: one row per orchestrator invocation
        CREATE TABLE update_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            finished_at TEXT,
            log TEXT,
            errors INTEGER NOT NULL DEFAULT 0,
            warnings INTEGER NOT NULL DEFAULT 0,
            retcode INTEGER
        );

        CREATE INDEX idx_update_runs_started_at ON update_runs(started_at);
        ",
    )?;

    debug!("Schema version 1 created successfully");
    Ok(())
}
