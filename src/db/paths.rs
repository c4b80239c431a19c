// src/db/paths.rs
//! Centralized path derivation for strata directories

use std::path::{Path, PathBuf};

/// Get the directory containing the database
pub fn db_dir(db_path: &str) -> PathBuf {
    Path::new(db_path)
        .parent()
        .unwrap_or(Path::new("/var/lib/strata"))
        .to_path_buf()
}

/// Get the shared fetch directory holding one clone per vcs_url
pub fn fetch_dir(db_path: &str) -> PathBuf {
    std::env::var("STRATA_FETCH_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| db_dir(db_path).join("fetch"))
}

/// Get the lock file guarding the shared fetch directory
pub fn lock_path(fetch_dir: &Path) -> PathBuf {
    fetch_dir.join("strata.lock")
}

/// Get the local clone directory for a repository URL
///
/// URLs are flattened to a single path component; anything outside
/// [A-Za-z0-9._-] becomes an underscore.
pub fn clone_dir(fetch_dir: &Path, vcs_url: &str) -> PathBuf {
    let sanitized: String = vcs_url
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    fetch_dir.join(sanitized)
}
