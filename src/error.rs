// src/error.rs

//! Error types for the strata layer index

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while synchronizing a layer index
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Git error: {0}")]
    GitError(#[from] git2::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("Layer configuration error: {0}")]
    ContextError(String),

    #[error("Layer '{layer}' has no branch '{branch}' in the index")]
    MissingDependencyBranch { layer: String, branch: String },

    #[error("Dependency cycle involving layer '{0}'")]
    DependencyCycle(String),

    #[error("Evaluation failed: {0}")]
    EvalError(String),

    #[error("Could not acquire lock: {0}")]
    LockTimeout(String),

    #[error("Operation cancelled during {0}")]
    Cancelled(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::IoError(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::ParseError(e.to_string())
    }
}
