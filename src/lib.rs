// src/lib.rs

//! Strata layer-metadata index
//!
//! Keeps a relational record of software layers (directory trees of
//! declarative build-metadata files) in lockstep with their git source
//! trees as they evolve.
//!
//! # Architecture
//!
//! - Database-first: all state in SQLite, watermarked per (layer, branch)
//! - Incremental by default: a classified diff against the last
//!   synchronized revision drives the minimal set of re-evaluations
//! - Rename-stable identity: records survive file renames and
//!   name-preserving upgrades via the reclaim rule
//! - One transaction per layer branch: a failing layer never rolls back
//!   another's update

pub mod classify;
pub mod context;
pub mod db;
mod error;
pub mod evaluator;
pub mod lock;
pub mod reconcile;
pub mod runlog;
pub mod update;
pub mod worktree;

pub use classify::{Classified, FileKind, classify};
pub use error::{Error, Result};
pub use evaluator::{
    EvalError, EvaluatedRecipe, MetadataEvaluator, NativeEvaluator, ProcessEvaluator,
};
pub use lock::UpdateLock;
pub use reconcile::{Reconciler, SyncCounts};
pub use runlog::RunLog;
pub use update::{LayerUpdater, RETCODE_INTERRUPTED, UpdateOptions, UpdateSummary};
pub use worktree::ChangeSet;
