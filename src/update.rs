// src/update.rs

//! Update orchestration
//!
//! Drives one update run end to end: acquire the shared lock, bring each
//! layer's clone to the branch tip, build its evaluation context, choose
//! incremental or full reconciliation, apply the result inside a single
//! transaction per layer branch, and record the outcome.
//!
//! A run progresses through lock acquisition, context construction,
//! reconciliation and commit; dry runs roll the finished transaction back,
//! and cancellation is checked before the lock, per layer, and before each
//! commit so an interrupt can never leave the lock held or a transaction
//! open. A failure in one layer does not prevent the remaining layers from
//! updating; the run's return code reflects the aggregate.

use crate::context;
use crate::db::models::{
    BbAppend, BbClass, Distro, IncFile, LayerBranch, Machine, Recipe, UpdateRun,
};
use crate::db::paths;
use crate::error::{Error, Result};
use crate::evaluator::MetadataEvaluator;
use crate::lock::{LOCK_TIMEOUT, UpdateLock};
use crate::reconcile::{Reconciler, SyncCounts};
use crate::runlog::RunLog;
use crate::worktree::{self, ChangeSet};
use git2::Repository;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Exit code reserved for operator interruption, so a wrapping scheduler
/// can retry instead of treating it as a hard failure
pub const RETCODE_INTERRUPTED: i32 = 254;

/// Options for one update run
#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub branch: String,
    /// Layers to update; empty means every layer tracked on the branch
    pub layers: Vec<String>,
    /// Ignore the watermark but still attempt identity reclaim
    pub reload: bool,
    /// Also discard all existing records for the layer before resyncing
    pub full_reload: bool,
    pub dry_run: bool,
    pub no_fetch: bool,
    pub no_checkout: bool,
    /// Abort the transaction on the first per-file evaluation failure
    pub stop_on_error: bool,
    /// Keep the evaluator scratch directory after the run
    pub keep_temp: bool,
    pub lock_timeout: Duration,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            branch: "master".to_string(),
            layers: Vec::new(),
            reload: false,
            full_reload: false,
            dry_run: false,
            no_fetch: false,
            no_checkout: false,
            stop_on_error: false,
            keep_temp: false,
            lock_timeout: LOCK_TIMEOUT,
        }
    }
}

/// Aggregate result of an update run
#[derive(Debug, Clone, Default)]
pub struct UpdateSummary {
    pub run_id: i64,
    pub retcode: i32,
    pub layers_updated: usize,
    pub layers_skipped: usize,
    pub layers_failed: usize,
    pub counts: SyncCounts,
}

/// Orchestrates update runs against one database and fetch directory
pub struct LayerUpdater<'a> {
    conn: &'a mut Connection,
    fetch_dir: PathBuf,
    evaluator: &'a dyn MetadataEvaluator,
    options: UpdateOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a> LayerUpdater<'a> {
    pub fn new(
        conn: &'a mut Connection,
        fetch_dir: PathBuf,
        evaluator: &'a dyn MetadataEvaluator,
        options: UpdateOptions,
    ) -> Self {
        Self {
            conn,
            fetch_dir,
            evaluator,
            options,
            cancel: None,
        }
    }

    /// Set the cancellation token
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run the update, recording it as an UpdateRun regardless of outcome
    pub fn run(&mut self) -> Result<UpdateSummary> {
        let mut log = RunLog::new();
        let mut run = UpdateRun::start(self.conn)?;
        let run_id = run.id.unwrap_or_default();

        let result = self.run_inner(&mut log);

        let retcode = match &result {
            Ok(summary) => summary.retcode,
            Err(Error::Cancelled(op)) => {
                log.warn(format!("Update interrupted during {op}"));
                RETCODE_INTERRUPTED
            }
            Err(e) => {
                log.error(format!("Update run failed: {e}"));
                1
            }
        };

        if let Err(finish_err) = run.finish(
            self.conn,
            &log.text(),
            log.errors(),
            log.warnings(),
            retcode as i64,
        ) {
            tracing::error!("Failed to finalize update run record: {}", finish_err);
        }

        result.map(|mut summary| {
            summary.run_id = run_id;
            summary
        })
    }

    fn run_inner(&mut self, log: &mut RunLog) -> Result<UpdateSummary> {
        check_cancelled(&self.cancel, "startup")?;

        let branch = self.options.branch.clone();
        let mut targets = Vec::new();
        if self.options.layers.is_empty() {
            targets = LayerBranch::list_for_branch(self.conn, &branch)?;
            if targets.is_empty() {
                log.warn(format!("No layers tracked on branch {branch}"));
            }
        } else {
            for name in &self.options.layers {
                match LayerBranch::find_by_layer_and_branch(self.conn, name, &branch)? {
                    Some(lb) => targets.push(lb),
                    None => {
                        return Err(Error::InitError(format!(
                            "Layer '{name}' has no branch '{branch}' in the index"
                        )));
                    }
                }
            }
        }

        check_cancelled(&self.cancel, "lock acquisition")?;
        let lock_path = paths::lock_path(&self.fetch_dir);
        let _lock = UpdateLock::acquire_timeout(&lock_path, self.options.lock_timeout)?;

        // Scratch directory for the evaluator; kept only on request
        let scratch = tempfile::Builder::new().prefix("strata-eval-").tempdir()?;
        let (work_dir, _scratch_guard) = if self.options.keep_temp {
            let path = scratch.keep();
            log.note(format!("Keeping temp directory {}", path.display()));
            (path, None)
        } else {
            (scratch.path().to_path_buf(), Some(scratch))
        };

        let mut summary = UpdateSummary::default();
        for mut lb in targets {
            check_cancelled(&self.cancel, "layer update")?;
            log.note(format!("Updating layer {} (branch {})", lb.layer, branch));

            let outcome = self.update_layer(&mut lb, &work_dir, log);

            // The fetch timestamp always moves, whatever the outcome
            if let Err(e) = lb.touch_last_fetch(self.conn) {
                log.warn(format!(
                    "Could not update fetch timestamp for {}: {}",
                    lb.layer, e
                ));
            }

            match outcome {
                Ok(Some(counts)) => {
                    log.note(format!("Layer {}: {}", lb.layer, counts.summary()));
                    summary.layers_updated += 1;
                    summary.counts.added += counts.added;
                    summary.counts.updated += counts.updated;
                    summary.counts.deleted += counts.deleted;
                    summary.counts.evaluated += counts.evaluated;
                }
                Ok(None) => summary.layers_skipped += 1,
                Err(Error::Cancelled(op)) => return Err(Error::Cancelled(op)),
                Err(e) => {
                    log.error(format!("Update of layer {} failed: {}", lb.layer, e));
                    summary.layers_failed += 1;
                }
            }
        }

        summary.retcode = if summary.layers_failed > 0 { 1 } else { 0 };
        Ok(summary)
    }

    /// Update one layer branch; Ok(None) means it was already up to date
    fn update_layer(
        &mut self,
        lb: &mut LayerBranch,
        work_dir: &Path,
        log: &mut RunLog,
    ) -> Result<Option<SyncCounts>> {
        let reload = self.options.reload;
        let full_reload = self.options.full_reload;
        let dry_run = self.options.dry_run;
        let stop_on_error = self.options.stop_on_error;
        let evaluator = self.evaluator;
        let fetch_dir = self.fetch_dir.clone();
        let cancel = self.cancel.clone();

        let clone = paths::clone_dir(&fetch_dir, &lb.vcs_url);
        let repo = Repository::open(&clone)?;
        let branch = lb.checkout_branch().to_string();

        if !self.options.no_fetch {
            worktree::fetch_origin(&repo, &branch)?;
        }
        if !self.options.no_checkout {
            worktree::checkout_branch(&repo, &branch)?;
        }

        let (head, head_commit_time) = worktree::head_revision(&repo)?;

        if !reload && !full_reload && lb.vcs_last_rev.as_deref() == Some(head.as_str()) {
            log.note(format!(
                "Layer {} is already up to date (rev {})",
                lb.layer, head
            ));
            return Ok(None);
        }

        let ctx = context::build_context(self.conn, &fetch_dir, lb, work_dir)?;
        let layer_root = context::layer_root(&fetch_dir, lb);

        // Incremental only with a usable watermark; a vanished revision
        // (history rewrite) degrades to a full sync instead of failing
        let mut changes: Option<ChangeSet> = None;
        if !reload && !full_reload {
            if let Some(last_rev) = lb.vcs_last_rev.clone() {
                match worktree::changes_between(&repo, &lb.vcs_subdir, &last_rev, &head) {
                    Ok(cs) => changes = Some(cs),
                    Err(e) => log.warn(format!(
                        "Cannot diff {}..{} for layer {} ({}); falling back to full sync",
                        last_rev, head, lb.layer, e
                    )),
                }
            }
        }

        let layerbranch_id = lb
            .id
            .ok_or_else(|| Error::InitError("Layer branch has no ID".to_string()))?;

        let tx = self.conn.transaction()?;
        let counts = {
            let reconciler = Reconciler::new(&tx, lb, layer_root, &ctx, evaluator, stop_on_error)?;
            match &changes {
                Some(cs) => {
                    debug!(
                        "Incremental sync of {} ({} -> {})",
                        lb.layer,
                        lb.vcs_last_rev.as_deref().unwrap_or(""),
                        head
                    );
                    reconciler.apply_changes(cs, log)?
                }
                None => {
                    if full_reload {
                        log.note(format!(
                            "Discarding existing records for layer {}",
                            lb.layer
                        ));
                        Recipe::delete_for_layerbranch(&tx, layerbranch_id)?;
                        Machine::delete_for_layerbranch(&tx, layerbranch_id)?;
                        Distro::delete_for_layerbranch(&tx, layerbranch_id)?;
                        BbClass::delete_for_layerbranch(&tx, layerbranch_id)?;
                        BbAppend::delete_for_layerbranch(&tx, layerbranch_id)?;
                        IncFile::delete_for_layerbranch(&tx, layerbranch_id)?;
                    }
                    let workdir = repo.workdir().ok_or_else(|| {
                        Error::InitError("Repository has no working tree".to_string())
                    })?;
                    let files = worktree::list_layer_files(workdir, &lb.vcs_subdir)?;
                    debug!("Full sync of {} over {} files", lb.layer, files.len());
                    reconciler.apply_full(&files, log)?
                }
            }
        };

        if cancel
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
        {
            tx.rollback()?;
            return Err(Error::Cancelled("commit".to_string()));
        }

        if dry_run {
            log.note(format!(
                "Dry run requested, rolling back changes for layer {}",
                lb.layer
            ));
            tx.rollback()?;
            return Ok(Some(counts));
        }

        tx.commit()?;
        lb.set_watermark(self.conn, &head, &head_commit_time)?;
        Ok(Some(counts))
    }
}

/// Check if cancellation has been requested
fn check_cancelled(cancel: &Option<Arc<AtomicBool>>, operation: &str) -> Result<()> {
    if cancel.as_ref().is_some_and(|c| c.load(Ordering::Relaxed)) {
        Err(Error::Cancelled(operation.to_string()))
    } else {
        Ok(())
    }
}
