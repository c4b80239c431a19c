// src/commands.rs
//! Command handlers for the strata CLI

use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use strata::db::models::{LayerBranch, Recipe, UpdateRun};
use strata::db::paths;
use strata::evaluator::{MetadataEvaluator, NativeEvaluator, ProcessEvaluator};
use strata::update::{LayerUpdater, RETCODE_INTERRUPTED, UpdateOptions};
use strata::{Error, db};
use tracing::info;

/// Initialize (or migrate) the database
pub fn init(db_path: &str) -> Result<()> {
    info!("Initializing strata database at: {}", db_path);
    db::init(db_path)?;
    println!("Database initialized successfully at: {}", db_path);
    Ok(())
}

/// Register a layer branch for tracking
#[allow(clippy::too_many_arguments)]
pub fn add_layer(
    layer: &str,
    vcs_url: &str,
    branch: &str,
    subdir: &str,
    actual_branch: Option<String>,
    dependencies: Vec<String>,
    db_path: &str,
) -> Result<()> {
    let conn = db::open(db_path)?;

    if LayerBranch::find_by_layer_and_branch(&conn, layer, branch)?.is_some() {
        anyhow::bail!("Layer '{}' is already tracked on branch '{}'", layer, branch);
    }

    let mut lb = LayerBranch::new(layer.to_string(), branch.to_string(), vcs_url.to_string());
    lb.vcs_subdir = subdir.to_string();
    lb.actual_branch = actual_branch;
    lb.dependencies = dependencies;
    lb.insert(&conn)?;

    println!("Tracking layer {} on branch {}", layer, branch);
    Ok(())
}

/// List tracked layer branches with their watermarks
pub fn list_layers(db_path: &str) -> Result<()> {
    let conn = db::open(db_path)?;
    let layers = LayerBranch::list_all(&conn)?;

    if layers.is_empty() {
        println!("No layers tracked");
        return Ok(());
    }

    println!(
        "{:<24} {:<12} {:<14} {:<42} LAST SYNC",
        "LAYER", "BRANCH", "RECIPES", "URL"
    );
    for lb in layers {
        let recipes = lb
            .id
            .map(|id| Recipe::list_for_layerbranch(&conn, id).map(|r| r.len()))
            .transpose()?
            .unwrap_or(0);
        println!(
            "{:<24} {:<12} {:<14} {:<42} {}",
            lb.layer,
            lb.branch,
            recipes,
            lb.vcs_url,
            lb.vcs_last_rev.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Run an update; returns the process exit code
#[allow(clippy::too_many_arguments)]
pub fn update(
    branch: String,
    layers: Vec<String>,
    reload: bool,
    full_reload: bool,
    dry_run: bool,
    no_fetch: bool,
    no_checkout: bool,
    stop_on_error: bool,
    keep_temp: bool,
    evaluator_program: Option<String>,
    evaluator_timeout: u64,
    db_path: &str,
    cancel: Arc<AtomicBool>,
) -> Result<i32> {
    let mut conn = db::open(db_path)?;
    let fetch_dir = paths::fetch_dir(db_path);

    let evaluator: Box<dyn MetadataEvaluator> = match evaluator_program {
        Some(program) => Box::new(
            ProcessEvaluator::new(program).with_timeout(Duration::from_secs(evaluator_timeout)),
        ),
        None => Box::new(NativeEvaluator),
    };

    let options = UpdateOptions {
        branch,
        layers,
        reload,
        full_reload,
        dry_run,
        no_fetch,
        no_checkout,
        stop_on_error,
        keep_temp,
        ..UpdateOptions::default()
    };

    let mut updater =
        LayerUpdater::new(&mut conn, fetch_dir, evaluator.as_ref(), options).with_cancel(cancel);

    match updater.run() {
        Ok(summary) => {
            println!(
                "Updated {} layer(s), skipped {}, failed {} ({})",
                summary.layers_updated,
                summary.layers_skipped,
                summary.layers_failed,
                summary.counts.summary()
            );
            Ok(summary.retcode)
        }
        Err(Error::Cancelled(op)) => {
            eprintln!("Interrupted during {}", op);
            Ok(RETCODE_INTERRUPTED)
        }
        Err(e) => Err(e.into()),
    }
}

/// List recent update runs
pub fn runs(limit: i64, db_path: &str) -> Result<()> {
    let conn = db::open(db_path)?;
    let runs = UpdateRun::list_recent(&conn, limit)?;

    if runs.is_empty() {
        println!("No update runs recorded");
        return Ok(());
    }

    println!(
        "{:<6} {:<26} {:<26} {:<8} {:<9} RETCODE",
        "RUN", "STARTED", "FINISHED", "ERRORS", "WARNINGS"
    );
    for run in runs {
        println!(
            "{:<6} {:<26} {:<26} {:<8} {:<9} {}",
            run.id.unwrap_or_default(),
            run.started_at.as_deref().unwrap_or("-"),
            run.finished_at.as_deref().unwrap_or("(running)"),
            run.errors,
            run.warnings,
            run.retcode
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    Ok(())
}
