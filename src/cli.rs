// src/cli.rs
//! CLI definitions for the strata layer index
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use clap_complete::Shell;

pub const DEFAULT_DB_PATH: &str = "/var/lib/strata/index.db";

#[derive(Parser)]
#[command(name = "strata")]
#[command(author = "Strata Project")]
#[command(version)]
#[command(about = "Layer-metadata index synchronizer", long_about = None)]
pub struct Cli {
    /// Enable debug output
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Only print warnings and errors
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new strata database
    Init {
        /// Path to the database file
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Register a layer branch for tracking
    AddLayer {
        /// Layer name
        layer: String,

        /// Repository URL
        #[arg(long)]
        vcs_url: String,

        /// Branch to track
        #[arg(short, long, default_value = "master")]
        branch: String,

        /// Layer root within the repository (empty for the repo root)
        #[arg(long, default_value = "")]
        subdir: String,

        /// Branch to actually check out when it differs from the logical name
        #[arg(long)]
        actual_branch: Option<String>,

        /// Layer dependencies, in declaration order
        #[arg(long = "depends", value_delimiter = ',')]
        dependencies: Vec<String>,

        /// Path to the database file
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// List tracked layer branches and their sync watermarks
    ListLayers {
        /// Path to the database file
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Synchronize layer metadata records with the source trees
    Update {
        /// Branch to update
        #[arg(short, long, default_value = "master")]
        branch: String,

        /// Layer(s) to update (default: all layers on the branch)
        #[arg(short, long)]
        layer: Vec<String>,

        /// Ignore the sync watermark but still attempt identity reclaim
        #[arg(long)]
        reload: bool,

        /// Discard all existing records for the layer(s) before resyncing
        #[arg(long)]
        full_reload: bool,

        /// Compute and report everything, then roll the transaction back
        #[arg(long)]
        dry_run: bool,

        /// Skip fetching from the remote
        #[arg(long)]
        no_fetch: bool,

        /// Skip checking out the branch tip
        #[arg(long)]
        no_checkout: bool,

        /// Abort on the first per-file evaluation failure
        #[arg(long)]
        stop_on_error: bool,

        /// Keep the evaluator scratch directory after the run
        #[arg(long)]
        keep_temp: bool,

        /// External evaluator program (default: built-in parser)
        #[arg(long)]
        evaluator: Option<String>,

        /// Timeout in seconds for one external evaluator invocation
        #[arg(long, default_value_t = 60)]
        evaluator_timeout: u64,

        /// Path to the database file
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// List recent update runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value_t = 10)]
        limit: i64,

        /// Path to the database file
        #[arg(long, default_value = DEFAULT_DB_PATH)]
        db_path: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}
