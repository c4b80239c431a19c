// src/main.rs

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Cancellation token shared with the SIGINT handler
///
/// The handler only sets the flag; everything downstream receives the token
/// explicitly and checks it at defined points.
static CANCEL: OnceLock<Arc<AtomicBool>> = OnceLock::new();

extern "C" fn handle_sigint(_signal: libc::c_int) {
    if let Some(token) = CANCEL.get() {
        token.store(true, Ordering::SeqCst);
    }
}

fn install_cancel_token() -> Arc<AtomicBool> {
    let token = CANCEL
        .get_or_init(|| Arc::new(AtomicBool::new(false)))
        .clone();
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
    }
    token
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber for logging
    let default_level = if cli.debug {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Some(Commands::Init { db_path }) => {
            commands::init(&db_path)?;
            Ok(0)
        }
        Some(Commands::AddLayer {
            layer,
            vcs_url,
            branch,
            subdir,
            actual_branch,
            dependencies,
            db_path,
        }) => {
            commands::add_layer(
                &layer,
                &vcs_url,
                &branch,
                &subdir,
                actual_branch,
                dependencies,
                &db_path,
            )?;
            Ok(0)
        }
        Some(Commands::ListLayers { db_path }) => {
            commands::list_layers(&db_path)?;
            Ok(0)
        }
        Some(Commands::Update {
            branch,
            layer,
            reload,
            full_reload,
            dry_run,
            no_fetch,
            no_checkout,
            stop_on_error,
            keep_temp,
            evaluator,
            evaluator_timeout,
            db_path,
        }) => {
            let cancel = install_cancel_token();
            commands::update(
                branch,
                layer,
                reload,
                full_reload,
                dry_run,
                no_fetch,
                no_checkout,
                stop_on_error,
                keep_temp,
                evaluator,
                evaluator_timeout,
                &db_path,
                cancel,
            )
        }
        Some(Commands::Runs { limit, db_path }) => {
            commands::runs(limit, &db_path)?;
            Ok(0)
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(0)
        }
        None => {
            Cli::command().print_help()?;
            Ok(0)
        }
    }
}
