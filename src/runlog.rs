// src/runlog.rs

//! Free-text run log with prefix-derived counts
//!
//! Lines beginning with `WARNING:` or `ERROR:` are the sole mechanism by
//! which aggregate warning/error counts are derived from a run's log. The
//! prefixes are an external interface for anything that parses stored run
//! logs, so they are emitted verbatim here and nowhere else.

use tracing::{error, info, warn};

/// Accumulated log of one update run
#[derive(Debug, Default)]
pub struct RunLog {
    lines: Vec<String>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an informational line
    pub fn note(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        info!("{}", msg);
        self.lines.push(msg);
    }

    /// Record a warning line
    pub fn warn(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{}", msg);
        self.lines.push(format!("WARNING: {msg}"));
    }

    /// Record an error line
    pub fn error(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        error!("{}", msg);
        self.lines.push(format!("ERROR: {msg}"));
    }

    /// Count of warning lines, derived by prefix scan
    pub fn warnings(&self) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.starts_with("WARNING:"))
            .count() as i64
    }

    /// Count of error lines, derived by prefix scan
    pub fn errors(&self) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.starts_with("ERROR:"))
            .count() as i64
    }

    /// The full log text
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}
