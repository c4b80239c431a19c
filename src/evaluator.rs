// src/evaluator.rs

//! Metadata evaluator adapter
//!
//! Evaluating a recipe file against a layer context yields a normalized
//! attribute record plus the set of other files the evaluation consulted
//! (the file-dependency set). Two implementations are provided:
//!
//! - `NativeEvaluator` parses the metadata file directly and is the default
//! - `ProcessEvaluator` invokes an external interpreter with a bounded wait
//!
//! Failure modes are split: a parse error is isolated to the one file,
//! while an environment error means the context itself is broken and aborts
//! the whole layer run.

use crate::classify::split_recipe_name;
use crate::context::EvalContext;
use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use wait_timeout::ChildExt;

/// Default timeout for an external evaluator invocation (60 seconds)
pub const DEFAULT_EVAL_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from evaluating one metadata file
#[derive(Error, Debug)]
pub enum EvalError {
    /// Malformed metadata; isolated to this one file
    #[error("parse error: {0}")]
    Parse(String),
    /// The evaluation context itself is broken; fatal to the layer run
    #[error("environment error: {0}")]
    Environment(String),
}

/// Normalized attribute record produced by evaluating one recipe
#[derive(Debug, Clone, Default)]
pub struct EvaluatedRecipe {
    pub pn: String,
    pub pv: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub section: Option<String>,
    pub license: Option<String>,
    pub homepage: Option<String>,
    pub provides: Vec<String>,
    pub depends: Vec<String>,
    pub inherits: Vec<String>,
    pub src_uris: Vec<String>,
    /// Layer-relative paths of files consulted during evaluation
    pub file_depends: Vec<String>,
}

/// The seam between the reconciler and whatever evaluates metadata
pub trait MetadataEvaluator {
    fn evaluate(
        &self,
        path: &Path,
        ctx: &EvalContext,
    ) -> std::result::Result<EvaluatedRecipe, EvalError>;
}

/// Built-in evaluator that parses the metadata file directly
///
/// Understands the assignment grammar of layer configuration files plus the
/// `inherit`, `include`, and `require` directives; each directive
/// contributes a file dependency (inherits resolve to
/// `classes/<name>.bbclass`). No variable expansion is performed.
#[derive(Debug, Default)]
pub struct NativeEvaluator;

impl MetadataEvaluator for NativeEvaluator {
    fn evaluate(
        &self,
        path: &Path,
        _ctx: &EvalContext,
    ) -> std::result::Result<EvaluatedRecipe, EvalError> {
        let content = fs::read_to_string(path)
            .map_err(|e| EvalError::Parse(format!("cannot read {}: {}", path.display(), e)))?;

        let mut vars = Vec::new();
        let mut inherits = Vec::new();
        let mut file_depends = Vec::new();

        for (lineno, line) in joined_lines(&content).into_iter().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix("inherit ") {
                for class in rest.split_whitespace() {
                    inherits.push(class.to_string());
                    file_depends.push(format!("classes/{class}.bbclass"));
                }
                continue;
            }
            if let Some(rest) = line
                .strip_prefix("include ")
                .or_else(|| line.strip_prefix("require "))
            {
                let target = rest.trim();
                if !target.is_empty() {
                    file_depends.push(target.to_string());
                }
                continue;
            }

            if let Some((key, value)) = parse_assignment(line, lineno + 1)? {
                vars.push((key, value));
            }
        }

        Ok(build_record(path, vars, inherits, file_depends))
    }
}

/// Evaluator backed by an external interpreter process
///
/// The interpreter is invoked with the file path as its argument, the
/// merged context variables in its environment, and the context work
/// directory as its working directory. It is expected to print
/// `KEY="value"` lines on stdout.
pub struct ProcessEvaluator {
    program: String,
    timeout: Duration,
}

impl ProcessEvaluator {
    pub fn new(program: String) -> Self {
        Self {
            program,
            timeout: DEFAULT_EVAL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl MetadataEvaluator for ProcessEvaluator {
    fn evaluate(
        &self,
        path: &Path,
        ctx: &EvalContext,
    ) -> std::result::Result<EvaluatedRecipe, EvalError> {
        debug!("Evaluating {} via {}", path.display(), self.program);

        let layer_path = ctx
            .layers
            .iter()
            .map(|l| l.root.display().to_string())
            .collect::<Vec<_>>()
            .join(":");

        let mut child = Command::new(&self.program)
            .arg(path)
            .current_dir(&ctx.work_dir)
            .envs(ctx.vars.iter())
            .env("STRATA_BRANCH", &ctx.branch)
            .env("STRATA_LAYER_PATH", layer_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EvalError::Environment(format!("failed to spawn evaluator {}: {}", self.program, e))
            })?;

        // Wait with timeout
        match child
            .wait_timeout(self.timeout)
            .map_err(|e| EvalError::Environment(format!("failed to wait for evaluator: {e}")))?
        {
            Some(status) => {
                let output = child
                    .wait_with_output()
                    .map_err(|e| EvalError::Environment(format!("failed to collect output: {e}")))?;
                let stdout = String::from_utf8_lossy(&output.stdout);

                if !status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(EvalError::Parse(format!(
                        "evaluator exited with {} for {}: {}",
                        status.code().unwrap_or(-1),
                        path.display(),
                        stderr.trim()
                    )));
                }

                let mut vars = Vec::new();
                for line in stdout.lines() {
                    if let Some((key, value)) = parse_output_line(line) {
                        vars.push((key, value));
                    }
                }

                let mut inherits = Vec::new();
                let mut file_depends = Vec::new();
                for (key, value) in &vars {
                    match key.as_str() {
                        "INHERITS" => {
                            inherits = split_list(value);
                        }
                        "FILE_DEPENDS" => {
                            file_depends = split_list(value);
                        }
                        _ => {}
                    }
                }

                Ok(build_record(path, vars, inherits, file_depends))
            }
            None => {
                let _ = child.kill();
                Err(EvalError::Parse(format!(
                    "evaluator timed out after {:?} for {}",
                    self.timeout,
                    path.display()
                )))
            }
        }
    }
}

/// Assemble an attribute record from raw variables, falling back to the
/// filename split for a missing PN/PV
fn build_record(
    path: &Path,
    vars: Vec<(String, String)>,
    inherits: Vec<String>,
    mut file_depends: Vec<String>,
) -> EvaluatedRecipe {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let (default_pn, default_pv) = split_recipe_name(stem);

    let mut record = EvaluatedRecipe {
        pn: default_pn,
        pv: default_pv,
        inherits,
        ..Default::default()
    };

    for (key, value) in vars {
        match key.as_str() {
            "PN" => record.pn = value,
            "PV" => record.pv = value,
            "SUMMARY" => record.summary = Some(value),
            "DESCRIPTION" => record.description = Some(value),
            "SECTION" => record.section = Some(value),
            "LICENSE" => record.license = Some(value),
            "HOMEPAGE" => record.homepage = Some(value),
            "PROVIDES" => record.provides = split_list(&value),
            "DEPENDS" => record.depends = split_list(&value),
            "SRC_URI" => record.src_uris = split_list(&value),
            _ => {}
        }
    }

    file_depends.sort();
    file_depends.dedup();
    record.file_depends = file_depends;
    record
}

/// Parse one `KEY = "value"` style assignment; unterminated quotes are a
/// parse error, anything non-assignment is ignored
fn parse_assignment(
    line: &str,
    lineno: usize,
) -> std::result::Result<Option<(String, String)>, EvalError> {
    let (key, raw) = if let Some((key, rest)) = line.split_once("?=") {
        (key, rest)
    } else if let Some((key, rest)) = line.split_once("+=") {
        (key, rest)
    } else if let Some((key, rest)) = line.split_once('=') {
        (key, rest)
    } else {
        return Ok(None);
    };

    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return Ok(None);
    }

    let raw = raw.trim();
    if let Some(inner) = raw.strip_prefix('"') {
        match inner.strip_suffix('"') {
            Some(value) => Ok(Some((key.to_string(), value.to_string()))),
            None => Err(EvalError::Parse(format!(
                "unterminated quote at line {lineno}"
            ))),
        }
    } else {
        Ok(None)
    }
}

/// Parse one `KEY="value"` evaluator output line
fn parse_output_line(line: &str) -> Option<(String, String)> {
    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    let value = raw.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some((key.to_string(), value.to_string()))
}

/// Join backslash-continued lines
fn joined_lines(content: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut pending: Option<String> = None;
    for line in content.lines() {
        let mut current = pending.take().unwrap_or_default();
        if let Some(stripped) = line.strip_suffix('\\') {
            current.push_str(stripped);
            pending = Some(current);
        } else {
            current.push_str(line);
            out.push(current);
        }
    }
    if let Some(rest) = pending {
        out.push(rest);
    }
    out
}

fn split_list(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}
