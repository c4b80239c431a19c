// src/context.rs

//! Evaluation context construction
//!
//! A layer is evaluated against the configuration of every layer it depends
//! on. The builder resolves the declared dependency list recursively, loads
//! each dependency's layer configuration before the target layer's own (in
//! declaration order, so later layers override earlier ones), and returns a
//! context that is built once per layer update and reused for every file.

use crate::db::models::LayerBranch;
use crate::db::paths;
use crate::error::{Error, Result};
use rusqlite::Connection;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One resolved layer in dependency order
#[derive(Debug, Clone)]
pub struct LayerConfig {
    pub layer: String,
    /// On-disk layer root (clone directory joined with the layer subdir)
    pub root: PathBuf,
    pub conf_path: PathBuf,
}

/// The evaluation context for one layer update
#[derive(Debug, Clone)]
pub struct EvalContext {
    pub branch: String,
    /// Scratch directory for the evaluator; always passed explicitly, never
    /// ambient process state
    pub work_dir: PathBuf,
    /// Resolved layers, dependencies first, the target layer last
    pub layers: Vec<LayerConfig>,
    /// Merged configuration variables
    pub vars: BTreeMap<String, String>,
}

impl EvalContext {
    /// The layer this context was built for
    pub fn target(&self) -> &LayerConfig {
        self.layers.last().expect("context has at least one layer")
    }
}

/// Build the evaluation context for a layer branch
///
/// Fails with `MissingDependencyBranch` when a declared dependency has no
/// LayerBranch on the requested branch, with `DependencyCycle` when the
/// declared dependencies loop, and with a context error when a layer
/// configuration file cannot be read.
pub fn build_context(
    conn: &Connection,
    fetch_dir: &Path,
    target: &LayerBranch,
    work_dir: &Path,
) -> Result<EvalContext> {
    let mut layers = Vec::new();
    let mut vars = BTreeMap::new();
    let mut visiting = Vec::new();
    let mut done = HashSet::new();

    visit(
        conn,
        fetch_dir,
        target,
        &mut visiting,
        &mut done,
        &mut layers,
        &mut vars,
    )?;

    debug!(
        "Built context for {}/{} with {} layers",
        target.layer,
        target.branch,
        layers.len()
    );

    Ok(EvalContext {
        branch: target.branch.clone(),
        work_dir: work_dir.to_path_buf(),
        layers,
        vars,
    })
}

fn visit(
    conn: &Connection,
    fetch_dir: &Path,
    lb: &LayerBranch,
    visiting: &mut Vec<String>,
    done: &mut HashSet<String>,
    layers: &mut Vec<LayerConfig>,
    vars: &mut BTreeMap<String, String>,
) -> Result<()> {
    if done.contains(&lb.layer) {
        return Ok(());
    }
    if visiting.contains(&lb.layer) {
        return Err(Error::DependencyCycle(lb.layer.clone()));
    }
    visiting.push(lb.layer.clone());

    for dep in &lb.dependencies {
        let dep_lb = LayerBranch::find_by_layer_and_branch(conn, dep, &lb.branch)?.ok_or_else(
            || Error::MissingDependencyBranch {
                layer: dep.clone(),
                branch: lb.branch.clone(),
            },
        )?;
        visit(conn, fetch_dir, &dep_lb, visiting, done, layers, vars)?;
    }

    visiting.pop();

    let root = layer_root(fetch_dir, lb);
    let conf_path = root.join("conf").join("layer.conf");
    let content = fs::read_to_string(&conf_path).map_err(|e| {
        Error::ContextError(format!(
            "Cannot read layer configuration {}: {}",
            conf_path.display(),
            e
        ))
    })?;
    parse_conf_vars(&content, vars);

    layers.push(LayerConfig {
        layer: lb.layer.clone(),
        root,
        conf_path,
    });
    done.insert(lb.layer.clone());
    Ok(())
}

/// The on-disk root of a layer branch within the fetch directory
pub fn layer_root(fetch_dir: &Path, lb: &LayerBranch) -> PathBuf {
    let clone = paths::clone_dir(fetch_dir, &lb.vcs_url);
    if lb.vcs_subdir.is_empty() {
        clone
    } else {
        clone.join(&lb.vcs_subdir)
    }
}

/// Merge variable assignments from a layer configuration into `vars`
///
/// Understands `KEY = "v"`, `KEY ?= "v"` (keep an existing value), and
/// `KEY += "v"` (space-append). Anything else is ignored.
pub fn parse_conf_vars(content: &str, vars: &mut BTreeMap<String, String>) {
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, op, raw) = if let Some((key, rest)) = line.split_once("?=") {
            (key, "?=", rest)
        } else if let Some((key, rest)) = line.split_once("+=") {
            (key, "+=", rest)
        } else if let Some((key, rest)) = line.split_once('=') {
            (key, "=", rest)
        } else {
            continue;
        };

        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            continue;
        }
        let raw = raw.trim();
        let Some(value) = raw
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
        else {
            continue;
        };

        match op {
            "?=" => {
                vars.entry(key.to_string()).or_insert_with(|| value.to_string());
            }
            "+=" => {
                vars.entry(key.to_string())
                    .and_modify(|existing| {
                        existing.push(' ');
                        existing.push_str(value);
                    })
                    .or_insert_with(|| value.to_string());
            }
            _ => {
                vars.insert(key.to_string(), value.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use tempfile::TempDir;

    fn setup_layer(fetch_dir: &Path, lb: &LayerBranch, conf: &str) {
        let root = layer_root(fetch_dir, lb);
        fs::create_dir_all(root.join("conf")).unwrap();
        fs::write(root.join("conf").join("layer.conf"), conf).unwrap();
    }

    fn test_db() -> (TempDir, Connection) {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("index.db");
        let db_path = db_path.to_str().unwrap();
        db::init(db_path).unwrap();
        let conn = db::open(db_path).unwrap();
        (temp, conn)
    }

    #[test]
    fn test_parse_conf_vars_forms() {
        let mut vars = BTreeMap::new();
        parse_conf_vars(
            "# comment\nBBPATH = \"a\"\nBBPATH += \"b\"\nDEFAULT ?= \"x\"\nDEFAULT ?= \"y\"\nnot an assignment\n",
            &mut vars,
        );
        assert_eq!(vars.get("BBPATH").map(String::as_str), Some("a b"));
        assert_eq!(vars.get("DEFAULT").map(String::as_str), Some("x"));
    }

    #[test]
    fn test_parse_conf_vars_unquoted_ignored() {
        let mut vars = BTreeMap::new();
        parse_conf_vars("KEY = unquoted\n", &mut vars);
        assert!(vars.is_empty());
    }

    #[test]
    fn test_build_context_dependency_order() {
        let (temp, conn) = test_db();
        let fetch_dir = temp.path().join("fetch");

        let mut core = LayerBranch::new(
            "core".to_string(),
            "main".to_string(),
            "git://example.com/core".to_string(),
        );
        core.insert(&conn).unwrap();
        setup_layer(&fetch_dir, &core, "PRIORITY = \"core\"\nCORE = \"1\"\n");

        let mut extra = LayerBranch::new(
            "extra".to_string(),
            "main".to_string(),
            "git://example.com/extra".to_string(),
        );
        extra.dependencies = vec!["core".to_string()];
        extra.insert(&conn).unwrap();
        setup_layer(&fetch_dir, &extra, "PRIORITY = \"extra\"\n");

        let work = temp.path().join("work");
        let ctx = build_context(&conn, &fetch_dir, &extra, &work).unwrap();

        // Dependencies come first, the target layer last
        let order: Vec<&str> = ctx.layers.iter().map(|l| l.layer.as_str()).collect();
        assert_eq!(order, vec!["core", "extra"]);
        assert_eq!(ctx.target().layer, "extra");

        // Later layers override earlier ones
        assert_eq!(ctx.vars.get("PRIORITY").map(String::as_str), Some("extra"));
        assert_eq!(ctx.vars.get("CORE").map(String::as_str), Some("1"));
        assert_eq!(ctx.work_dir, work);
    }

    #[test]
    fn test_build_context_missing_dependency_branch() {
        let (temp, conn) = test_db();
        let fetch_dir = temp.path().join("fetch");

        let mut lb = LayerBranch::new(
            "extra".to_string(),
            "main".to_string(),
            "git://example.com/extra".to_string(),
        );
        lb.dependencies = vec!["absent".to_string()];
        lb.insert(&conn).unwrap();
        setup_layer(&fetch_dir, &lb, "PRIORITY = \"extra\"\n");

        let err = build_context(&conn, &fetch_dir, &lb, temp.path()).unwrap_err();
        match err {
            Error::MissingDependencyBranch { layer, branch } => {
                assert_eq!(layer, "absent");
                assert_eq!(branch, "main");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_build_context_cycle_detection() {
        let (temp, conn) = test_db();
        let fetch_dir = temp.path().join("fetch");

        let mut a = LayerBranch::new(
            "a".to_string(),
            "main".to_string(),
            "git://example.com/a".to_string(),
        );
        a.dependencies = vec!["b".to_string()];
        a.insert(&conn).unwrap();
        setup_layer(&fetch_dir, &a, "A = \"1\"\n");

        let mut b = LayerBranch::new(
            "b".to_string(),
            "main".to_string(),
            "git://example.com/b".to_string(),
        );
        b.dependencies = vec!["a".to_string()];
        b.insert(&conn).unwrap();
        setup_layer(&fetch_dir, &b, "B = \"1\"\n");

        let err = build_context(&conn, &fetch_dir, &a, temp.path()).unwrap_err();
        assert!(matches!(err, Error::DependencyCycle(_)));
    }

    #[test]
    fn test_build_context_missing_conf_is_context_error() {
        let (temp, conn) = test_db();
        let fetch_dir = temp.path().join("fetch");

        let mut lb = LayerBranch::new(
            "bare".to_string(),
            "main".to_string(),
            "git://example.com/bare".to_string(),
        );
        lb.insert(&conn).unwrap();
        // No conf/layer.conf on disk

        let err = build_context(&conn, &fetch_dir, &lb, temp.path()).unwrap_err();
        assert!(matches!(err, Error::ContextError(_)));
    }

    #[test]
    fn test_shared_dependency_loaded_once() {
        let (temp, conn) = test_db();
        let fetch_dir = temp.path().join("fetch");

        let mut core = LayerBranch::new(
            "core".to_string(),
            "main".to_string(),
            "git://example.com/core".to_string(),
        );
        core.insert(&conn).unwrap();
        setup_layer(&fetch_dir, &core, "CORE = \"1\"\n");

        let mut mid = LayerBranch::new(
            "mid".to_string(),
            "main".to_string(),
            "git://example.com/mid".to_string(),
        );
        mid.dependencies = vec!["core".to_string()];
        mid.insert(&conn).unwrap();
        setup_layer(&fetch_dir, &mid, "MID = \"1\"\n");

        let mut top = LayerBranch::new(
            "top".to_string(),
            "main".to_string(),
            "git://example.com/top".to_string(),
        );
        top.dependencies = vec!["core".to_string(), "mid".to_string()];
        top.insert(&conn).unwrap();
        setup_layer(&fetch_dir, &top, "TOP = \"1\"\n");

        let ctx = build_context(&conn, &fetch_dir, &top, temp.path()).unwrap();
        let order: Vec<&str> = ctx.layers.iter().map(|l| l.layer.as_str()).collect();
        assert_eq!(order, vec!["core", "mid", "top"]);
    }
}
