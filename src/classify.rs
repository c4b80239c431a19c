// src/classify.rs

//! File classification for layer metadata
//!
//! Maps a layer-relative path to its semantic kind using path and suffix
//! patterns. Classification is pure and deterministic; anything that does
//! not match a known pattern is simply not metadata - never an error, so
//! one unrecognized file can never fail a whole sync.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Semantic kind of a metadata file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Recipe,
    Append,
    Machine,
    Distro,
    BbClass,
    IncFile,
}

impl FileKind {
    pub fn as_str(&self) -> &str {
        match self {
            FileKind::Recipe => "recipe",
            FileKind::Append => "append",
            FileKind::Machine => "machine",
            FileKind::Distro => "distro",
            FileKind::BbClass => "bbclass",
            FileKind::IncFile => "incfile",
        }
    }

    /// Whether records of this kind are identified by declared name rather
    /// than by file path
    pub fn is_name_keyed(&self) -> bool {
        matches!(self, FileKind::Machine | FileKind::Distro | FileKind::BbClass)
    }
}

/// A classified metadata file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub kind: FileKind,
    /// Directory part of the path, relative to the layer root (may be empty)
    pub filepath: String,
    /// File name part of the path
    pub filename: String,
    /// Logical name: pn for recipes/appends, the definition name for
    /// machines/distros/classes, the full path for include files
    pub name: String,
}

/// Classify a layer-relative path
///
/// Returns None for anything that is not layer metadata.
pub fn classify(path: &str) -> Option<Classified> {
    let (filepath, filename) = split_path(path);
    let parts: Vec<&str> = path.split('/').collect();

    if let Some(stem) = filename.strip_suffix(".bb") {
        let (pn, _pv) = split_recipe_name(stem);
        return Some(Classified {
            kind: FileKind::Recipe,
            filepath: filepath.to_string(),
            filename: filename.to_string(),
            name: pn,
        });
    }

    if let Some(stem) = filename.strip_suffix(".bbappend") {
        let (pn, _pv) = split_recipe_name(stem);
        return Some(Classified {
            kind: FileKind::Append,
            filepath: filepath.to_string(),
            filename: filename.to_string(),
            name: pn,
        });
    }

    // conf/machine/<name>.conf and conf/distro/<name>.conf, exactly at that
    // depth; deeper .conf files (e.g. conf/machine/include/) are plain
    // include files
    if parts.len() == 3 && parts[0] == "conf" {
        if let Some(name) = filename.strip_suffix(".conf") {
            let kind = match parts[1] {
                "machine" => Some(FileKind::Machine),
                "distro" => Some(FileKind::Distro),
                _ => None,
            };
            if let Some(kind) = kind {
                return Some(Classified {
                    kind,
                    filepath: filepath.to_string(),
                    filename: filename.to_string(),
                    name: name.to_string(),
                });
            }
        }
    }

    if parts.len() == 2 && parts[0] == "classes" {
        if let Some(name) = filename.strip_suffix(".bbclass") {
            return Some(Classified {
                kind: FileKind::BbClass,
                filepath: filepath.to_string(),
                filename: filename.to_string(),
                name: name.to_string(),
            });
        }
    }

    // Remaining .inc and .conf files are textual-inclusion targets
    if filename.ends_with(".inc") || filename.ends_with(".conf") {
        return Some(Classified {
            kind: FileKind::IncFile,
            filepath: filepath.to_string(),
            filename: filename.to_string(),
            name: path.to_string(),
        });
    }

    None
}

/// Split a recipe file stem into (pn, pv) on the first underscore
///
/// A stem with no version part gets the conventional default of 1.0; the
/// evaluator's PV wins over this when present.
pub fn split_recipe_name(stem: &str) -> (String, String) {
    match stem.split_once('_') {
        Some((pn, pv)) => (pn.to_string(), pv.to_string()),
        None => (stem.to_string(), "1.0".to_string()),
    }
}

/// Split a relative path into (directory, file name)
fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", path),
    }
}

/// Read the description header from a machine or distro conf file
///
/// Definitions conventionally carry a `#@DESCRIPTION:` comment line near
/// the top; the first one found wins.
pub fn conf_description(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    for line in BufReader::new(file).lines() {
        let line = line.ok()?;
        if let Some(rest) = line.strip_prefix("#@DESCRIPTION:") {
            return Some(rest.trim().to_string());
        }
    }
    None
}
