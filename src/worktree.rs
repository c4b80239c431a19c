// src/worktree.rs

//! Working-tree inspection
//!
//! Classifies what changed in a layer between two revisions (or lists the
//! whole tree for a full sync), restricted to the layer's subdirectory.
//! Also provides the thin fetch/checkout helpers the orchestrator uses to
//! bring the shared clone to the branch tip.
//!
//! Normalization rules the reconciler depends on:
//! - a rename whose new path leaves the layer subdirectory is reported as a
//!   deletion (and one entering it as an addition)
//! - a rename that crosses metadata kinds is reported as delete+add, since
//!   the two kinds have disjoint identity keys
//! - paths under a nested directory carrying its own layer marker
//!   (conf/layer.conf) belong to that sub-layer and are excluded entirely

use crate::classify;
use crate::error::Result;
use chrono::{DateTime, TimeZone, Utc};
use git2::{Delta, DiffFindOptions, DiffOptions, ObjectType, Repository};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;

/// A classified set of changes within one layer
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub deleted: Vec<String>,
    pub modified: Vec<String>,
    pub renamed: Vec<(String, String)>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.deleted.is_empty()
            && self.modified.is_empty()
            && self.renamed.is_empty()
    }

    /// Every layer-relative path touched by this change set, old and new
    /// sides of renames included
    pub fn all_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        paths.extend(self.added.iter().cloned());
        paths.extend(self.deleted.iter().cloned());
        paths.extend(self.modified.iter().cloned());
        for (old, new) in &self.renamed {
            paths.push(old.clone());
            paths.push(new.clone());
        }
        paths
    }
}

/// Compute the classified change set for a layer between two revisions
///
/// All returned paths are relative to the layer root (the repository root
/// joined with `subdir`).
pub fn changes_between(
    repo: &Repository,
    subdir: &str,
    from_rev: &str,
    to_rev: &str,
) -> Result<ChangeSet> {
    let old_tree = repo.revparse_single(from_rev)?.peel_to_tree()?;
    let new_tree = repo.revparse_single(to_rev)?.peel_to_tree()?;

    let mut opts = DiffOptions::new();
    opts.include_typechange(true);
    let mut diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), Some(&mut opts))?;

    let mut find_opts = DiffFindOptions::new();
    find_opts.renames(true);
    diff.find_similar(Some(&mut find_opts))?;

    let workdir = repo
        .workdir()
        .ok_or_else(|| crate::error::Error::InitError("Repository has no working tree".into()))?;
    let layer_root = if subdir.is_empty() {
        workdir.to_path_buf()
    } else {
        workdir.join(subdir)
    };
    let sublayers = sublayer_roots(&layer_root);

    let mut changes = ChangeSet::default();
    for delta in diff.deltas() {
        let old_rel = delta
            .old_file()
            .path()
            .and_then(|p| layer_relative(p, subdir))
            .filter(|p| !in_sublayer(p, &sublayers));
        let new_rel = delta
            .new_file()
            .path()
            .and_then(|p| layer_relative(p, subdir))
            .filter(|p| !in_sublayer(p, &sublayers));

        match delta.status() {
            Delta::Added | Delta::Copied => {
                if let Some(path) = new_rel {
                    changes.added.push(path);
                }
            }
            Delta::Deleted => {
                if let Some(path) = old_rel {
                    changes.deleted.push(path);
                }
            }
            Delta::Modified | Delta::Typechange => {
                if let Some(path) = new_rel {
                    changes.modified.push(path);
                }
            }
            Delta::Renamed => match (old_rel, new_rel) {
                (Some(old), Some(new)) => {
                    let old_kind = classify::classify(&old).map(|c| c.kind);
                    let new_kind = classify::classify(&new).map(|c| c.kind);
                    if old_kind.is_some() && old_kind == new_kind {
                        changes.renamed.push((old, new));
                    } else {
                        // Disjoint identity keys: never a same-kind rename
                        changes.deleted.push(old);
                        changes.added.push(new);
                    }
                }
                (Some(old), None) => changes.deleted.push(old),
                (None, Some(new)) => changes.added.push(new),
                (None, None) => {}
            },
            _ => {
                debug!("Ignoring diff delta with status {:?}", delta.status());
            }
        }
    }

    Ok(changes)
}

/// List every file currently under the layer root, sorted
///
/// This is the full-listing mode used for initial and forced-full syncs.
/// The .git directory and any sub-layer trees are excluded.
pub fn list_layer_files(worktree: &Path, subdir: &str) -> Result<Vec<String>> {
    let layer_root = if subdir.is_empty() {
        worktree.to_path_buf()
    } else {
        worktree.join(subdir)
    };
    let sublayers = sublayer_roots(&layer_root);

    let mut files = Vec::new();
    for entry in WalkDir::new(&layer_root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
    {
        let entry = entry.map_err(|e| crate::error::Error::IoError(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(&layer_root)
            .map_err(|e| crate::error::Error::IoError(e.to_string()))?;
        let Some(rel) = rel.to_str() else {
            debug!("Skipping non-UTF8 path {:?}", rel);
            continue;
        };
        if in_sublayer(rel, &sublayers) {
            continue;
        }
        files.push(rel.to_string());
    }

    files.sort();
    Ok(files)
}

/// Find nested directories under the layer root that carry their own layer
/// marker (conf/layer.conf)
///
/// Returned paths are relative to the layer root. Such directories are
/// independently tracked layers and must not be reconciled by the parent.
pub fn sublayer_roots(layer_root: &Path) -> Vec<String> {
    let mut roots = Vec::new();
    for entry in WalkDir::new(layer_root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .flatten()
    {
        if !entry.file_type().is_file() || entry.file_name() != "layer.conf" {
            continue;
        }
        let Some(conf_dir) = entry.path().parent() else {
            continue;
        };
        if conf_dir.file_name().map(|n| n != "conf").unwrap_or(true) {
            continue;
        }
        let Some(marker_root) = conf_dir.parent() else {
            continue;
        };
        if marker_root == layer_root {
            continue;
        }
        if let Ok(rel) = marker_root.strip_prefix(layer_root) {
            if let Some(rel) = rel.to_str() {
                roots.push(rel.to_string());
            }
        }
    }
    roots
}

/// Fetch a branch from the origin remote
pub fn fetch_origin(repo: &Repository, branch: &str) -> Result<()> {
    let mut remote = repo.find_remote("origin")?;
    remote.fetch(&[branch], None, None)?;
    Ok(())
}

/// Check out the tip of a branch (detached), preferring the remote-tracking
/// ref over a local branch of the same name
pub fn checkout_branch(repo: &Repository, branch: &str) -> Result<()> {
    let object = repo
        .revparse_single(&format!("origin/{branch}"))
        .or_else(|_| repo.revparse_single(branch))?;
    let commit = object.peel(ObjectType::Commit)?;

    repo.checkout_tree(&commit, Some(git2::build::CheckoutBuilder::default().force()))?;
    repo.set_head_detached(commit.id())?;
    Ok(())
}

/// The current HEAD revision id and its commit timestamp
pub fn head_revision(repo: &Repository) -> Result<(String, String)> {
    let commit = repo.head()?.peel_to_commit()?;

    let dt: DateTime<Utc> = Utc
        .timestamp_opt(commit.time().seconds(), 0)
        .single()
        .unwrap_or_default();

    Ok((commit.id().to_string(), dt.to_rfc3339()))
}

/// Make a repository-relative path layer-relative, or None when it falls
/// outside the layer subdirectory
fn layer_relative(path: &Path, subdir: &str) -> Option<String> {
    let path = path.to_str()?;
    if subdir.is_empty() {
        return Some(path.to_string());
    }
    path.strip_prefix(subdir)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(|rest| rest.to_string())
}

fn in_sublayer(rel: &str, sublayers: &[String]) -> bool {
    sublayers
        .iter()
        .any(|root| rel.len() > root.len() && rel.starts_with(root) && rel.as_bytes()[root.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use std::fs;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) -> Repository {
        Repository::init(dir).unwrap()
    }

    fn write_file(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn commit_all(repo: &Repository, message: &str) -> String {
        let mut index = repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        // add_all does not pick up deletions
        index
            .update_all(["*"].iter(), None)
            .unwrap();
        index.write().unwrap();

        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();

        let parents = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
            .to_string()
    }

    #[test]
    fn test_changes_classification() {
        let temp = TempDir::new().unwrap();
        let repo = init_repo(temp.path());

        write_file(temp.path(), "recipes/foo/foo_1.0.bb", "SUMMARY = \"foo\"\n");
        write_file(temp.path(), "recipes/bar/bar_2.0.bb", "SUMMARY = \"bar\"\n");
        let rev1 = commit_all(&repo, "initial");

        write_file(temp.path(), "recipes/baz/baz_1.0.bb", "SUMMARY = \"baz\"\n");
        write_file(temp.path(), "recipes/foo/foo_1.0.bb", "SUMMARY = \"foo2\"\n");
        fs::remove_file(temp.path().join("recipes/bar/bar_2.0.bb")).unwrap();
        let rev2 = commit_all(&repo, "change");

        let changes = changes_between(&repo, "", &rev1, &rev2).unwrap();
        assert_eq!(changes.added, vec!["recipes/baz/baz_1.0.bb".to_string()]);
        assert_eq!(changes.deleted, vec!["recipes/bar/bar_2.0.bb".to_string()]);
        assert_eq!(changes.modified, vec!["recipes/foo/foo_1.0.bb".to_string()]);
        assert!(changes.renamed.is_empty());
    }

    #[test]
    fn test_same_kind_rename_is_detected() {
        let temp = TempDir::new().unwrap();
        let repo = init_repo(temp.path());

        let content = "SUMMARY = \"foo\"\nLICENSE = \"MIT\"\nHOMEPAGE = \"https://example.com\"\n";
        write_file(temp.path(), "recipes/foo/foo_1.0.bb", content);
        let rev1 = commit_all(&repo, "initial");

        fs::remove_file(temp.path().join("recipes/foo/foo_1.0.bb")).unwrap();
        write_file(temp.path(), "recipes/foo/foo_1.1.bb", content);
        let rev2 = commit_all(&repo, "rename");

        let changes = changes_between(&repo, "", &rev1, &rev2).unwrap();
        assert_eq!(
            changes.renamed,
            vec![(
                "recipes/foo/foo_1.0.bb".to_string(),
                "recipes/foo/foo_1.1.bb".to_string()
            )]
        );
        assert!(changes.added.is_empty());
        assert!(changes.deleted.is_empty());
    }

    #[test]
    fn test_cross_kind_rename_is_delete_plus_add() {
        let temp = TempDir::new().unwrap();
        let repo = init_repo(temp.path());

        let content = "SUMMARY = \"shared bits\"\nLICENSE = \"MIT\"\nDEPENDS = \"zlib\"\n";
        write_file(temp.path(), "recipes/foo/foo.inc", content);
        let rev1 = commit_all(&repo, "initial");

        fs::remove_file(temp.path().join("recipes/foo/foo.inc")).unwrap();
        write_file(temp.path(), "recipes/foo/foo_1.0.bb", content);
        let rev2 = commit_all(&repo, "convert to recipe");

        let changes = changes_between(&repo, "", &rev1, &rev2).unwrap();
        assert!(changes.renamed.is_empty());
        assert_eq!(changes.deleted, vec!["recipes/foo/foo.inc".to_string()]);
        assert_eq!(changes.added, vec!["recipes/foo/foo_1.0.bb".to_string()]);
    }

    #[test]
    fn test_rename_out_of_subdir_is_deletion() {
        let temp = TempDir::new().unwrap();
        let repo = init_repo(temp.path());

        let content = "SUMMARY = \"foo\"\nLICENSE = \"MIT\"\nDEPENDS = \"zlib openssl\"\n";
        write_file(temp.path(), "meta-a/recipes/foo_1.0.bb", content);
        let rev1 = commit_all(&repo, "initial");

        fs::remove_file(temp.path().join("meta-a/recipes/foo_1.0.bb")).unwrap();
        write_file(temp.path(), "meta-b/recipes/foo_1.0.bb", content);
        let rev2 = commit_all(&repo, "move to other layer");

        let changes = changes_between(&repo, "meta-a", &rev1, &rev2).unwrap();
        assert_eq!(changes.deleted, vec!["recipes/foo_1.0.bb".to_string()]);
        assert!(changes.added.is_empty());
        assert!(changes.renamed.is_empty());

        // From the other side it is an addition
        let changes = changes_between(&repo, "meta-b", &rev1, &rev2).unwrap();
        assert_eq!(changes.added, vec!["recipes/foo_1.0.bb".to_string()]);
        assert!(changes.deleted.is_empty());
    }

    #[test]
    fn test_sublayer_paths_are_excluded() {
        let temp = TempDir::new().unwrap();
        let repo = init_repo(temp.path());

        write_file(temp.path(), "conf/layer.conf", "BBPATH .= \":${LAYERDIR}\"\n");
        let rev1 = commit_all(&repo, "initial");

        write_file(
            temp.path(),
            "meta-nested/conf/layer.conf",
            "BBPATH .= \":${LAYERDIR}\"\n",
        );
        write_file(
            temp.path(),
            "meta-nested/recipes/inner_1.0.bb",
            "SUMMARY = \"inner\"\n",
        );
        write_file(temp.path(), "recipes/outer_1.0.bb", "SUMMARY = \"outer\"\n");
        let rev2 = commit_all(&repo, "add nested layer");

        let changes = changes_between(&repo, "", &rev1, &rev2).unwrap();
        assert_eq!(changes.added, vec!["recipes/outer_1.0.bb".to_string()]);

        let files = list_layer_files(temp.path(), "").unwrap();
        assert!(files.contains(&"recipes/outer_1.0.bb".to_string()));
        assert!(files.contains(&"conf/layer.conf".to_string()));
        assert!(!files.iter().any(|f| f.starts_with("meta-nested/")));
    }

    #[test]
    fn test_list_layer_files_sorted_and_subdir() {
        let temp = TempDir::new().unwrap();
        write_file(temp.path(), "meta-a/recipes/b_1.0.bb", "b");
        write_file(temp.path(), "meta-a/recipes/a_1.0.bb", "a");
        write_file(temp.path(), "meta-b/recipes/c_1.0.bb", "c");

        let files = list_layer_files(temp.path(), "meta-a").unwrap();
        assert_eq!(
            files,
            vec![
                "recipes/a_1.0.bb".to_string(),
                "recipes/b_1.0.bb".to_string()
            ]
        );
    }

    #[test]
    fn test_head_revision() {
        let temp = TempDir::new().unwrap();
        let repo = init_repo(temp.path());
        write_file(temp.path(), "a.txt", "a");
        let rev = commit_all(&repo, "initial");

        let (head, commit_time) = head_revision(&repo).unwrap();
        assert_eq!(head, rev);
        assert!(commit_time.contains('T'));
    }
}
