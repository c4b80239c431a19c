// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

use git2::{Repository, Signature};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use strata::db::models::LayerBranch;
use strata::db::paths;
use strata::evaluator::NativeEvaluator;
use strata::update::{LayerUpdater, UpdateOptions, UpdateSummary};
use strata::{Result, db};
use tempfile::TempDir;

/// A temp database plus a fetch directory of layer repositories.
///
/// Keep the fixture alive for the duration of the test to prevent cleanup.
pub struct IndexFixture {
    pub temp: TempDir,
    pub db_path: String,
}

impl IndexFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let db_path = temp
            .path()
            .join("index.db")
            .to_str()
            .unwrap()
            .to_string();
        db::init(&db_path).unwrap();
        Self { temp, db_path }
    }

    pub fn conn(&self) -> rusqlite::Connection {
        db::open(&self.db_path).unwrap()
    }

    pub fn fetch_dir(&self) -> PathBuf {
        self.temp.path().join("fetch")
    }

    /// Register a layer on branch master and create its clone as a git
    /// repository with a committed conf/layer.conf
    pub fn add_layer(&self, name: &str, dependencies: &[&str]) -> TestLayer {
        let url = format!("git://example.com/{name}");
        let conn = self.conn();
        let mut lb = LayerBranch::new(name.to_string(), "master".to_string(), url.clone());
        lb.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        lb.insert(&conn).unwrap();

        let root = paths::clone_dir(&self.fetch_dir(), &url);
        fs::create_dir_all(&root).unwrap();
        let repo = Repository::init(&root).unwrap();

        let layer = TestLayer { repo, root };
        layer.write("conf/layer.conf", "BBPATH = \"${LAYERDIR}\"\n");
        layer.commit("add layer.conf");
        layer
    }

    pub fn layerbranch(&self, name: &str) -> LayerBranch {
        LayerBranch::find_by_layer_and_branch(&self.conn(), name, "master")
            .unwrap()
            .unwrap()
    }

    /// Run an update with the default offline options
    pub fn update(&self) -> Result<UpdateSummary> {
        self.update_with(default_options())
    }

    pub fn update_with(&self, options: UpdateOptions) -> Result<UpdateSummary> {
        let mut conn = self.conn();
        let evaluator = NativeEvaluator;
        let mut updater = LayerUpdater::new(&mut conn, self.fetch_dir(), &evaluator, options);
        updater.run()
    }

    pub fn update_cancelled(&self, cancel: Arc<AtomicBool>) -> Result<UpdateSummary> {
        let mut conn = self.conn();
        let evaluator = NativeEvaluator;
        let mut updater =
            LayerUpdater::new(&mut conn, self.fetch_dir(), &evaluator, default_options())
                .with_cancel(cancel);
        updater.run()
    }
}

/// Offline options: the fixture repos have no remotes, so fetch and
/// checkout are skipped and HEAD is read as-is
pub fn default_options() -> UpdateOptions {
    UpdateOptions {
        no_fetch: true,
        no_checkout: true,
        ..UpdateOptions::default()
    }
}

/// One layer's git repository in the fetch directory
pub struct TestLayer {
    pub repo: Repository,
    pub root: PathBuf,
}

impl TestLayer {
    pub fn write(&self, rel: &str, content: &str) {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.root.join(rel)).unwrap();
    }

    pub fn rename(&self, from: &str, to: &str) {
        let to_path = self.root.join(to);
        fs::create_dir_all(to_path.parent().unwrap()).unwrap();
        fs::rename(self.root.join(from), to_path).unwrap();
    }

    pub fn commit(&self, message: &str) -> String {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.update_all(["*"].iter(), None).unwrap();
        index.write().unwrap();

        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("Test", "test@example.com").unwrap();

        let parents = match self.repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();

        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
            .to_string()
    }
}
