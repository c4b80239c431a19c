// tests/sync_integration.rs

//! End-to-end synchronization tests driving the orchestrator against real
//! git repositories.

mod common;

use common::{IndexFixture, default_options};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use strata::Error;
use strata::db::models::{
    BbAppend, BbClass, Distro, FileDependency, IncFile, Machine, Recipe, UpdateRun,
};
use strata::update::RETCODE_INTERRUPTED;

#[test]
fn initial_sync_builds_recipe_class_and_dependency_edge() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);

    layer.write(
        "recipes/a/foo_1.0.bb",
        "SUMMARY = \"The foo package\"\nLICENSE = \"MIT\"\ninherit bar\n",
    );
    layer.write("classes/bar.bbclass", "# shared build logic\n");
    layer.commit("add foo and bar");

    let summary = fix.update().unwrap();
    assert_eq!(summary.retcode, 0);
    assert_eq!(summary.layers_updated, 1);

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-test").id.unwrap();

    let recipes = Recipe::list_for_layerbranch(&conn, lb_id).unwrap();
    assert_eq!(recipes.len(), 1);
    let foo = &recipes[0];
    assert_eq!(foo.pn, "foo");
    assert_eq!(foo.pv, "1.0");
    assert_eq!(foo.summary.as_deref(), Some("The foo package"));
    assert_eq!(foo.inherits, vec!["bar"]);

    let classes = BbClass::list_for_layerbranch(&conn, lb_id).unwrap();
    assert_eq!(classes.len(), 1);
    assert_eq!(classes[0].name, "bar");

    let deps = FileDependency::list_for_recipe(&conn, foo.id.unwrap()).unwrap();
    assert!(deps.iter().any(|d| d.path == "classes/bar.bbclass"));
}

#[test]
fn class_change_reevaluates_dependent_recipe() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);

    layer.write(
        "recipes/a/foo_1.0.bb",
        "SUMMARY = \"foo\"\ninherit bar\n",
    );
    layer.write("classes/bar.bbclass", "# v1\n");
    layer.commit("initial");
    fix.update().unwrap();

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-test").id.unwrap();
    let before = Recipe::list_for_layerbranch(&conn, lb_id).unwrap()[0].clone();

    // Only the class file changes; no diff touches foo's own file
    layer.write("classes/bar.bbclass", "# v2\n");
    layer.commit("touch class only");

    let summary = fix.update().unwrap();
    assert_eq!(summary.counts.evaluated, 1);

    let after = Recipe::find_by_id(&conn, before.id.unwrap())
        .unwrap()
        .unwrap();
    assert!(after.updated > before.updated);
}

#[test]
fn full_sync_twice_is_idempotent() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);

    layer.write("recipes/a/foo_1.0.bb", "SUMMARY = \"foo\"\n");
    layer.write("conf/machine/qemux86.conf", "#@DESCRIPTION: Emulated x86\n");
    layer.write("conf/distro/tiny.conf", "#@DESCRIPTION: Tiny distro\n");
    layer.write("classes/bar.bbclass", "# class\n");
    layer.write("recipes/a/foo.inc", "# shared\n");
    layer.write("recipes/a/foo_1.0.bbappend", "# append\n");
    layer.commit("initial");

    fix.update().unwrap();

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-test").id.unwrap();
    let recipes_before: Vec<_> = Recipe::list_for_layerbranch(&conn, lb_id)
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.full_path(), r.pn, r.pv))
        .collect();

    // No tree change; force a second full pass past the watermark
    let mut options = default_options();
    options.reload = true;
    let summary = fix.update_with(options).unwrap();

    assert_eq!(summary.counts.added, 0);
    assert_eq!(summary.counts.deleted, 0);

    let recipes_after: Vec<_> = Recipe::list_for_layerbranch(&conn, lb_id)
        .unwrap()
        .into_iter()
        .map(|r| (r.id, r.full_path(), r.pn, r.pv))
        .collect();
    assert_eq!(recipes_before, recipes_after);
    assert_eq!(Machine::list_for_layerbranch(&conn, lb_id).unwrap().len(), 1);
    assert_eq!(Distro::list_for_layerbranch(&conn, lb_id).unwrap().len(), 1);
    assert_eq!(BbClass::list_for_layerbranch(&conn, lb_id).unwrap().len(), 1);
    assert_eq!(
        BbAppend::list_for_layerbranch(&conn, lb_id).unwrap().len(),
        1
    );
}

#[test]
fn rename_preserves_record_identity() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);

    let content = "SUMMARY = \"foo\"\nLICENSE = \"MIT\"\nHOMEPAGE = \"https://example.com\"\n";
    layer.write("recipes/a/foo_1.0.bb", content);
    layer.commit("initial");
    fix.update().unwrap();

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-test").id.unwrap();
    let original = Recipe::find_by_path(&conn, lb_id, "recipes/a", "foo_1.0.bb")
        .unwrap()
        .unwrap();

    // Identical content moved to a new directory: a same-kind rename
    layer.rename("recipes/a/foo_1.0.bb", "recipes/moved/foo_1.0.bb");
    layer.commit("move foo");
    fix.update().unwrap();

    let moved = Recipe::find_by_path(&conn, lb_id, "recipes/moved", "foo_1.0.bb")
        .unwrap()
        .unwrap();
    assert_eq!(moved.id, original.id);
    assert!(
        Recipe::find_by_path(&conn, lb_id, "recipes/a", "foo_1.0.bb")
            .unwrap()
            .is_none()
    );
}

#[test]
fn upgrade_preserves_identity_across_full_reload() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);

    layer.write("recipes/a/foo_1.0.bb", "SUMMARY = \"foo\"\n");
    layer.commit("initial");
    fix.update().unwrap();

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-test").id.unwrap();
    let original = Recipe::find_by_path(&conn, lb_id, "recipes/a", "foo_1.0.bb")
        .unwrap()
        .unwrap();

    // Version bump changes the file name but not the declared name
    layer.remove("recipes/a/foo_1.0.bb");
    layer.write("recipes/a/foo_1.1.bb", "SUMMARY = \"foo, newer\"\n");
    layer.commit("upgrade foo");

    let mut options = default_options();
    options.reload = true;
    fix.update_with(options).unwrap();

    let recipes = Recipe::list_for_layerbranch(&conn, lb_id).unwrap();
    assert_eq!(recipes.len(), 1);
    assert_eq!(recipes[0].id, original.id);
    assert_eq!(recipes[0].pv, "1.1");
    assert_eq!(recipes[0].filename, "foo_1.1.bb");
}

#[test]
fn full_reload_discards_record_identity() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);

    layer.write("recipes/a/foo_1.0.bb", "SUMMARY = \"foo\"\n");
    layer.commit("initial");
    fix.update().unwrap();

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-test").id.unwrap();
    let original = Recipe::list_for_layerbranch(&conn, lb_id).unwrap()[0]
        .id
        .unwrap();

    // Discarding every record first leaves no reclaim basis
    let mut options = default_options();
    options.full_reload = true;
    fix.update_with(options).unwrap();

    let recipes = Recipe::list_for_layerbranch(&conn, lb_id).unwrap();
    assert_eq!(recipes.len(), 1);
    assert_ne!(recipes[0].id.unwrap(), original);
}

#[test]
fn cross_kind_rename_creates_fresh_record() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);

    let content = "SUMMARY = \"shared\"\nLICENSE = \"MIT\"\nDEPENDS = \"zlib\"\n";
    layer.write("recipes/a/foo.inc", content);
    layer.commit("initial");
    fix.update().unwrap();

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-test").id.unwrap();
    assert!(
        IncFile::find_by_path(&conn, lb_id, "recipes/a/foo.inc")
            .unwrap()
            .is_some()
    );

    // The include file becomes a recipe; never a same-kind rename
    layer.rename("recipes/a/foo.inc", "recipes/a/foo_1.0.bb");
    layer.commit("promote to recipe");
    fix.update().unwrap();

    let recipe = Recipe::find_by_path(&conn, lb_id, "recipes/a", "foo_1.0.bb")
        .unwrap()
        .unwrap();
    assert_eq!(recipe.pn, "foo");
    assert!(
        IncFile::find_by_path(&conn, lb_id, "recipes/a/foo.inc")
            .unwrap()
            .is_none()
    );
}

#[test]
fn sublayer_files_are_never_reconciled_by_parent() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);

    layer.write("recipes/outer_1.0.bb", "SUMMARY = \"outer\"\n");
    layer.write("meta-inner/conf/layer.conf", "BBPATH = \"${LAYERDIR}\"\n");
    layer.write("meta-inner/recipes/inner_1.0.bb", "SUMMARY = \"inner\"\n");
    layer.commit("initial");

    fix.update().unwrap();

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-test").id.unwrap();
    let recipes = Recipe::list_for_layerbranch(&conn, lb_id).unwrap();
    assert_eq!(recipes.len(), 1);
    assert_eq!(recipes[0].pn, "outer");

    // Changing the nested layer's files must not show up incrementally
    layer.write("meta-inner/recipes/inner_1.0.bb", "SUMMARY = \"inner v2\"\n");
    layer.commit("touch inner");
    let summary = fix.update().unwrap();
    assert_eq!(summary.counts.added, 0);
    assert_eq!(summary.counts.evaluated, 0);
}

#[test]
fn machine_distro_and_append_records() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-bsp", &[]);

    layer.write(
        "conf/machine/boardx.conf",
        "#@DESCRIPTION: Board X reference platform\nMACHINE_FEATURES = \"usb\"\n",
    );
    layer.write("conf/distro/tiny.conf", "#@DESCRIPTION: Minimal distro\n");
    layer.write("recipes/a/foo_1.0.bbappend", "# extend foo\n");
    layer.commit("initial");
    fix.update().unwrap();

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-bsp").id.unwrap();

    let machine = Machine::find_by_name(&conn, lb_id, "boardx").unwrap().unwrap();
    assert_eq!(
        machine.description.as_deref(),
        Some("Board X reference platform")
    );
    let distro = Distro::find_by_name(&conn, lb_id, "tiny").unwrap().unwrap();
    assert_eq!(distro.description.as_deref(), Some("Minimal distro"));
    assert_eq!(
        BbAppend::list_for_layerbranch(&conn, lb_id).unwrap().len(),
        1
    );

    // Removing the machine conf removes the record
    layer.remove("conf/machine/boardx.conf");
    layer.commit("drop machine");
    fix.update().unwrap();
    assert!(Machine::find_by_name(&conn, lb_id, "boardx").unwrap().is_none());
}

#[test]
fn parse_errors_are_isolated_unless_stop_on_error() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);

    layer.write("recipes/bad/bad_1.0.bb", "SUMMARY = \"unterminated\n");
    layer.write("recipes/good/good_1.0.bb", "SUMMARY = \"good\"\n");
    layer.commit("initial");

    let summary = fix.update().unwrap();
    assert_eq!(summary.retcode, 0);

    let conn = fix.conn();
    let lb_id = fix.layerbranch("meta-test").id.unwrap();
    let recipes = Recipe::list_for_layerbranch(&conn, lb_id).unwrap();
    assert_eq!(recipes.len(), 1);
    assert_eq!(recipes[0].pn, "good");

    // The failure is visible in the persisted run record
    let runs = UpdateRun::list_recent(&conn, 1).unwrap();
    assert!(runs[0].errors >= 1);
    assert!(runs[0].log.as_deref().unwrap_or("").contains("ERROR:"));

    // With stop-on-error the layer update fails instead
    let mut options = default_options();
    options.reload = true;
    options.stop_on_error = true;
    let summary = fix.update_with(options).unwrap();
    assert_eq!(summary.retcode, 1);
    assert_eq!(summary.layers_failed, 1);
}

#[test]
fn missing_dependency_branch_fails_only_that_layer() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-needy", &["meta-absent"]);
    layer.write("recipes/foo_1.0.bb", "SUMMARY = \"foo\"\n");
    layer.commit("initial");

    let solo = fix.add_layer("meta-solo", &[]);
    solo.write("recipes/bar_1.0.bb", "SUMMARY = \"bar\"\n");
    solo.commit("initial");

    let summary = fix.update().unwrap();
    assert_eq!(summary.retcode, 1);
    assert_eq!(summary.layers_failed, 1);
    assert_eq!(summary.layers_updated, 1);

    let conn = fix.conn();
    let solo_id = fix.layerbranch("meta-solo").id.unwrap();
    assert_eq!(Recipe::list_for_layerbranch(&conn, solo_id).unwrap().len(), 1);
    let needy_id = fix.layerbranch("meta-needy").id.unwrap();
    assert_eq!(
        Recipe::list_for_layerbranch(&conn, needy_id).unwrap().len(),
        0
    );
}

#[test]
fn dependency_context_is_built_in_declaration_order() {
    let fix = IndexFixture::new();
    let core = fix.add_layer("meta-core", &[]);
    core.write("recipes/base_1.0.bb", "SUMMARY = \"base\"\n");
    core.commit("initial");

    let extra = fix.add_layer("meta-extra", &["meta-core"]);
    extra.write("recipes/leaf_1.0.bb", "SUMMARY = \"leaf\"\n");
    extra.commit("initial");

    let summary = fix.update().unwrap();
    assert_eq!(summary.retcode, 0);
    assert_eq!(summary.layers_updated, 2);
}

#[test]
fn interrupted_run_reports_reserved_code_and_rolls_back() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);
    layer.write("recipes/foo_1.0.bb", "SUMMARY = \"foo\"\n");
    layer.commit("initial");

    let cancel = Arc::new(AtomicBool::new(true));
    let err = fix.update_cancelled(cancel).unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));

    let conn = fix.conn();
    // Nothing was committed for the layer
    let lb = fix.layerbranch("meta-test");
    assert!(lb.vcs_last_rev.is_none());
    assert_eq!(
        Recipe::list_for_layerbranch(&conn, lb.id.unwrap())
            .unwrap()
            .len(),
        0
    );

    // The run record still exists, finalized with the reserved code
    let runs = UpdateRun::list_recent(&conn, 1).unwrap();
    assert_eq!(runs[0].retcode, Some(RETCODE_INTERRUPTED as i64));
}

#[test]
fn watermark_decides_incremental_and_diff_failure_falls_back_to_full() {
    let fix = IndexFixture::new();
    let layer = fix.add_layer("meta-test", &[]);
    layer.write("recipes/foo_1.0.bb", "SUMMARY = \"foo\"\n");
    layer.commit("initial");
    fix.update().unwrap();

    // Corrupt the watermark to simulate a rewritten history
    let conn = fix.conn();
    conn.execute(
        "UPDATE layerbranches SET vcs_last_rev = 'deadbeefdeadbeefdeadbeefdeadbeefdeadbeef'",
        [],
    )
    .unwrap();

    layer.write("recipes/bar_1.0.bb", "SUMMARY = \"bar\"\n");
    layer.commit("add bar");

    let summary = fix.update().unwrap();
    assert_eq!(summary.retcode, 0);

    let lb_id = fix.layerbranch("meta-test").id.unwrap();
    let recipes = Recipe::list_for_layerbranch(&conn, lb_id).unwrap();
    assert_eq!(recipes.len(), 2);

    let runs = UpdateRun::list_recent(&conn, 1).unwrap();
    assert!(runs[0].warnings >= 1);
}
