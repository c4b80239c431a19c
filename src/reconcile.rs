// src/reconcile.rs

//! Reconciliation of a layer's database records with its working tree
//!
//! Two modes: incremental (driven by a classified change set) and full
//! (driven by a complete file listing). Both preserve stable record
//! identity across renames and package-name-preserving file moves via the
//! reclaim rule: records left without a surviving file and files without a
//! prior record are joined by logical name before falling back to plain
//! delete/create.
//!
//! When more than one new file could match a to-be-deleted record by name,
//! the first match in directory-walk order wins and the rest become plain
//! creates.

use crate::classify::{self, Classified, FileKind};
use crate::context::EvalContext;
use crate::db::models::{
    BbAppend, BbClass, Distro, FileDependency, IncFile, LayerBranch, Machine, Recipe,
};
use crate::error::{Error, Result};
use crate::evaluator::{EvalError, EvaluatedRecipe, MetadataEvaluator};
use crate::runlog::RunLog;
use crate::worktree::ChangeSet;
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::debug;

/// Counts of the operations one reconciliation applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounts {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub evaluated: usize,
}

impl SyncCounts {
    pub fn summary(&self) -> String {
        format!(
            "{} added, {} updated, {} deleted, {} evaluated",
            self.added, self.updated, self.deleted, self.evaluated
        )
    }
}

/// Reconciles one layer branch against its working tree
pub struct Reconciler<'a> {
    conn: &'a Connection,
    layerbranch_id: i64,
    /// Absolute path of the layer root in the working tree
    layer_root: PathBuf,
    ctx: &'a EvalContext,
    evaluator: &'a dyn MetadataEvaluator,
    stop_on_error: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        conn: &'a Connection,
        layerbranch: &LayerBranch,
        layer_root: PathBuf,
        ctx: &'a EvalContext,
        evaluator: &'a dyn MetadataEvaluator,
        stop_on_error: bool,
    ) -> Result<Self> {
        let layerbranch_id = layerbranch
            .id
            .ok_or_else(|| Error::InitError("Layer branch has no ID".to_string()))?;
        Ok(Self {
            conn,
            layerbranch_id,
            layer_root,
            ctx,
            evaluator,
            stop_on_error,
        })
    }

    /// Incremental mode: apply a classified change set
    pub fn apply_changes(&self, changes: &ChangeSet, log: &mut RunLog) -> Result<SyncCounts> {
        let mut counts = SyncCounts::default();
        let mut touched: HashSet<i64> = HashSet::new();

        let mut doomed_recipes: Vec<Recipe> = Vec::new();
        let mut doomed_machines: Vec<Machine> = Vec::new();
        let mut doomed_distros: Vec<Distro> = Vec::new();
        let mut doomed_classes: Vec<BbClass> = Vec::new();
        let mut doomed_appends: Vec<BbAppend> = Vec::new();
        let mut doomed_incfiles: Vec<IncFile> = Vec::new();
        let mut pending_adds: Vec<String> = Vec::new();

        // 1. Same-kind renames update the record path in place
        for (old, new) in &changes.renamed {
            let (Some(old_c), Some(new_c)) = (classify::classify(old), classify::classify(new))
            else {
                debug!("Ignoring rename of unclassified path {} -> {}", old, new);
                continue;
            };

            match old_c.kind {
                FileKind::Recipe => {
                    match Recipe::find_by_path(
                        self.conn,
                        self.layerbranch_id,
                        &old_c.filepath,
                        &old_c.filename,
                    )? {
                        Some(mut recipe) => {
                            recipe.filepath = new_c.filepath.clone();
                            recipe.filename = new_c.filename.clone();
                            recipe.update(self.conn)?;
                            if self.reevaluate(&mut recipe, log)? {
                                counts.evaluated += 1;
                            }
                            if let Some(id) = recipe.id {
                                touched.insert(id);
                            }
                            counts.updated += 1;
                        }
                        None => {
                            debug!("Renamed recipe {} has no record, treating as addition", old);
                            pending_adds.push(new.clone());
                        }
                    }
                }
                FileKind::Append => {
                    match BbAppend::find_by_path(
                        self.conn,
                        self.layerbranch_id,
                        &old_c.filepath,
                        &old_c.filename,
                    )? {
                        Some(mut append) => {
                            append.filepath = new_c.filepath.clone();
                            append.filename = new_c.filename.clone();
                            append.update(self.conn)?;
                            counts.updated += 1;
                        }
                        None => pending_adds.push(new.clone()),
                    }
                }
                FileKind::Machine => {
                    self.rename_machine(&old_c, &new_c, new, &mut counts)?;
                }
                FileKind::Distro => {
                    self.rename_distro(&old_c, &new_c, new, &mut counts)?;
                }
                FileKind::BbClass => {
                    match BbClass::find_by_name(self.conn, self.layerbranch_id, &old_c.name)? {
                        Some(class) => {
                            if BbClass::find_by_name(self.conn, self.layerbranch_id, &new_c.name)?
                                .is_none()
                            {
                                self.conn.execute(
                                    "UPDATE classes SET name = ?1 WHERE id = ?2",
                                    rusqlite::params![&new_c.name, class.id],
                                )?;
                                counts.updated += 1;
                            } else if let Some(id) = class.id {
                                BbClass::delete(self.conn, id)?;
                                counts.deleted += 1;
                            }
                        }
                        None => pending_adds.push(new.clone()),
                    }
                }
                FileKind::IncFile => {
                    match IncFile::find_by_path(self.conn, self.layerbranch_id, old)? {
                        Some(mut inc) => {
                            inc.path = new.clone();
                            inc.update(self.conn)?;
                            counts.updated += 1;
                        }
                        None => pending_adds.push(new.clone()),
                    }
                }
            }
        }

        // 2. Deletions are only marked here; additions may reclaim them
        for path in &changes.deleted {
            let Some(c) = classify::classify(path) else {
                continue;
            };
            match c.kind {
                FileKind::Recipe => {
                    match Recipe::find_by_path(
                        self.conn,
                        self.layerbranch_id,
                        &c.filepath,
                        &c.filename,
                    )? {
                        Some(recipe) => doomed_recipes.push(recipe),
                        None => log.warn(format!("Deleted recipe {} has no record", path)),
                    }
                }
                FileKind::Append => {
                    match BbAppend::find_by_path(
                        self.conn,
                        self.layerbranch_id,
                        &c.filepath,
                        &c.filename,
                    )? {
                        Some(append) => doomed_appends.push(append),
                        None => log.warn(format!("Deleted append {} has no record", path)),
                    }
                }
                FileKind::Machine => {
                    match Machine::find_by_name(self.conn, self.layerbranch_id, &c.name)? {
                        Some(machine) => doomed_machines.push(machine),
                        None => log.warn(format!("Deleted machine {} has no record", c.name)),
                    }
                }
                FileKind::Distro => {
                    match Distro::find_by_name(self.conn, self.layerbranch_id, &c.name)? {
                        Some(distro) => doomed_distros.push(distro),
                        None => log.warn(format!("Deleted distro {} has no record", c.name)),
                    }
                }
                FileKind::BbClass => {
                    match BbClass::find_by_name(self.conn, self.layerbranch_id, &c.name)? {
                        Some(class) => doomed_classes.push(class),
                        None => log.warn(format!("Deleted class {} has no record", c.name)),
                    }
                }
                FileKind::IncFile => {
                    match IncFile::find_by_path(self.conn, self.layerbranch_id, path)? {
                        Some(inc) => doomed_incfiles.push(inc),
                        None => log.warn(format!("Deleted include file {} has no record", path)),
                    }
                }
            }
        }

        // 3. Additions, reclaiming marked records of the same kind whose
        //    logical name matches
        let mut additions = changes.added.clone();
        additions.extend(pending_adds);
        for path in &additions {
            let Some(c) = classify::classify(path) else {
                continue;
            };
            match c.kind {
                FileKind::Recipe => {
                    self.add_recipe(&c, &mut doomed_recipes, &mut touched, &mut counts, log)?;
                }
                FileKind::Append => {
                    if let Some(pos) = doomed_appends.iter().position(|a| {
                        classify::split_recipe_name(
                            a.filename
                                .strip_suffix(".bbappend")
                                .unwrap_or(&a.filename),
                        )
                        .0 == c.name
                    }) {
                        let mut append = doomed_appends.remove(pos);
                        append.filepath = c.filepath.clone();
                        append.filename = c.filename.clone();
                        append.update(self.conn)?;
                        counts.updated += 1;
                    } else if BbAppend::find_by_path(
                        self.conn,
                        self.layerbranch_id,
                        &c.filepath,
                        &c.filename,
                    )?
                    .is_none()
                    {
                        let mut append = BbAppend::new(
                            self.layerbranch_id,
                            c.filepath.clone(),
                            c.filename.clone(),
                        );
                        append.insert(self.conn)?;
                        counts.added += 1;
                    }
                }
                FileKind::Machine => {
                    if let Some(pos) = doomed_machines.iter().position(|m| m.name == c.name) {
                        let mut machine = doomed_machines.remove(pos);
                        machine.description =
                            classify::conf_description(&self.layer_root.join(path));
                        machine.update(self.conn)?;
                        counts.updated += 1;
                    } else {
                        self.upsert_machine(&c.name, path, &mut counts)?;
                    }
                }
                FileKind::Distro => {
                    if let Some(pos) = doomed_distros.iter().position(|d| d.name == c.name) {
                        let mut distro = doomed_distros.remove(pos);
                        distro.description =
                            classify::conf_description(&self.layer_root.join(path));
                        distro.update(self.conn)?;
                        counts.updated += 1;
                    } else {
                        self.upsert_distro(&c.name, path, &mut counts)?;
                    }
                }
                FileKind::BbClass => {
                    if let Some(pos) = doomed_classes.iter().position(|k| k.name == c.name) {
                        // Same name reappeared elsewhere; keep the record
                        doomed_classes.remove(pos);
                    } else if BbClass::find_by_name(self.conn, self.layerbranch_id, &c.name)?
                        .is_none()
                    {
                        let mut class = BbClass::new(self.layerbranch_id, c.name.clone());
                        class.insert(self.conn)?;
                        counts.added += 1;
                    }
                }
                FileKind::IncFile => {
                    if let Some(pos) = doomed_incfiles.iter().position(|i| i.path == *path) {
                        doomed_incfiles.remove(pos);
                    } else if IncFile::find_by_path(self.conn, self.layerbranch_id, path)?
                        .is_none()
                    {
                        let mut inc = IncFile::new(self.layerbranch_id, path.clone());
                        inc.insert(self.conn)?;
                        counts.added += 1;
                    }
                }
            }
        }

        // 4. Modifications re-evaluate in place
        for path in &changes.modified {
            let Some(c) = classify::classify(path) else {
                continue;
            };
            match c.kind {
                FileKind::Recipe => {
                    match Recipe::find_by_path(
                        self.conn,
                        self.layerbranch_id,
                        &c.filepath,
                        &c.filename,
                    )? {
                        Some(mut recipe) => {
                            if self.reevaluate(&mut recipe, log)? {
                                counts.evaluated += 1;
                                counts.updated += 1;
                            }
                            if let Some(id) = recipe.id {
                                touched.insert(id);
                            }
                        }
                        None => {
                            log.warn(format!("Modified recipe {} has no record, adding", path));
                            self.add_recipe(
                                &c,
                                &mut doomed_recipes,
                                &mut touched,
                                &mut counts,
                                log,
                            )?;
                        }
                    }
                }
                FileKind::Machine => self.upsert_machine(&c.name, path, &mut counts)?,
                FileKind::Distro => self.upsert_distro(&c.name, path, &mut counts)?,
                // Classes, appends and include files carry no evaluated
                // fields; their content only matters to dependent recipes,
                // which the closure below picks up
                FileKind::BbClass | FileKind::Append | FileKind::IncFile => {}
            }
        }

        // 5. Reverse-dependency closure: recipes whose file dependencies
        //    intersect the changed paths must be re-evaluated too
        let doomed_ids: HashSet<i64> = doomed_recipes.iter().filter_map(|r| r.id).collect();
        let changed_paths = changes.all_paths();
        for recipe_id in
            FileDependency::recipes_depending_on(self.conn, self.layerbranch_id, &changed_paths)?
        {
            if touched.contains(&recipe_id) || doomed_ids.contains(&recipe_id) {
                continue;
            }
            if let Some(mut recipe) = Recipe::find_by_id(self.conn, recipe_id)? {
                log.note(format!(
                    "Re-evaluating {} because a file it depends on changed",
                    recipe.full_path()
                ));
                if self.reevaluate(&mut recipe, log)? {
                    counts.evaluated += 1;
                }
            }
        }

        // 6. Whatever was marked and not reclaimed is deleted
        for recipe in doomed_recipes {
            debug!("Deleting recipe record {}", recipe.full_path());
            if let Some(id) = recipe.id {
                Recipe::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for machine in doomed_machines {
            if let Some(id) = machine.id {
                Machine::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for distro in doomed_distros {
            if let Some(id) = distro.id {
                Distro::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for class in doomed_classes {
            if let Some(id) = class.id {
                BbClass::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for append in doomed_appends {
            if let Some(id) = append.id {
                BbAppend::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for inc in doomed_incfiles {
            if let Some(id) = inc.id {
                IncFile::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }

        Ok(counts)
    }

    /// Full mode: reconcile against a complete file listing
    ///
    /// Everything present is re-evaluated unconditionally; the same
    /// name-based reclaim joins database records without a surviving file
    /// to files without a prior record, which is how a full reload still
    /// preserves identity across a version bump that changed the file name.
    pub fn apply_full(&self, files: &[String], log: &mut RunLog) -> Result<SyncCounts> {
        let mut counts = SyncCounts::default();

        let mut db_recipes: HashMap<String, Recipe> =
            Recipe::list_for_layerbranch(self.conn, self.layerbranch_id)?
                .into_iter()
                .map(|r| (r.full_path(), r))
                .collect();
        let mut db_machines: HashMap<String, Machine> =
            Machine::list_for_layerbranch(self.conn, self.layerbranch_id)?
                .into_iter()
                .map(|m| (m.name.clone(), m))
                .collect();
        let mut db_distros: HashMap<String, Distro> =
            Distro::list_for_layerbranch(self.conn, self.layerbranch_id)?
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect();
        let mut db_classes: HashMap<String, BbClass> =
            BbClass::list_for_layerbranch(self.conn, self.layerbranch_id)?
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect();
        let mut db_appends: HashMap<String, BbAppend> =
            BbAppend::list_for_layerbranch(self.conn, self.layerbranch_id)?
                .into_iter()
                .map(|a| (a.full_path(), a))
                .collect();
        let mut db_incfiles: HashMap<String, IncFile> =
            IncFile::list_for_layerbranch(self.conn, self.layerbranch_id)?
                .into_iter()
                .map(|i| (i.path.clone(), i))
                .collect();

        // Files with no prior record, in walk order
        let mut new_recipes: Vec<(String, Classified)> = Vec::new();

        for path in files {
            let Some(c) = classify::classify(path) else {
                continue;
            };
            match c.kind {
                FileKind::Recipe => match db_recipes.remove(path) {
                    Some(mut recipe) => {
                        if self.reevaluate(&mut recipe, log)? {
                            counts.evaluated += 1;
                        }
                    }
                    None => new_recipes.push((path.clone(), c)),
                },
                FileKind::Machine => match db_machines.remove(&c.name) {
                    Some(mut machine) => {
                        machine.description =
                            classify::conf_description(&self.layer_root.join(path));
                        machine.update(self.conn)?;
                        counts.updated += 1;
                    }
                    None => {
                        let mut machine = Machine::new(self.layerbranch_id, c.name.clone());
                        machine.description =
                            classify::conf_description(&self.layer_root.join(path));
                        machine.insert(self.conn)?;
                        counts.added += 1;
                    }
                },
                FileKind::Distro => match db_distros.remove(&c.name) {
                    Some(mut distro) => {
                        distro.description =
                            classify::conf_description(&self.layer_root.join(path));
                        distro.update(self.conn)?;
                        counts.updated += 1;
                    }
                    None => {
                        let mut distro = Distro::new(self.layerbranch_id, c.name.clone());
                        distro.description =
                            classify::conf_description(&self.layer_root.join(path));
                        distro.insert(self.conn)?;
                        counts.added += 1;
                    }
                },
                FileKind::BbClass => {
                    if db_classes.remove(&c.name).is_none() {
                        let mut class = BbClass::new(self.layerbranch_id, c.name.clone());
                        class.insert(self.conn)?;
                        counts.added += 1;
                    }
                }
                FileKind::Append => {
                    if db_appends.remove(path).is_none() {
                        let mut append = BbAppend::new(
                            self.layerbranch_id,
                            c.filepath.clone(),
                            c.filename.clone(),
                        );
                        append.insert(self.conn)?;
                        counts.added += 1;
                    }
                }
                FileKind::IncFile => {
                    if db_incfiles.remove(path).is_none() {
                        let mut inc = IncFile::new(self.layerbranch_id, path.clone());
                        inc.insert(self.conn)?;
                        counts.added += 1;
                    }
                }
            }
        }

        // Records with no surviving file, ordered for a deterministic join
        let mut doomed_recipes: Vec<Recipe> = db_recipes.into_values().collect();
        doomed_recipes.sort_by_key(|r| r.full_path());

        for (path, c) in &new_recipes {
            let Some(evaluated) = self.evaluate_file(path, log)? else {
                continue;
            };
            if let Some(pos) = doomed_recipes.iter().position(|d| d.pn == evaluated.pn) {
                let mut recipe = doomed_recipes.remove(pos);
                debug!(
                    "Reclaiming record of {} for {} (pn {})",
                    recipe.full_path(),
                    path,
                    evaluated.pn
                );
                recipe.filepath = c.filepath.clone();
                recipe.filename = c.filename.clone();
                self.store_evaluation(&mut recipe, &evaluated)?;
                counts.updated += 1;
                counts.evaluated += 1;
            } else {
                self.create_recipe(c, &evaluated)?;
                counts.added += 1;
                counts.evaluated += 1;
            }
        }

        for recipe in doomed_recipes {
            debug!("Deleting recipe record {}", recipe.full_path());
            if let Some(id) = recipe.id {
                Recipe::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for machine in db_machines.into_values() {
            if let Some(id) = machine.id {
                Machine::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for distro in db_distros.into_values() {
            if let Some(id) = distro.id {
                Distro::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for class in db_classes.into_values() {
            if let Some(id) = class.id {
                BbClass::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for append in db_appends.into_values() {
            if let Some(id) = append.id {
                BbAppend::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }
        for inc in db_incfiles.into_values() {
            if let Some(id) = inc.id {
                IncFile::delete(self.conn, id)?;
                counts.deleted += 1;
            }
        }

        Ok(counts)
    }

    /// Add one recipe file, reclaiming a marked record with the same pn
    fn add_recipe(
        &self,
        c: &Classified,
        doomed: &mut Vec<Recipe>,
        touched: &mut HashSet<i64>,
        counts: &mut SyncCounts,
        log: &mut RunLog,
    ) -> Result<()> {
        let path = if c.filepath.is_empty() {
            c.filename.clone()
        } else {
            format!("{}/{}", c.filepath, c.filename)
        };
        let Some(evaluated) = self.evaluate_file(&path, log)? else {
            return Ok(());
        };

        if let Some(pos) = doomed.iter().position(|d| d.pn == evaluated.pn) {
            let mut recipe = doomed.remove(pos);
            debug!(
                "Reclaiming record of {} for {} (pn {})",
                recipe.full_path(),
                path,
                evaluated.pn
            );
            recipe.filepath = c.filepath.clone();
            recipe.filename = c.filename.clone();
            self.store_evaluation(&mut recipe, &evaluated)?;
            if let Some(id) = recipe.id {
                touched.insert(id);
            }
            counts.updated += 1;
            counts.evaluated += 1;
        } else if let Some(mut existing) =
            Recipe::find_by_path(self.conn, self.layerbranch_id, &c.filepath, &c.filename)?
        {
            debug!("Added recipe {} already has a record, refreshing", path);
            self.store_evaluation(&mut existing, &evaluated)?;
            if let Some(id) = existing.id {
                touched.insert(id);
            }
            counts.updated += 1;
            counts.evaluated += 1;
        } else {
            let id = self.create_recipe(c, &evaluated)?;
            touched.insert(id);
            counts.added += 1;
            counts.evaluated += 1;
        }
        Ok(())
    }

    fn create_recipe(&self, c: &Classified, evaluated: &EvaluatedRecipe) -> Result<i64> {
        let mut recipe = Recipe::new(
            self.layerbranch_id,
            c.filepath.clone(),
            c.filename.clone(),
            evaluated.pn.clone(),
            evaluated.pv.clone(),
        );
        copy_evaluation(&mut recipe, evaluated);
        let id = recipe.insert(self.conn)?;
        FileDependency::replace_for_recipe(self.conn, id, &evaluated.file_depends)?;
        Ok(id)
    }

    /// Re-evaluate an existing recipe record in place
    ///
    /// Returns false when the file failed to parse and the failure was
    /// isolated; the record keeps its previous fields in that case.
    fn reevaluate(&self, recipe: &mut Recipe, log: &mut RunLog) -> Result<bool> {
        let Some(evaluated) = self.evaluate_file(&recipe.full_path(), log)? else {
            return Ok(false);
        };
        self.store_evaluation(recipe, &evaluated)?;
        Ok(true)
    }

    fn store_evaluation(&self, recipe: &mut Recipe, evaluated: &EvaluatedRecipe) -> Result<()> {
        copy_evaluation(recipe, evaluated);
        recipe.update(self.conn)?;
        let id = recipe
            .id
            .ok_or_else(|| Error::InitError("Cannot store evaluation without ID".to_string()))?;
        FileDependency::replace_for_recipe(self.conn, id, &evaluated.file_depends)?;
        Ok(())
    }

    /// Evaluate one layer-relative file, isolating parse failures
    fn evaluate_file(
        &self,
        rel_path: &str,
        log: &mut RunLog,
    ) -> Result<Option<EvaluatedRecipe>> {
        match self.evaluator.evaluate(&self.layer_root.join(rel_path), self.ctx) {
            Ok(evaluated) => Ok(Some(evaluated)),
            Err(EvalError::Parse(msg)) => {
                log.error(format!("Failed to evaluate {}: {}", rel_path, msg));
                if self.stop_on_error {
                    Err(Error::EvalError(msg))
                } else {
                    Ok(None)
                }
            }
            Err(EvalError::Environment(msg)) => {
                log.error(format!("Evaluator environment failure: {}", msg));
                Err(Error::ContextError(msg))
            }
        }
    }

    fn upsert_machine(&self, name: &str, rel_path: &str, counts: &mut SyncCounts) -> Result<()> {
        let description = classify::conf_description(&self.layer_root.join(rel_path));
        match Machine::find_by_name(self.conn, self.layerbranch_id, name)? {
            Some(mut machine) => {
                machine.description = description;
                machine.update(self.conn)?;
                counts.updated += 1;
            }
            None => {
                let mut machine = Machine::new(self.layerbranch_id, name.to_string());
                machine.description = description;
                machine.insert(self.conn)?;
                counts.added += 1;
            }
        }
        Ok(())
    }

    fn upsert_distro(&self, name: &str, rel_path: &str, counts: &mut SyncCounts) -> Result<()> {
        let description = classify::conf_description(&self.layer_root.join(rel_path));
        match Distro::find_by_name(self.conn, self.layerbranch_id, name)? {
            Some(mut distro) => {
                distro.description = description;
                distro.update(self.conn)?;
                counts.updated += 1;
            }
            None => {
                let mut distro = Distro::new(self.layerbranch_id, name.to_string());
                distro.description = description;
                distro.insert(self.conn)?;
                counts.added += 1;
            }
        }
        Ok(())
    }

    fn rename_machine(
        &self,
        old_c: &Classified,
        new_c: &Classified,
        new_path: &str,
        counts: &mut SyncCounts,
    ) -> Result<()> {
        match Machine::find_by_name(self.conn, self.layerbranch_id, &old_c.name)? {
            Some(mut machine) => {
                if Machine::find_by_name(self.conn, self.layerbranch_id, &new_c.name)?.is_some() {
                    // Target name already tracked; the old definition is gone
                    if let Some(id) = machine.id {
                        Machine::delete(self.conn, id)?;
                        counts.deleted += 1;
                    }
                    self.upsert_machine(&new_c.name, new_path, counts)?;
                } else {
                    machine.name = new_c.name.clone();
                    machine.description =
                        classify::conf_description(&self.layer_root.join(new_path));
                    machine.update(self.conn)?;
                    counts.updated += 1;
                }
            }
            None => self.upsert_machine(&new_c.name, new_path, counts)?,
        }
        Ok(())
    }

    fn rename_distro(
        &self,
        old_c: &Classified,
        new_c: &Classified,
        new_path: &str,
        counts: &mut SyncCounts,
    ) -> Result<()> {
        match Distro::find_by_name(self.conn, self.layerbranch_id, &old_c.name)? {
            Some(mut distro) => {
                if Distro::find_by_name(self.conn, self.layerbranch_id, &new_c.name)?.is_some() {
                    if let Some(id) = distro.id {
                        Distro::delete(self.conn, id)?;
                        counts.deleted += 1;
                    }
                    self.upsert_distro(&new_c.name, new_path, counts)?;
                } else {
                    distro.name = new_c.name.clone();
                    distro.description =
                        classify::conf_description(&self.layer_root.join(new_path));
                    distro.update(self.conn)?;
                    counts.updated += 1;
                }
            }
            None => self.upsert_distro(&new_c.name, new_path, counts)?,
        }
        Ok(())
    }
}

fn copy_evaluation(recipe: &mut Recipe, evaluated: &EvaluatedRecipe) {
    recipe.pn = evaluated.pn.clone();
    recipe.pv = evaluated.pv.clone();
    recipe.summary = evaluated.summary.clone();
    recipe.description = evaluated.description.clone();
    recipe.section = evaluated.section.clone();
    recipe.license = evaluated.license.clone();
    recipe.homepage = evaluated.homepage.clone();
    recipe.provides = evaluated.provides.clone();
    recipe.depends = evaluated.depends.clone();
    recipe.inherits = evaluated.inherits.clone();
    recipe.src_uris = evaluated.src_uris.clone();
}
