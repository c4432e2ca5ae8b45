//! Generation orchestration
//!
//! Drives a run through its stages: validate, plan, build contexts,
//! render, write to staging, promote atomically, post-validate. Nothing
//! touches the output tree until every file has rendered successfully,
//! and a prior tree is snapshotted before it is replaced, so a run either
//! lands completely or leaves the previous state in place.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{CancellationFlag, RenderBatchError, RenderJob, RenderedFile, TemplateEngine};
use crate::error::{ForgeError, GenerationError, RollbackError};
use crate::fsops;
use crate::hash::{hash_bytes, hash_file};
use crate::model::DomainConfig;
use crate::registry::TemplateRegistry;
use crate::validator::{validate, ValidationIssue, ValidationReport};

use super::diff::{diff_domains, ConfigDiff};
use super::plan::{build_plan, PlanRule, PlannedFile, DEFAULT_RULES};
use super::run::{
    GeneratedArtifact, GenerationRun, RunStatus, RunStore, BACKUP_RETENTION,
};

/// Options for one generation invocation
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Regenerate everything even when a prior run exists
    pub force: bool,
    /// Cooperative cancellation, checked between stages and renders
    pub cancel: CancellationFlag,
}

/// Summary of a completed generation run
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub run_id: String,
    /// Paths written or rewritten by this run, relative to the output root
    pub files_written: Vec<PathBuf>,
    /// Artifacts carried forward untouched
    pub files_unchanged: usize,
    /// Paths deleted because their entity left the configuration
    pub files_deleted: Vec<PathBuf>,
    /// Non-blocking validation findings
    pub warnings: Vec<ValidationIssue>,
}

/// Runs the generation pipeline against an output tree
pub struct Orchestrator {
    registry: TemplateRegistry,
    rules: Vec<PlanRule>,
    render_budget: Option<Duration>,
}

impl Orchestrator {
    /// Orchestrator with the builtin templates and the default layout
    pub fn new() -> Self {
        Self::with_registry(TemplateRegistry::with_builtins())
    }

    /// Orchestrator over a caller-assembled registry (builtin templates
    /// plus any override directories already registered)
    pub fn with_registry(registry: TemplateRegistry) -> Self {
        Self {
            registry,
            rules: DEFAULT_RULES.to_vec(),
            render_budget: None,
        }
    }

    pub fn set_rules(&mut self, rules: Vec<PlanRule>) {
        self.rules = rules;
    }

    pub fn set_render_budget(&mut self, budget: Duration) {
        self.render_budget = Some(budget);
    }

    /// Generate the application for `domain` under `output_root`
    ///
    /// With a prior successful run recorded and `force` unset, only files
    /// affected by the configuration change are rewritten. An unchanged
    /// configuration returns the prior run untouched.
    pub fn generate(
        &self,
        domain: &DomainConfig,
        output_root: &Path,
        options: &GenerateOptions,
    ) -> Result<GenerationOutcome, ForgeError> {
        let store = RunStore::for_output_root(output_root).map_err(ForgeError::from)?;
        let _lock = store.lock(&domain.name).map_err(ForgeError::from)?;

        let prior = store.latest().map_err(ForgeError::from)?;
        match prior {
            Some(prior) if !options.force => {
                let diff = diff_domains(&prior.domain, domain);
                if diff.is_empty() {
                    info!(run_id = %prior.run_id, domain = %domain.name, "configuration unchanged");
                    return Ok(GenerationOutcome {
                        run_id: prior.run_id.clone(),
                        files_written: Vec::new(),
                        files_unchanged: prior.artifacts.len(),
                        files_deleted: Vec::new(),
                        warnings: Vec::new(),
                    });
                }
                self.generate_incremental(domain, output_root, &store, prior, diff, options)
            }
            _ => self.generate_full(domain, output_root, &store, options),
        }
    }

    /// Full run: render everything into staging, promote by rename
    fn generate_full(
        &self,
        domain: &DomainConfig,
        output_root: &Path,
        store: &RunStore,
        options: &GenerateOptions,
    ) -> Result<GenerationOutcome, ForgeError> {
        let mut run = GenerationRun::new(domain.clone(), output_root);
        info!(run_id = %run.run_id, domain = %domain.name, "starting full generation");

        let report = self.validate_stage(&mut run, store, domain)?;
        let plan = build_plan(domain, &self.registry, &self.rules)?;
        let (engine, jobs) = self.context_stage(&mut run, store, domain, &plan)?;
        let rendered = self.render_stage(&mut run, store, &engine, &jobs, &options.cancel)?;

        run.status = RunStatus::Writing;
        store.save(&run)?;
        self.check_cancel(&run, store, &options.cancel)?;

        let parent = output_root.parent().unwrap_or_else(|| Path::new("."));
        let staging = std::fs::create_dir_all(parent)
            .map_err(GenerationError::from)
            .and_then(|_| {
                tempfile::Builder::new()
                    .prefix(".forge-stage-")
                    .tempdir_in(parent)
                    .map_err(GenerationError::from)
            })
            .map_err(|e| self.fail_run(&mut run, store, e.into()))?;

        for file in &rendered {
            let dest = staging.path().join(&file.path);
            if let Err(e) = fsops::atomic_write(&dest, file.text.as_bytes()) {
                let err = GenerationError::WriteFailed {
                    path: file.path.clone(),
                    message: e.to_string(),
                };
                return Err(self.fail_run(&mut run, store, err.into()));
            }
            run.artifacts.push(GeneratedArtifact {
                path: file.path.clone(),
                content_hash: hash_bytes(file.text.as_bytes()),
                template_used: file.template.clone(),
                entity: file.entity.clone(),
            });
        }

        self.check_cancel(&run, store, &options.cancel)?;

        // Promote: the previous tree moves aside as a snapshot, staging
        // takes its place. Both renames stay within the same parent.
        let mut backup_key = None;
        if output_root.exists() {
            let key = match store.latest()? {
                Some(prev) => prev.run_id,
                None => format!("unmanaged-{}", run.run_id),
            };
            let backup = store.backup_dir(&key);
            let moved = (|| -> Result<(), GenerationError> {
                fsops::remove_tree(&backup)?;
                if let Some(backup_parent) = backup.parent() {
                    std::fs::create_dir_all(backup_parent)?;
                }
                std::fs::rename(output_root, &backup)?;
                Ok(())
            })();
            if let Err(e) = moved {
                return Err(self.fail_run(&mut run, store, e.into()));
            }
            backup_key = Some(key);
        }
        let staged = staging.keep();
        if let Err(e) = std::fs::rename(&staged, output_root) {
            // Put the previous tree back before failing, so the root never
            // stays absent.
            if let Some(key) = &backup_key {
                if let Err(undo) = std::fs::rename(store.backup_dir(key), output_root) {
                    warn!(
                        run_id = %run.run_id,
                        error = %undo,
                        "could not restore previous tree after failed promotion"
                    );
                }
            }
            let _ = fsops::remove_tree(&staged);
            return Err(self.fail_run(&mut run, store, GenerationError::from(e).into()));
        }
        debug!(run_id = %run.run_id, files = run.artifacts.len(), "promoted staging tree");

        self.post_validate(&mut run, store, output_root, backup_key.as_deref())?;

        run.status = RunStatus::Succeeded;
        store.save(&run)?;
        store.prune_backups(BACKUP_RETENTION)?;
        info!(run_id = %run.run_id, files = run.artifacts.len(), "generation succeeded");

        Ok(GenerationOutcome {
            run_id: run.run_id.clone(),
            files_written: run.artifacts.iter().map(|a| a.path.clone()).collect(),
            files_unchanged: 0,
            files_deleted: Vec::new(),
            warnings: report.warnings().cloned().collect(),
        })
    }

    /// Incremental run: rewrite only files affected by the diff
    fn generate_incremental(
        &self,
        domain: &DomainConfig,
        output_root: &Path,
        store: &RunStore,
        prior: GenerationRun,
        diff: ConfigDiff,
        options: &GenerateOptions,
    ) -> Result<GenerationOutcome, ForgeError> {
        let mut run = GenerationRun::new(domain.clone(), output_root);
        info!(
            run_id = %run.run_id,
            domain = %domain.name,
            prior = %prior.run_id,
            "starting incremental generation"
        );

        let report = self.validate_stage(&mut run, store, domain)?;
        let plan = build_plan(domain, &self.registry, &self.rules)?;

        // Per-entity files regenerate when their entity is affected;
        // domain-scoped files regenerate on any change.
        let affected = diff.affected_entities(domain);
        let to_render: Vec<&PlannedFile> = plan
            .iter()
            .filter(|p| match &p.entity {
                Some(entity) => affected.contains(entity),
                None => true,
            })
            .collect();

        let (engine, jobs) =
            self.context_stage_for(&mut run, store, domain, to_render.iter().copied())?;
        let rendered = self.render_stage(&mut run, store, &engine, &jobs, &options.cancel)?;

        run.status = RunStatus::Writing;
        store.save(&run)?;
        self.check_cancel(&run, store, &options.cancel)?;

        // Snapshot the live tree under the prior run's id before mutating
        // it in place.
        store.snapshot(output_root, &prior.run_id)?;

        let planned_paths: std::collections::BTreeSet<&Path> =
            plan.iter().map(|p| p.path.as_path()).collect();
        let rendered_paths: std::collections::BTreeSet<&Path> =
            rendered.iter().map(|f| f.path.as_path()).collect();

        let mut files_written = Vec::new();
        let mut files_unchanged = 0usize;
        let mut files_deleted = Vec::new();

        let applied = (|| -> Result<(), GenerationError> {
            for file in &rendered {
                let hash = hash_bytes(file.text.as_bytes());
                let unchanged = prior
                    .artifact(&file.path)
                    .is_some_and(|a| a.content_hash == hash);
                if unchanged {
                    files_unchanged += 1;
                } else {
                    let dest = output_root.join(&file.path);
                    fsops::atomic_write(&dest, file.text.as_bytes()).map_err(|e| {
                        GenerationError::WriteFailed {
                            path: file.path.clone(),
                            message: e.to_string(),
                        }
                    })?;
                    files_written.push(file.path.clone());
                }
                run.artifacts.push(GeneratedArtifact {
                    path: file.path.clone(),
                    content_hash: hash,
                    template_used: file.template.clone(),
                    entity: file.entity.clone(),
                });
            }

            // Carry forward untouched artifacts; drop those whose path left
            // the plan (removed entities).
            for artifact in &prior.artifacts {
                if rendered_paths.contains(artifact.path.as_path()) {
                    continue;
                }
                if planned_paths.contains(artifact.path.as_path()) {
                    run.artifacts.push(artifact.clone());
                    files_unchanged += 1;
                } else {
                    let victim = output_root.join(&artifact.path);
                    if victim.exists() {
                        std::fs::remove_file(&victim)?;
                    }
                    files_deleted.push(artifact.path.clone());
                }
            }
            Ok(())
        })();
        if let Err(e) = applied {
            // A half-applied update must not survive: put the snapshot
            // back before failing the run.
            if let Err(undo) = store.restore(output_root, &prior.run_id) {
                warn!(
                    run_id = %run.run_id,
                    error = %undo,
                    "snapshot restore failed after write error"
                );
            }
            return Err(self.fail_run(&mut run, store, e.into()));
        }
        run.artifacts.sort_by(|a, b| a.path.cmp(&b.path));

        self.post_validate(&mut run, store, output_root, Some(&prior.run_id))?;

        run.status = RunStatus::Succeeded;
        store.save(&run)?;
        store.prune_backups(BACKUP_RETENTION)?;
        info!(
            run_id = %run.run_id,
            written = files_written.len(),
            unchanged = files_unchanged,
            deleted = files_deleted.len(),
            "incremental generation succeeded"
        );

        Ok(GenerationOutcome {
            run_id: run.run_id.clone(),
            files_written,
            files_unchanged,
            files_deleted,
            warnings: report.warnings().cloned().collect(),
        })
    }

    /// Restore the output tree to the state recorded for `run_id`
    ///
    /// Runs newer than the target are marked rolled back and the latest
    /// pointer moves to the target.
    pub fn rollback(&self, output_root: &Path, run_id: &str) -> Result<(), ForgeError> {
        let store = RunStore::for_output_root(output_root).map_err(ForgeError::from)?;
        let target = store
            .load(run_id)
            .map_err(ForgeError::from)?
            .ok_or_else(|| RollbackError::SnapshotMissing {
                run_id: run_id.to_string(),
            })?;
        let _lock = store.lock(&target.domain.name).map_err(ForgeError::from)?;

        store.restore(output_root, run_id).map_err(ForgeError::from)?;

        // Run ids sort chronologically; every successful run newer than
        // the target is now rolled back, not just the latest one.
        for newer_id in store.run_ids()? {
            if newer_id.as_str() <= run_id {
                continue;
            }
            if let Some(mut newer) = store.load(&newer_id)? {
                if newer.status == RunStatus::Succeeded {
                    newer.status = RunStatus::RolledBack;
                    store.save(&newer)?;
                }
            }
        }
        store.set_latest(run_id)?;
        info!(run_id = %run_id, "rolled back output tree");
        Ok(())
    }

    // Stage helpers

    fn validate_stage(
        &self,
        run: &mut GenerationRun,
        store: &RunStore,
        domain: &DomainConfig,
    ) -> Result<ValidationReport, ForgeError> {
        run.status = RunStatus::Validating;
        store.save(run)?;

        let report = validate(domain);
        for issue in report.warnings() {
            warn!(domain = %domain.name, location = %issue.location, "{}", issue.message);
        }
        if report.has_errors() {
            run.status = RunStatus::Failed;
            store.save(run)?;
            return Err(GenerationError::ValidationFailed {
                domain: domain.name.clone(),
                errors: report.error_count(),
            }
            .into());
        }
        Ok(report)
    }

    fn context_stage(
        &self,
        run: &mut GenerationRun,
        store: &RunStore,
        domain: &DomainConfig,
        plan: &[PlannedFile],
    ) -> Result<(TemplateEngine, Vec<RenderJob>), ForgeError> {
        self.context_stage_for(run, store, domain, plan.iter())
    }

    fn context_stage_for<'a>(
        &self,
        run: &mut GenerationRun,
        store: &RunStore,
        domain: &DomainConfig,
        planned: impl Iterator<Item = &'a PlannedFile>,
    ) -> Result<(TemplateEngine, Vec<RenderJob>), ForgeError> {
        run.status = RunStatus::ContextBuilding;
        store.save(run)?;

        let mut engine = TemplateEngine::new();
        if let Some(budget) = self.render_budget {
            engine.set_render_budget(budget);
        }

        let mut jobs = Vec::new();
        for file in planned {
            engine.prepare(&file.template)?;
            let entity = match &file.entity {
                Some(name) => domain.entity(name),
                None => None,
            };
            let context = engine.build_context(domain, entity, &file.output_kind)?;
            jobs.push(RenderJob {
                template: file.template.clone(),
                context,
                output_path: file.path.clone(),
                entity: file.entity.clone(),
            });
        }
        Ok((engine, jobs))
    }

    fn render_stage(
        &self,
        run: &mut GenerationRun,
        store: &RunStore,
        engine: &TemplateEngine,
        jobs: &[RenderJob],
        cancel: &CancellationFlag,
    ) -> Result<Vec<RenderedFile>, ForgeError> {
        run.status = RunStatus::Rendering;
        store.save(run)?;
        self.check_cancel(run, store, cancel)?;

        match engine.batch_render(jobs, cancel) {
            Ok(rendered) => Ok(rendered),
            Err(RenderBatchError::Cancelled) => {
                run.status = RunStatus::Failed;
                store.save(run)?;
                Err(GenerationError::Cancelled {
                    run_id: run.run_id.clone(),
                }
                .into())
            }
            Err(RenderBatchError::Failed(err)) => {
                run.status = RunStatus::Failed;
                store.save(run)?;
                Err(err.into())
            }
        }
    }

    /// Re-hash every artifact on disk; a mismatch restores the prior
    /// snapshot (or removes a first-run tree) and fails the run
    fn post_validate(
        &self,
        run: &mut GenerationRun,
        store: &RunStore,
        output_root: &Path,
        prior_run_id: Option<&str>,
    ) -> Result<(), ForgeError> {
        run.status = RunStatus::PostValidating;
        store.save(run)?;

        let mismatch = run.artifacts.iter().find_map(|artifact| {
            let path = output_root.join(&artifact.path);
            let actual = hash_file(&path).unwrap_or_else(|e| format!("unreadable: {}", e));
            (actual != artifact.content_hash).then(|| {
                (
                    artifact.path.clone(),
                    artifact.content_hash.clone(),
                    actual,
                )
            })
        });

        let Some((path, expected, actual)) = mismatch else {
            return Ok(());
        };

        warn!(
            run_id = %run.run_id,
            path = %path.display(),
            "post-validation hash mismatch"
        );
        match prior_run_id {
            Some(prior) => {
                store.restore(output_root, prior).map_err(ForgeError::from)?;
                run.status = RunStatus::RolledBack;
            }
            None => {
                fsops::remove_tree(output_root).map_err(GenerationError::from)?;
                run.status = RunStatus::Failed;
            }
        }
        store.save(run)?;
        Err(GenerationError::PostValidation {
            path,
            expected,
            actual,
        }
        .into())
    }

    /// Persist the run as failed and hand the original error back
    fn fail_run(&self, run: &mut GenerationRun, store: &RunStore, err: ForgeError) -> ForgeError {
        run.status = RunStatus::Failed;
        if let Err(save_err) = store.save(run) {
            warn!(
                run_id = %run.run_id,
                error = %save_err,
                "could not persist failed run status"
            );
        }
        err
    }

    fn check_cancel(
        &self,
        run: &GenerationRun,
        store: &RunStore,
        cancel: &CancellationFlag,
    ) -> Result<(), ForgeError> {
        if cancel.is_cancelled() {
            let mut failed = run.clone();
            failed.status = RunStatus::Failed;
            store.save(&failed)?;
            return Err(GenerationError::Cancelled {
                run_id: run.run_id.clone(),
            }
            .into());
        }
        Ok(())
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
