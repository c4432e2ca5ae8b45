//! Generation run records
//!
//! A [`GenerationRun`] captures one end-to-end execution: the domain
//! snapshot it ran against, the artifacts it produced, and its terminal
//! status. Runs are persisted as JSON in a hidden sidecar directory next
//! to the output tree (never inside it, so promotion and rollback cannot
//! clobber the history), together with tree snapshots for rollback and
//! the per-domain run lock.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, RollbackError};
use crate::hash::hash_bytes;
use crate::model::DomainConfig;

/// How many superseded run snapshots are retained per domain
pub const BACKUP_RETENTION: usize = 3;

/// Pipeline state of a generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Created,
    Validating,
    ContextBuilding,
    Rendering,
    Writing,
    PostValidating,
    Succeeded,
    RolledBack,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::RolledBack | RunStatus::Failed
        )
    }
}

/// One generated file, recorded for diffing, incremental updates and
/// post-validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    /// Path relative to the output root
    pub path: PathBuf,
    pub content_hash: String,
    /// `name.kind` of the template that produced this file
    pub template_used: String,
    /// Entity the file is scoped to; `None` for cross-cutting files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

/// One orchestrated generation execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRun {
    pub run_id: String,
    /// Domain snapshot this run was generated from
    pub domain: DomainConfig,
    pub output_root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default)]
    pub artifacts: Vec<GeneratedArtifact>,
}

impl GenerationRun {
    pub fn new(domain: DomainConfig, output_root: &Path) -> Self {
        let started_at = Utc::now();
        let run_id = make_run_id(&domain, started_at);
        Self {
            run_id,
            domain,
            output_root: output_root.to_path_buf(),
            started_at,
            status: RunStatus::Created,
            artifacts: Vec::new(),
        }
    }

    pub fn artifact(&self, path: &Path) -> Option<&GeneratedArtifact> {
        self.artifacts.iter().find(|a| a.path == path)
    }
}

/// Unique, sortable run id: timestamp plus a short snapshot digest
fn make_run_id(domain: &DomainConfig, started_at: DateTime<Utc>) -> String {
    let seed = format!(
        "{}:{}:{}",
        domain.name,
        domain.version,
        started_at.timestamp_nanos_opt().unwrap_or_default()
    );
    let digest = hash_bytes(seed.as_bytes());
    format!(
        "run-{}-{}",
        started_at.format("%Y%m%dT%H%M%S%3f"),
        &digest["sha256:".len().."sha256:".len() + 8]
    )
}

/// Exclusive per-domain generation lock, held for a run's lifetime
///
/// Dropping the guard releases the lock.
#[derive(Debug)]
pub struct RunLock {
    file: fs::File,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

/// Sidecar store for run metadata, snapshots and the run lock
///
/// For an output root `<parent>/<name>`, the store lives at
/// `<parent>/.<name>.appforge/`.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn for_output_root(output_root: &Path) -> Result<Self, GenerationError> {
        let name = output_root
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| GenerationError::Metadata {
                path: output_root.to_path_buf(),
                message: "output root has no usable directory name".to_string(),
            })?;
        let parent = output_root.parent().unwrap_or_else(|| Path::new("."));
        Ok(Self {
            root: parent.join(format!(".{}.appforge", name)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    fn latest_path(&self) -> PathBuf {
        self.root.join("LATEST")
    }

    fn backups_dir(&self) -> PathBuf {
        self.root.join("backups")
    }

    pub fn backup_dir(&self, run_id: &str) -> PathBuf {
        self.backups_dir().join(run_id)
    }

    /// Acquire the exclusive run lock for this output tree
    ///
    /// The lock lives in the sidecar, so its scope is one output root:
    /// concurrent runs of the same domain into distinct roots are allowed,
    /// while two runs racing for the same tree are not. `domain_name` only
    /// labels the error.
    pub fn lock(&self, domain_name: &str) -> Result<RunLock, GenerationError> {
        fs::create_dir_all(&self.root)?;
        let file = fs::File::create(self.root.join("lock"))?;
        file.try_lock_exclusive()
            .map_err(|_| GenerationError::RunInProgress {
                domain: domain_name.to_string(),
            })?;
        Ok(RunLock { file })
    }

    /// Persist a run record; a terminal successful run also becomes the
    /// latest pointer
    pub fn save(&self, run: &GenerationRun) -> Result<(), GenerationError> {
        let dir = self.runs_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", run.run_id));
        let json =
            serde_json::to_string_pretty(run).map_err(|e| GenerationError::Metadata {
                path: path.clone(),
                message: e.to_string(),
            })?;
        crate::fsops::atomic_write(&path, json.as_bytes())?;

        if run.status == RunStatus::Succeeded {
            crate::fsops::atomic_write(&self.latest_path(), run.run_id.as_bytes())?;
        }
        Ok(())
    }

    /// Point the latest marker at an arbitrary retained run (rollback)
    pub fn set_latest(&self, run_id: &str) -> Result<(), GenerationError> {
        fs::create_dir_all(&self.root)?;
        crate::fsops::atomic_write(&self.latest_path(), run_id.as_bytes())?;
        Ok(())
    }

    pub fn load(&self, run_id: &str) -> Result<Option<GenerationRun>, GenerationError> {
        let path = self.runs_dir().join(format!("{}.json", run_id));
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let run = serde_json::from_str(&content).map_err(|e| GenerationError::Metadata {
            path,
            message: e.to_string(),
        })?;
        Ok(Some(run))
    }

    /// All recorded run ids, oldest first
    pub fn run_ids(&self) -> Result<Vec<String>, GenerationError> {
        let dir = self.runs_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().into_string().ok())
            .filter_map(|n| n.strip_suffix(".json").map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    /// Most recent successful run, if any
    pub fn latest(&self) -> Result<Option<GenerationRun>, GenerationError> {
        let path = self.latest_path();
        if !path.exists() {
            return Ok(None);
        }
        let run_id = fs::read_to_string(&path)?;
        self.load(run_id.trim())
    }

    /// Snapshot `output_root` into the backup keyed by `run_id`
    pub fn snapshot(&self, output_root: &Path, run_id: &str) -> Result<(), GenerationError> {
        let backup = self.backup_dir(run_id);
        crate::fsops::remove_tree(&backup)?;
        crate::fsops::copy_tree(output_root, &backup)?;
        Ok(())
    }

    /// Restore the backup for `run_id` over `output_root`
    pub fn restore(&self, output_root: &Path, run_id: &str) -> Result<(), RollbackError> {
        let backup = self.backup_dir(run_id);
        if !backup.is_dir() {
            return Err(RollbackError::SnapshotMissing {
                run_id: run_id.to_string(),
            });
        }
        crate::fsops::remove_tree(output_root).map_err(|e| RollbackError::RestoreFailed {
            run_id: run_id.to_string(),
            message: e.to_string(),
        })?;
        crate::fsops::copy_tree(&backup, output_root).map_err(|e| {
            RollbackError::RestoreFailed {
                run_id: run_id.to_string(),
                message: e.to_string(),
            }
        })?;
        Ok(())
    }

    /// Drop the oldest backups beyond the retention window
    ///
    /// Run ids sort chronologically, so lexicographic order is age order.
    /// An `unmanaged-<run_id>` snapshot (a pre-existing tree captured by
    /// the first run) ages by its embedded run id, just before that run's
    /// own backup.
    pub fn prune_backups(&self, keep: usize) -> Result<(), GenerationError> {
        let dir = self.backups_dir();
        if !dir.is_dir() {
            return Ok(());
        }
        let mut names: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort_by_key(|n| {
            let managed = !n.starts_with("unmanaged-");
            (n.strip_prefix("unmanaged-").unwrap_or(n).to_string(), managed)
        });
        while names.len() > keep {
            let victim = names.remove(0);
            crate::fsops::remove_tree(&dir.join(victim))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn sample_domain() -> DomainConfig {
        DomainConfig {
            name: "rentals".to_string(),
            version: "1.0".to_string(),
            entities: vec![],
            relationships: vec![],
            workflows: vec![],
            api_endpoints: vec![],
            ui_components: vec![],
            integrations: vec![],
            business_rules: vec![],
            roles: vec![],
        }
    }

    #[test]
    fn test_run_ids_are_unique() {
        let out = tempdir().unwrap();
        let a = GenerationRun::new(sample_domain(), out.path());
        let b = GenerationRun::new(sample_domain(), out.path());
        assert_ne!(a.run_id, b.run_id);
        assert!(a.run_id.starts_with("run-"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let output_root = dir.path().join("myapp");
        let store = RunStore::for_output_root(&output_root).unwrap();

        let mut run = GenerationRun::new(sample_domain(), &output_root);
        run.status = RunStatus::Succeeded;
        run.artifacts.push(GeneratedArtifact {
            path: PathBuf::from("backend/models/property.py"),
            content_hash: "sha256:abc".to_string(),
            template_used: "model.backend-model".to_string(),
            entity: Some("Property".to_string()),
        });
        store.save(&run).unwrap();

        let loaded = store.load(&run.run_id).unwrap().unwrap();
        assert_eq!(loaded.run_id, run.run_id);
        assert_eq!(loaded.artifacts, run.artifacts);
        assert_eq!(loaded.domain, run.domain);

        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.run_id, run.run_id);
    }

    #[test]
    fn test_failed_run_does_not_become_latest() {
        let dir = tempdir().unwrap();
        let output_root = dir.path().join("myapp");
        let store = RunStore::for_output_root(&output_root).unwrap();

        let mut ok = GenerationRun::new(sample_domain(), &output_root);
        ok.status = RunStatus::Succeeded;
        store.save(&ok).unwrap();

        let mut failed = GenerationRun::new(sample_domain(), &output_root);
        failed.status = RunStatus::Failed;
        store.save(&failed).unwrap();

        assert_eq!(store.latest().unwrap().unwrap().run_id, ok.run_id);
    }

    #[test]
    fn test_store_lives_beside_output_root() {
        let dir = tempdir().unwrap();
        let output_root = dir.path().join("myapp");
        let store = RunStore::for_output_root(&output_root).unwrap();
        assert_eq!(store.root(), dir.path().join(".myapp.appforge"));
    }

    #[test]
    fn test_lock_excludes_second_holder() {
        let dir = tempdir().unwrap();
        let output_root = dir.path().join("myapp");
        let store = RunStore::for_output_root(&output_root).unwrap();

        let guard = store.lock("rentals").unwrap();
        let second = store.lock("rentals");
        assert!(matches!(
            second,
            Err(GenerationError::RunInProgress { .. })
        ));

        drop(guard);
        assert!(store.lock("rentals").is_ok());
    }

    #[test]
    fn test_lock_is_scoped_to_one_output_root() {
        let dir = tempdir().unwrap();
        let store_a = RunStore::for_output_root(&dir.path().join("app_a")).unwrap();
        let store_b = RunStore::for_output_root(&dir.path().join("app_b")).unwrap();

        let _guard = store_a.lock("rentals").unwrap();
        // Same domain, different tree: no contention.
        assert!(store_b.lock("rentals").is_ok());
    }

    #[test]
    fn test_snapshot_and_restore() {
        let dir = tempdir().unwrap();
        let output_root = dir.path().join("myapp");
        fs::create_dir_all(output_root.join("backend")).unwrap();
        fs::write(output_root.join("backend/m.py"), "v1").unwrap();

        let store = RunStore::for_output_root(&output_root).unwrap();
        store.snapshot(&output_root, "run-1").unwrap();

        fs::write(output_root.join("backend/m.py"), "v2").unwrap();
        store.restore(&output_root, "run-1").unwrap();

        assert_eq!(
            fs::read_to_string(output_root.join("backend/m.py")).unwrap(),
            "v1"
        );
    }

    #[test]
    fn test_restore_missing_snapshot_fails() {
        let dir = tempdir().unwrap();
        let output_root = dir.path().join("myapp");
        let store = RunStore::for_output_root(&output_root).unwrap();

        assert!(matches!(
            store.restore(&output_root, "run-x"),
            Err(RollbackError::SnapshotMissing { .. })
        ));
    }

    #[test]
    fn test_prune_backups_keeps_newest() {
        let dir = tempdir().unwrap();
        let output_root = dir.path().join("myapp");
        fs::create_dir_all(&output_root).unwrap();
        fs::write(output_root.join("f"), "x").unwrap();

        let store = RunStore::for_output_root(&output_root).unwrap();
        for id in ["run-1", "run-2", "run-3", "run-4"] {
            store.snapshot(&output_root, id).unwrap();
        }
        store.prune_backups(3).unwrap();

        assert!(!store.backup_dir("run-1").exists());
        assert!(store.backup_dir("run-2").exists());
        assert!(store.backup_dir("run-4").exists());
    }

    #[test]
    fn test_prune_treats_unmanaged_snapshot_as_oldest() {
        let dir = tempdir().unwrap();
        let output_root = dir.path().join("myapp");
        fs::create_dir_all(&output_root).unwrap();
        fs::write(output_root.join("f"), "x").unwrap();

        let store = RunStore::for_output_root(&output_root).unwrap();
        for id in ["unmanaged-run-1", "run-2", "run-3", "run-4"] {
            store.snapshot(&output_root, id).unwrap();
        }
        store.prune_backups(3).unwrap();

        // The pre-existing-tree snapshot ages with the run that displaced
        // it instead of sorting after every run id.
        assert!(!store.backup_dir("unmanaged-run-1").exists());
        assert!(store.backup_dir("run-2").exists());
        assert!(store.backup_dir("run-4").exists());
    }

    #[test]
    fn test_run_ids_sorted_oldest_first() {
        let dir = tempdir().unwrap();
        let output_root = dir.path().join("myapp");
        let store = RunStore::for_output_root(&output_root).unwrap();
        assert!(store.run_ids().unwrap().is_empty());

        let first = GenerationRun::new(sample_domain(), &output_root);
        let second = GenerationRun::new(sample_domain(), &output_root);
        store.save(&second).unwrap();
        store.save(&first).unwrap();

        let mut expected = vec![first.run_id.clone(), second.run_id.clone()];
        expected.sort();
        assert_eq!(store.run_ids().unwrap(), expected);
    }
}
