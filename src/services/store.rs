//! In-memory project store with whole-snapshot persistence.
//!
//! Every mutation runs under one lock, is written to the snapshot before the
//! lock is released, and is rolled back in memory if that write fails.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

use crate::domain::{Project, ProjectSummary, Scope};
use crate::error::{ApiError, ApiResult};

/// Project id to project, as persisted.
pub type ProjectTable = BTreeMap<String, Project>;

/// Durable storage for the full project table.
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when no snapshot has been written yet.
    fn load(&self) -> Result<Option<ProjectTable>>;

    fn save(&self, table: &ProjectTable) -> Result<()>;
}

/// Snapshot kept as one JSON file, replaced atomically on every save.
pub struct JsonFileSnapshot {
    path: PathBuf,
}

impl JsonFileSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SnapshotStore for JsonFileSnapshot {
    fn load(&self) -> Result<Option<ProjectTable>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        let table = serde_json::from_slice(&bytes)
            .with_context(|| format!("Corrupt snapshot at {}", self.path.display()))?;
        Ok(Some(table))
    }

    fn save(&self, table: &ProjectTable) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        // Write beside the target then rename over it
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .context("Failed to create temporary snapshot file")?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, table)
                .context("Failed to serialize project table")?;
            writer.flush().context("Failed to write snapshot")?;
        }
        tmp.as_file().sync_all().context("Failed to sync snapshot")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), projects = table.len(), "Snapshot written");
        Ok(())
    }
}

/// Snapshot held in memory as serialized JSON.
#[cfg(test)]
#[derive(Default)]
pub struct MemorySnapshot {
    json: Mutex<Option<String>>,
    fail_writes: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemorySnapshot {
    pub fn with_contents(json: impl Into<String>) -> Self {
        Self {
            json: Mutex::new(Some(json.into())),
            ..Self::default()
        }
    }

    /// Overwrite the stored JSON without going through a store.
    pub fn replace(&self, json: impl Into<String>) {
        *self.json.lock() = Some(json.into());
    }

    pub fn contents(&self) -> Option<String> {
        self.json.lock().clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl SnapshotStore for MemorySnapshot {
    fn load(&self) -> Result<Option<ProjectTable>> {
        match self.json.lock().as_deref() {
            None => Ok(None),
            Some(json) => Ok(Some(
                serde_json::from_str(json).context("Corrupt in-memory snapshot")?,
            )),
        }
    }

    fn save(&self, table: &ProjectTable) -> Result<()> {
        if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("snapshot writes are disabled");
        }
        *self.json.lock() = Some(serde_json::to_string(table)?);
        Ok(())
    }
}

/// Process-wide table of projects.
pub struct ProjectStore {
    projects: Mutex<ProjectTable>,
    snapshot: Arc<dyn SnapshotStore>,
}

impl ProjectStore {
    /// Create a store and restore whatever the snapshot holds.
    pub fn open(snapshot: Arc<dyn SnapshotStore>) -> Self {
        let store = Self {
            projects: Mutex::new(ProjectTable::new()),
            snapshot,
        };
        store.reload();
        store
    }

    /// Replace the in-memory table with the snapshot.
    ///
    /// A missing or unreadable snapshot leaves the store empty.
    pub fn reload(&self) {
        let table = match self.snapshot.load() {
            Ok(Some(table)) => {
                info!(projects = table.len(), "Project store restored from snapshot");
                table
            }
            Ok(None) => {
                info!("No snapshot found, starting with an empty project store");
                ProjectTable::new()
            }
            Err(e) => {
                error!(error = ?e, "Snapshot unreadable, starting with an empty project store");
                ProjectTable::new()
            }
        };
        *self.projects.lock() = table;
    }

    /// Write the current table to the snapshot.
    pub fn persist(&self) -> Result<()> {
        let guard = self.projects.lock();
        self.snapshot.save(&guard)
    }

    pub fn len(&self) -> usize {
        self.projects.lock().len()
    }

    #[instrument(skip(self))]
    pub fn create_project(&self, project_name: &str) -> ApiResult<Project> {
        let project_name = project_name.trim();
        if project_name.is_empty() {
            return Err(ApiError::validation("project_name must not be empty"));
        }

        let project = Project::new(project_name);
        let created = project.clone();
        self.mutate(move |table| {
            table.insert(project.id.clone(), project);
            Ok(())
        })?;

        info!(project_id = %created.id, "Project created");
        Ok(created)
    }

    pub fn get_project(&self, project_id: &str) -> ApiResult<Project> {
        self.projects
            .lock()
            .get(project_id)
            .cloned()
            .ok_or_else(|| ApiError::project_not_found(project_id))
    }

    /// Id and name of every project, oldest first.
    pub fn list_projects(&self) -> Vec<ProjectSummary> {
        let guard = self.projects.lock();
        let mut projects: Vec<&Project> = guard.values().collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        projects.into_iter().map(Project::summary).collect()
    }

    #[instrument(skip(self))]
    pub fn delete_project(&self, project_id: &str) -> ApiResult<()> {
        self.mutate(|table| {
            table
                .remove(project_id)
                .map(|_| ())
                .ok_or_else(|| ApiError::project_not_found(project_id))
        })?;

        info!(project_id = %project_id, "Project deleted");
        Ok(())
    }

    pub fn find_scope(&self, project_id: &str, scope_id: &str) -> ApiResult<Scope> {
        let guard = self.projects.lock();
        let project = guard
            .get(project_id)
            .ok_or_else(|| ApiError::project_not_found(project_id))?;
        project
            .scope(scope_id)
            .cloned()
            .ok_or_else(|| ApiError::scope_not_found(project_id, scope_id))
    }

    /// Apply `f` to a project and persist.
    pub fn update_project<R>(
        &self,
        project_id: &str,
        f: impl FnOnce(&mut Project) -> ApiResult<R>,
    ) -> ApiResult<R> {
        self.mutate(|table| {
            let project = table
                .get_mut(project_id)
                .ok_or_else(|| ApiError::project_not_found(project_id))?;
            f(project)
        })
    }

    /// Apply `f` to a scope and persist.
    pub fn update_scope<R>(
        &self,
        project_id: &str,
        scope_id: &str,
        f: impl FnOnce(&mut Scope) -> ApiResult<R>,
    ) -> ApiResult<R> {
        self.update_project(project_id, |project| {
            let scope = project
                .scope_mut(scope_id)
                .ok_or_else(|| ApiError::scope_not_found(project_id, scope_id))?;
            f(scope)
        })
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut ProjectTable) -> ApiResult<R>) -> ApiResult<R> {
        let mut guard = self.projects.lock();
        // Whole-table copy for rollback, so each mutation costs O(all projects)
        let previous = guard.clone();

        let output = match f(&mut *guard) {
            Ok(output) => output,
            Err(e) => {
                *guard = previous;
                return Err(e);
            }
        };

        if let Err(e) = self.snapshot.save(&guard) {
            *guard = previous;
            return Err(ApiError::Internal(
                e.context("Failed to persist project store"),
            ));
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ai::AiExtractionResult;
    use crate::domain::EstimateLineItem;

    fn memory_store() -> (ProjectStore, Arc<MemorySnapshot>) {
        let snapshot = Arc::new(MemorySnapshot::default());
        (ProjectStore::open(snapshot.clone()), snapshot)
    }

    fn add_scope(store: &ProjectStore, project_id: &str, work: &str) -> Scope {
        let scope = Scope::new(work, None, AiExtractionResult::failure("none"));
        let added = scope.clone();
        store
            .update_project(project_id, |p| {
                p.scopes.push(scope);
                Ok(())
            })
            .unwrap();
        added
    }

    #[test]
    fn created_project_starts_empty_and_is_persisted() {
        let (store, snapshot) = memory_store();
        let project = store.create_project("Acme Tower").unwrap();

        let fetched = store.get_project(&project.id).unwrap();
        assert_eq!(fetched.project_name, "Acme Tower");
        assert!(fetched.scopes.is_empty());
        assert!(snapshot.contents().unwrap().contains("Acme Tower"));
    }

    #[test]
    fn blank_project_name_is_rejected() {
        let (store, _) = memory_store();
        assert!(matches!(
            store.create_project("   "),
            Err(ApiError::Validation(_))
        ));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn list_is_a_projection_in_creation_order() {
        let (store, _) = memory_store();
        let first = store.create_project("First").unwrap();
        let second = store.create_project("Second").unwrap();
        add_scope(&store, &first.id, "roofing");

        let listed = store.list_projects();
        assert_eq!(listed, vec![first.summary(), second.summary()]);
        let json = serde_json::to_value(&listed).unwrap();
        assert!(json[0].get("scopes").is_none());
    }

    #[test]
    fn delete_cascades_and_subsequent_lookups_fail() {
        let (store, _) = memory_store();
        let project = store.create_project("Doomed").unwrap();
        let scope = add_scope(&store, &project.id, "roofing");

        store.delete_project(&project.id).unwrap();

        assert!(store.list_projects().is_empty());
        assert!(matches!(
            store.get_project(&project.id),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            store.find_scope(&project.id, &scope.scope_id),
            Err(ApiError::NotFound(_))
        ));
        assert!(matches!(
            store.delete_project(&project.id),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn find_scope_distinguishes_missing_project_and_scope() {
        let (store, _) = memory_store();
        let project = store.create_project("P").unwrap();

        let ApiError::NotFound(no_project) = store.find_scope("nope", "s").unwrap_err() else {
            panic!("expected not found");
        };
        assert!(no_project.starts_with("Project"));

        let ApiError::NotFound(no_scope) = store.find_scope(&project.id, "s").unwrap_err() else {
            panic!("expected not found");
        };
        assert!(no_scope.starts_with("Scope"));
    }

    #[test]
    fn failed_write_rolls_back_mutation() {
        let (store, snapshot) = memory_store();
        let project = store.create_project("Kept").unwrap();
        snapshot.set_fail_writes(true);

        assert!(matches!(
            store.create_project("Lost"),
            Err(ApiError::Internal(_))
        ));
        assert!(matches!(
            store.delete_project(&project.id),
            Err(ApiError::Internal(_))
        ));
        assert_eq!(store.list_projects(), vec![project.summary()]);
    }

    #[test]
    fn failed_update_leaves_table_untouched() {
        let (store, _) = memory_store();
        let project = store.create_project("P").unwrap();

        let result: ApiResult<()> = store.update_project(&project.id, |p| {
            p.project_name = "changed".into();
            Err(ApiError::validation("nope"))
        });

        assert!(result.is_err());
        assert_eq!(store.get_project(&project.id).unwrap().project_name, "P");
    }

    #[test]
    fn file_snapshot_round_trips_full_graph() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("projects_db.json");
        let store = ProjectStore::open(Arc::new(JsonFileSnapshot::new(&path)));

        let project = store.create_project("Acme Tower").unwrap();
        let scope = add_scope(&store, &project.id, "roofing");
        store
            .update_scope(&project.id, &scope.scope_id, |s| {
                let mut item = EstimateLineItem::new("Coping", 10.0, "LF");
                item.set_unit_price(2.5);
                s.estimate_data = vec![item, EstimateLineItem::new("Trim", 0.0, "LF")];
                Ok(())
            })
            .unwrap();
        let before = store.get_project(&project.id).unwrap();

        let reopened = ProjectStore::open(Arc::new(JsonFileSnapshot::new(&path)));
        assert_eq!(reopened.get_project(&project.id).unwrap(), before);
        assert_eq!(reopened.list_projects(), store.list_projects());
    }

    #[test]
    fn snapshot_uses_documented_keys() {
        let (store, snapshot) = memory_store();
        let project = store.create_project("P").unwrap();
        add_scope(&store, &project.id, "roofing");

        let json: serde_json::Value =
            serde_json::from_str(&snapshot.contents().unwrap()).unwrap();
        let stored = &json[&project.id];
        assert_eq!(stored["id"], project.id.as_str());
        assert_eq!(stored["project_name"], "P");
        let scope = &stored["scopes"][0];
        for key in [
            "scope_id",
            "scope_of_work",
            "spec_filename",
            "ai_summary",
            "estimate_data",
            "estimate_analysis",
        ] {
            assert!(scope.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn missing_or_corrupt_snapshot_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = ProjectStore::open(Arc::new(JsonFileSnapshot::new(
            dir.path().join("absent.json"),
        )));
        assert_eq!(missing.len(), 0);

        let corrupt_path = dir.path().join("corrupt.json");
        std::fs::write(&corrupt_path, "{ not json").unwrap();
        let corrupt = ProjectStore::open(Arc::new(JsonFileSnapshot::new(&corrupt_path)));
        assert_eq!(corrupt.len(), 0);

        // Still writable afterwards
        corrupt.create_project("Fresh").unwrap();
        let reopened = ProjectStore::open(Arc::new(JsonFileSnapshot::new(&corrupt_path)));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn reload_restores_snapshot_and_discards_memory() {
        let snapshot = Arc::new(MemorySnapshot::with_contents("{}"));
        let store = ProjectStore::open(snapshot.clone());
        let saved = store.create_project("Saved").unwrap();
        let checkpoint = snapshot.contents().unwrap();

        let extra = store.create_project("Extra").unwrap();
        add_scope(&store, &saved.id, "roofing");
        snapshot.replace(checkpoint.clone());

        store.reload();

        assert_eq!(store.list_projects(), vec![saved.summary()]);
        assert!(store.get_project(&saved.id).unwrap().scopes.is_empty());
        assert!(matches!(
            store.get_project(&extra.id),
            Err(ApiError::NotFound(_))
        ));

        store.persist().unwrap();
        let rewritten: ProjectTable =
            serde_json::from_str(&snapshot.contents().unwrap()).unwrap();
        let original: ProjectTable = serde_json::from_str(&checkpoint).unwrap();
        assert_eq!(rewritten, original);
    }
}
