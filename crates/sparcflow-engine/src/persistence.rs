//! Durable storage of workflow records.
//!
//! [`FileStateStore`] lays records out as
//!
//! ```text
//! <state_dir>/<issue_id>-state.json
//! <state_dir>/<issue_id>/<artifact_key>.md
//! ```
//!
//! The state file is the checkpoint and its write failures are returned to
//! the caller. Artifact files are a convenience copy of `artifacts` and are
//! written best-effort.

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use sparcflow_state::{WorkflowState, document};
use sparcflow_utils::atomic_write::write_file_atomic;
use sparcflow_utils::error::PersistenceError;
use sparcflow_utils::paths;

/// Key/value storage of one [`WorkflowState`] per issue id.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Write the full record. Returns only once the checkpoint is durable.
    async fn save(&self, state: &WorkflowState) -> Result<(), PersistenceError>;

    /// Read the record for `issue_id`; `Ok(None)` when none exists.
    async fn load(&self, issue_id: &str) -> Result<Option<WorkflowState>, PersistenceError>;

    /// Remove the record and its artifacts. Deleting nothing is not an error.
    async fn delete(&self, issue_id: &str) -> Result<(), PersistenceError>;

    /// Directory for cross-process lock files, if the store is shared
    /// between processes.
    fn lock_dir(&self) -> Option<&Utf8Path> {
        None
    }
}

/// Filesystem-backed gateway.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_dir: Utf8PathBuf,
}

impl FileStateStore {
    #[must_use]
    pub fn new(state_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    #[must_use]
    pub fn state_dir(&self) -> &Utf8Path {
        &self.state_dir
    }

    #[must_use]
    pub fn state_path(&self, issue_id: &str) -> Utf8PathBuf {
        paths::state_file(&self.state_dir, issue_id)
    }

    #[must_use]
    pub fn artifact_path(&self, issue_id: &str, key: &str) -> Utf8PathBuf {
        paths::artifact_file(&self.state_dir, issue_id, key)
    }

    /// Mirror non-empty artifacts to `<issue_id>/<key>.md`, logging failures.
    fn write_artifacts(&self, state: &WorkflowState) {
        for (key, text) in state.non_empty_artifacts() {
            if !is_safe_key(key) {
                tracing::warn!(
                    issue_id = %state.issue_id,
                    key = %key,
                    "Skipping artifact with a key that is not a plain file name"
                );
                continue;
            }
            let path = self.artifact_path(&state.issue_id, key);
            if let Err(e) = write_file_atomic(&path, text) {
                tracing::warn!(
                    issue_id = %state.issue_id,
                    path = %path,
                    error = %format!("{e:#}"),
                    "Failed to write artifact file"
                );
            }
        }
    }
}

/// Artifact keys become file names, so only plain names are written.
fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[async_trait]
impl PersistenceGateway for FileStateStore {
    async fn save(&self, state: &WorkflowState) -> Result<(), PersistenceError> {
        let text = document::encode(state).map_err(|e| PersistenceError::Serialize {
            issue_id: state.issue_id.clone(),
            reason: e.to_string(),
        })?;

        let path = self.state_path(&state.issue_id);
        write_file_atomic(&path, &text).map_err(|e| PersistenceError::Write {
            path: path.to_string(),
            reason: format!("{e:#}"),
        })?;

        self.write_artifacts(state);
        Ok(())
    }

    async fn load(&self, issue_id: &str) -> Result<Option<WorkflowState>, PersistenceError> {
        let path = self.state_path(issue_id);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PersistenceError::Read {
                    path: path.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let state = document::decode(&text).map_err(|e| PersistenceError::Corrupted {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        if state.issue_id != issue_id {
            return Err(PersistenceError::Corrupted {
                path: path.to_string(),
                reason: format!("record belongs to issue '{}'", state.issue_id),
            });
        }
        Ok(Some(state))
    }

    async fn delete(&self, issue_id: &str) -> Result<(), PersistenceError> {
        let state_path = self.state_path(issue_id);
        match std::fs::remove_file(&state_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PersistenceError::Delete {
                    path: state_path.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        let dir = paths::artifact_dir(&self.state_dir, issue_id);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PersistenceError::Delete {
                path: dir.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn lock_dir(&self) -> Option<&Utf8Path> {
        Some(&self.state_dir)
    }
}

/// In-process gateway holding encoded documents in memory.
///
/// Records go through the same document encoding as [`FileStateStore`].
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    documents: Mutex<HashMap<String, String>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, issue_id: &str) -> bool {
        self.documents
            .lock()
            .map(|docs| docs.contains_key(issue_id))
            .unwrap_or(false)
    }

    fn poisoned(issue_id: &str) -> PersistenceError {
        PersistenceError::Write {
            path: format!("memory:{issue_id}"),
            reason: "store mutex poisoned".to_string(),
        }
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStateStore {
    async fn save(&self, state: &WorkflowState) -> Result<(), PersistenceError> {
        let text = document::encode(state).map_err(|e| PersistenceError::Serialize {
            issue_id: state.issue_id.clone(),
            reason: e.to_string(),
        })?;
        self.documents
            .lock()
            .map_err(|_| Self::poisoned(&state.issue_id))?
            .insert(state.issue_id.clone(), text);
        Ok(())
    }

    async fn load(&self, issue_id: &str) -> Result<Option<WorkflowState>, PersistenceError> {
        let text = self
            .documents
            .lock()
            .map_err(|_| Self::poisoned(issue_id))?
            .get(issue_id)
            .cloned();
        text.map(|t| {
            document::decode(&t).map_err(|e| PersistenceError::Corrupted {
                path: format!("memory:{issue_id}"),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    async fn delete(&self, issue_id: &str) -> Result<(), PersistenceError> {
        self.documents
            .lock()
            .map_err(|_| Self::poisoned(issue_id))?
            .remove(issue_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparcflow_state::{WorkflowInput, create_initial_state};
    use sparcflow_utils::types::{Mode, PhaseId};
    use tempfile::TempDir;

    fn store() -> (FileStateStore, TempDir) {
        let td = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(td.path().join("workflows")).unwrap();
        (FileStateStore::new(dir), td)
    }

    fn sample() -> WorkflowState {
        let mut state = create_initial_state(&WorkflowInput::new("t1", Mode::Build, "X", "build X"));
        state.current_phase = PhaseId::Testing;
        state.progress = 50;
        state.set_artifact("implementation", "# Implementation\nstep 1");
        state.set_artifact("empty", "");
        state
            .metadata
            .performance
            .node_execution_times
            .insert("implementation".to_string(), 42);
        state
            .metadata
            .performance
            .tool_usage_counts
            .insert("template_render".to_string(), 2);
        state
            .metadata
            .performance
            .error_rates
            .insert("implementation".to_string(), 0.0);
        state
    }

    #[tokio::test]
    async fn test_save_then_load_round_trips() {
        let (store, _td) = store();
        let state = sample();
        store.save(&state).await.unwrap();

        let back = store.load("t1").await.unwrap().unwrap();
        assert_eq!(back.current_phase, state.current_phase);
        assert_eq!(back.current_mode, state.current_mode);
        assert_eq!(back.progress, state.progress);
        assert_eq!(back.artifacts, state.artifacts);
        assert_eq!(back.metadata.performance, state.metadata.performance);
        assert_eq!(back.created_at, state.created_at);
    }

    #[tokio::test]
    async fn test_layout_on_disk() {
        let (store, _td) = store();
        store.save(&sample()).await.unwrap();

        assert!(store.state_dir().join("t1-state.json").is_file());
        let artifact = store.artifact_path("t1", "implementation");
        assert_eq!(
            std::fs::read_to_string(&artifact).unwrap(),
            "# Implementation\nstep 1"
        );
        assert!(!store.artifact_path("t1", "empty").exists());
    }

    #[tokio::test]
    async fn test_artifact_file_matches_status_hash() {
        let (store, _td) = store();
        let mut state = sample();
        state.set_artifact("notes", "line one\r\nline two\r\n");
        store.save(&state).await.unwrap();

        let on_disk = std::fs::read_to_string(store.artifact_path("t1", "notes")).unwrap();
        assert_eq!(on_disk, "line one\r\nline two\r\n");

        let status = crate::report::WorkflowStatus::from_state(&state);
        let notes = status.artifacts.iter().find(|a| a.key == "notes").unwrap();
        assert_eq!(notes.hash, sparcflow_utils::canonicalization::short_hash(&on_disk));
        assert_eq!(notes.bytes, on_disk.len());
    }

    #[tokio::test]
    async fn test_unsafe_artifact_keys_are_not_written() {
        let (store, _td) = store();
        let mut state = sample();
        state.set_artifact("../escape", "nope");
        store.save(&state).await.unwrap();

        assert!(!store.state_dir().join("escape.md").exists());
        let back = store.load("t1").await.unwrap().unwrap();
        assert_eq!(back.artifact("../escape"), Some("nope"));
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let (store, _td) = store();
        assert!(store.load("nothing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupted_record() {
        let (store, _td) = store();
        std::fs::create_dir_all(store.state_dir()).unwrap();
        std::fs::write(store.state_path("bad"), "{ not json").unwrap();

        assert!(matches!(
            store.load("bad").await,
            Err(PersistenceError::Corrupted { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_under_wrong_name_is_corrupted() {
        let (store, _td) = store();
        store.save(&sample()).await.unwrap();
        std::fs::rename(store.state_path("t1"), store.state_path("t2")).unwrap();

        assert!(matches!(
            store.load("t2").await,
            Err(PersistenceError::Corrupted { reason, .. }) if reason.contains("t1")
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _td) = store();
        store.save(&sample()).await.unwrap();

        store.delete("t1").await.unwrap();
        assert!(!store.state_path("t1").exists());
        assert!(!paths::artifact_dir(store.state_dir(), "t1").exists());

        store.delete("t1").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_round_trips() {
        let store = MemoryStateStore::new();
        let state = sample();
        store.save(&state).await.unwrap();
        assert!(store.contains("t1"));
        assert_eq!(store.load("t1").await.unwrap().unwrap(), state);

        store.delete("t1").await.unwrap();
        store.delete("t1").await.unwrap();
        assert!(store.load("t1").await.unwrap().is_none());
        assert!(store.lock_dir().is_none());
    }
}
