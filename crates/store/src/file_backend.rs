//! File-based state store: one pretty-printed JSON snapshot per run.
//!
//! Storage location: `~/.stepwise/runs/<agent_id>.json` by default.
//! Snapshots are written to a temporary file and renamed into place, so a
//! crash mid-write never leaves a truncated record behind.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use stepwise_core::error::StoreError;
use stepwise_core::run::{RunRecord, RunSummary};
use stepwise_core::store::StateStore;
use tracing::{debug, warn};

pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, agent_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !agent_id.is_empty()
            && agent_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::Storage(format!("Invalid agent id: {agent_id:?}")));
        }
        Ok(self.dir.join(format!("{agent_id}.json")))
    }

    async fn read_record(path: &Path) -> Result<RunRecord, StoreError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        let path = self.path_for(record.agent_id())?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            StoreError::Storage(format!("Failed to create run directory: {e}"))
        })?;

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to write run record: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to replace run record: {e}")))?;

        debug!(agent_id = %record.agent_id(), state = %record.state(), "Run record saved");
        Ok(())
    }

    async fn load(&self, agent_id: &str) -> Result<RunRecord, StoreError> {
        let path = self.path_for(agent_id)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::NotFound(agent_id.to_string()));
        }
        Self::read_record(&path).await
    }

    async fn list(&self) -> Result<Vec<RunSummary>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            // Nothing saved yet
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Storage(format!("Failed to list runs: {e}"))),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_record(&path).await {
                Ok(record) => summaries.push(record.summary()),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable run record"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::run::{Invocation, InvocationRecord, RunState};
    use tempfile::TempDir;

    #[tokio::test]
    async fn persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let mut record = RunRecord::new("tester", "write a haiku");
        record.memory.insert("draft", "old pond");
        record.add_cost(0.42).unwrap();
        record.record_invocation(InvocationRecord::success(
            Invocation::new("Calc.add").with_param("a", 1).with_param("b", 2),
            &serde_json::json!(3),
        ));

        FileStateStore::new(dir.path()).save(&record).await.unwrap();

        let reopened = FileStateStore::new(dir.path());
        let loaded = reopened.load(record.agent_id()).await.unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        assert!(matches!(
            store.load("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_path_like_ids() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        assert!(matches!(
            store.load("../etc/passwd").await,
            Err(StoreError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn list_skips_corrupted_files() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path());
        let mut record = RunRecord::new("tester", "goal");
        store.update_state(&mut record, RunState::Hil).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let summaries = store.list().await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].state, RunState::Hil);
    }

    #[tokio::test]
    async fn list_without_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }
}
