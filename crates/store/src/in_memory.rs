//! In-memory store: useful for testing and ephemeral runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use stepwise_core::error::StoreError;
use stepwise_core::run::{RunRecord, RunSummary};
use stepwise_core::store::StateStore;
use tokio::sync::RwLock;

/// Keeps snapshots in a map. Loads return copies, so a caller mutating its
/// record never changes what is stored until it saves again.
pub struct InMemoryStateStore {
    records: Arc<RwLock<HashMap<String, RunRecord>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored runs.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.agent_id().to_string(), record.clone());
        Ok(())
    }

    async fn load(&self, agent_id: &str) -> Result<RunRecord, StoreError> {
        self.records
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(agent_id.to_string()))
    }

    async fn list(&self) -> Result<Vec<RunSummary>, StoreError> {
        let mut summaries: Vec<RunSummary> = self
            .records
            .read()
            .await
            .values()
            .map(RunRecord::summary)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}
