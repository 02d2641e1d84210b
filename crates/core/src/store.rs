//! State store trait: persistence of run records.
//!
//! Implementations: in-memory (for testing), file-backed JSON snapshots.
//! Exclusive checkout of a run (so two loops never continue the same agent
//! id) is the store's responsibility, not the control loop's.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::run::{RunRecord, RunState, RunSummary};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// The backend name (e.g., "file", "in_memory").
    fn name(&self) -> &str;

    /// Upsert keyed by agent id. Saving the same record twice is a no-op.
    async fn save(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// Load a record; `NotFound` if the id was never saved.
    async fn load(&self, agent_id: &str) -> Result<RunRecord, StoreError>;

    /// Summaries of every persisted run.
    async fn list(&self) -> Result<Vec<RunSummary>, StoreError>;

    /// Partial update used for the `hil` transition.
    async fn update_state(&self, record: &mut RunRecord, state: RunState) -> Result<(), StoreError> {
        if state == RunState::Hil && record.state() != RunState::Hil {
            record
                .enter_hil()
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        } else if record.state() == RunState::Hil && state != RunState::Hil {
            record
                .leave_hil(state)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        } else if record.state() != state {
            record
                .transition(state)
                .map_err(|e| StoreError::Storage(e.to_string()))?;
        }
        self.save(record).await
    }
}
