//! Shared test doubles for control-loop tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use stepwise_core::error::{GenerationError, SignalError, StoreError};
use stepwise_core::generation::{GenerationPort, GenerationResult};
use stepwise_core::run::{Invocation, RunRecord, RunSummary};
use stepwise_core::signal::{ExternalSignal, SignalRequest};
use stepwise_core::store::StateStore;
use stepwise_store::InMemoryStateStore;

/// A generation port that replays scripted results in order and records
/// every prompt it was sent.
///
/// Panics if called more times than it has results.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<GenerationResult, GenerationError>>>,
    prompts: Mutex<Vec<String>>,
    system_prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<Result<GenerationResult, GenerationError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
            system_prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.system_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationPort for ScriptedGenerator {
    fn display_name(&self) -> &str {
        "scripted"
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<GenerationResult, GenerationError> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len()
        };
        self.system_prompts.lock().unwrap().push(system_prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedGenerator: no response scripted for call #{call}"))
    }
}

/// A model answer requesting `invocations`.
pub fn calls(invocations: Vec<Invocation>) -> Result<GenerationResult, GenerationError> {
    Ok(GenerationResult::new("Working on it.", invocations))
}

/// Like [`calls`], with a cost for the generation.
pub fn costing(cost: f64, invocations: Vec<Invocation>) -> Result<GenerationResult, GenerationError> {
    Ok(GenerationResult::new("Working on it.", invocations).with_cost(cost))
}

pub fn complete() -> Invocation {
    Invocation::new("Agent.completed").with_param("note", "done")
}

pub fn add(a: i64, b: i64) -> Invocation {
    Invocation::new("Calc.add").with_param("a", a).with_param("b", b)
}

/// Acknowledges immediately and keeps every request for inspection.
#[derive(Default)]
pub struct RecordingSignal {
    requests: Mutex<Vec<SignalRequest>>,
}

impl RecordingSignal {
    pub fn requests(&self) -> Vec<SignalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalSignal for RecordingSignal {
    async fn await_signal(&self, request: &SignalRequest) -> Result<(), SignalError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

/// An in-memory store that also keeps a copy of every saved snapshot.
#[derive(Default)]
pub struct SnapshotStore {
    inner: InMemoryStateStore,
    snapshots: Mutex<Vec<RunRecord>>,
}

impl SnapshotStore {
    pub fn snapshots(&self) -> Vec<RunRecord> {
        self.snapshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl StateStore for SnapshotStore {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn save(&self, record: &RunRecord) -> Result<(), StoreError> {
        self.snapshots.lock().unwrap().push(record.clone());
        self.inner.save(record).await
    }

    async fn load(&self, agent_id: &str) -> Result<RunRecord, StoreError> {
        self.inner.load(agent_id).await
    }

    async fn list(&self) -> Result<Vec<RunSummary>, StoreError> {
        self.inner.list().await
    }
}
