//! Run record: the persisted state of one agent execution.
//!
//! A [`RunRecord`] is created when a run starts (or rehydrated from a state
//! store when resuming) and is mutated only by the control loop that owns it.
//! The fields that carry invariants (id, state, cost, call history) are
//! private and change only through the methods below.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::error::RunError;

/// Where a run currently is in the control-loop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Awaiting the model's next decision.
    Agent,
    /// Dispatching the invocations the model requested.
    Functions,
    /// Suspended until a supervisor answers a feedback request.
    Feedback,
    /// Suspended by the budget guard until a human confirms.
    Hil,
    /// Finished successfully.
    Completed,
    /// Finished with a failure.
    Error,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Agent => "agent",
            RunState::Functions => "functions",
            RunState::Feedback => "feedback",
            RunState::Hil => "hil",
            RunState::Completed => "completed",
            RunState::Error => "error",
        }
    }

    /// `completed` and `error` end a run.
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Error)
    }

    /// Whether `self -> next` is an edge of the state machine.
    ///
    /// Leaving `hil` is not an edge: the held state is restored through
    /// [`RunRecord::leave_hil`].
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Agent, Functions)
                | (Agent, Error)
                | (Functions, Completed)
                | (Functions, Feedback)
                | (Functions, Agent)
                | (Functions, Error)
                | (Agent, Hil)
                | (Functions, Hil)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single requested call to a tool operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Qualified operation name, `"Tool.method"`.
    pub tool_name: String,

    /// Parameter name to value, in the order the model supplied them.
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl Invocation {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: serde_json::Map::new(),
        }
    }

    /// Append a parameter (builder style).
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Outcome of one dispatched invocation. Serialized as a single
/// `"stdout"` or `"error"` key next to the invocation fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationOutcome {
    Stdout(String),
    Error(String),
}

/// An invocation together with its result, as kept in the call history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRecord {
    #[serde(flatten)]
    pub invocation: Invocation,

    #[serde(flatten)]
    pub outcome: InvocationOutcome,
}

impl InvocationRecord {
    /// Record a successful call; the payload is stored JSON-serialized.
    pub fn success(invocation: Invocation, payload: &serde_json::Value) -> Self {
        Self {
            invocation,
            outcome: InvocationOutcome::Stdout(payload.to_string()),
        }
    }

    pub fn failure(invocation: Invocation, error: impl fmt::Display) -> Self {
        Self {
            invocation,
            outcome: InvocationOutcome::Error(error.to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, InvocationOutcome::Error(_))
    }

    /// The stdout payload or the error description.
    pub fn output(&self) -> &str {
        match &self.outcome {
            InvocationOutcome::Stdout(s) | InvocationOutcome::Error(s) => s,
        }
    }
}

/// The agent's key/value scratch memory. Keys are unique and iteration
/// follows insertion order, which is the order rendered into prompts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Memory {
    entries: Vec<(String, String)>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. An overwritten key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, content: impl Into<String>) -> Option<String> {
        let key = key.into();
        let content = content.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, content)),
            None => {
                self.entries.push((key, content));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Memory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|(k, v)| (k, v)))
    }
}

impl<'de> Deserialize<'de> for Memory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MemoryVisitor;

        impl<'de> Visitor<'de> for MemoryVisitor {
            type Value = Memory;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of memory keys to text")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Memory, A::Error> {
                let mut memory = Memory::new();
                while let Some((key, content)) = access.next_entry::<String, String>()? {
                    memory.insert(key, content);
                }
                Ok(memory)
            }
        }

        deserializer.deserialize_map(MemoryVisitor)
    }
}

/// Names of the generation capabilities a run was started with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTierSet {
    pub easy: String,
    pub medium: String,
    pub hard: String,
    pub xhard: String,
}

/// A compact listing entry for a persisted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub agent_id: String,
    pub agent_name: String,
    pub state: RunState,
    pub cost: f64,
    pub updated_at: DateTime<Utc>,
}

/// The mutable, persisted state of one agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    agent_id: String,

    pub agent_name: String,

    state: RunState,

    #[serde(default)]
    pub model_tiers: ModelTierSet,

    #[serde(default)]
    pub memory: Memory,

    #[serde(default)]
    function_call_history: Vec<InvocationRecord>,

    /// Invocations requested by the model in the current step.
    #[serde(default)]
    pub invoking: Vec<Invocation>,

    cost: f64,

    /// The instruction text the next step will send (after history and memory).
    #[serde(default)]
    pub input_prompt: String,

    /// The goal the run was started with.
    #[serde(default)]
    pub user_prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Names of the tools registered when the run was last executed.
    #[serde(default)]
    pub tools: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// A fresh run in state `agent` with a newly generated id.
    pub fn new(agent_name: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), agent_name, user_prompt)
    }

    pub fn with_id(
        agent_id: impl Into<String>,
        agent_name: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Self {
        let user_prompt = user_prompt.into();
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            agent_name: agent_name.into(),
            state: RunState::Agent,
            model_tiers: ModelTierSet::default(),
            memory: Memory::new(),
            function_call_history: Vec::new(),
            invoking: Vec::new(),
            cost: 0.0,
            input_prompt: user_prompt.clone(),
            user_prompt,
            error: None,
            tools: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn function_call_history(&self) -> &[InvocationRecord] {
        &self.function_call_history
    }

    /// Move along an edge of the state machine. Returns the previous state.
    pub fn transition(&mut self, next: RunState) -> Result<RunState, RunError> {
        if !self.state.can_transition_to(next) {
            return Err(RunError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        Ok(self.set_state(next))
    }

    /// Enter `hil`, returning the state to restore afterwards.
    pub fn enter_hil(&mut self) -> Result<RunState, RunError> {
        self.transition(RunState::Hil)
    }

    /// Restore the state held before a budget pause.
    pub fn leave_hil(&mut self, held: RunState) -> Result<(), RunError> {
        if self.state != RunState::Hil || !held.can_transition_to(RunState::Hil) {
            return Err(RunError::InvalidTransition {
                from: self.state,
                to: held,
            });
        }
        self.set_state(held);
        Ok(())
    }

    /// End the run in `error` with the given description.
    pub fn fail(&mut self, description: impl Into<String>) -> Result<(), RunError> {
        self.transition(RunState::Error)?;
        self.error = Some(description.into());
        Ok(())
    }

    /// Re-open a persisted run so a control loop can continue it.
    ///
    /// This is an operator action, not a state-machine edge. Pending
    /// invocations are discarded; they are never re-dispatched.
    pub fn reopen(&mut self) -> Result<RunState, RunError> {
        if self.state == RunState::Completed {
            return Err(RunError::AlreadyCompleted(self.agent_id.clone()));
        }
        self.invoking.clear();
        self.error = None;
        Ok(self.set_state(RunState::Agent))
    }

    pub fn add_cost(&mut self, delta: f64) -> Result<(), RunError> {
        if !delta.is_finite() || delta < 0.0 {
            return Err(RunError::NegativeCost(delta));
        }
        self.cost += delta;
        Ok(())
    }

    /// Append to the call history. History is never reordered or pruned.
    pub fn record_invocation(&mut self, record: InvocationRecord) {
        self.function_call_history.push(record);
        self.updated_at = Utc::now();
    }

    /// Replace the output of the trailing history entry, provided it is a
    /// call to `tool_name`. Used to deliver supervisor feedback.
    pub fn answer_last(&mut self, tool_name: &str, output: impl Into<String>) -> bool {
        match self.function_call_history.last_mut() {
            Some(last) if last.invocation.tool_name == tool_name => {
                last.outcome = InvocationOutcome::Stdout(output.into());
                true
            }
            _ => false,
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            agent_id: self.agent_id.clone(),
            agent_name: self.agent_name.clone(),
            state: self.state,
            cost: self.cost,
            updated_at: self.updated_at,
        }
    }

    fn set_state(&mut self, next: RunState) -> RunState {
        self.updated_at = Utc::now();
        std::mem::replace(&mut self.state, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ALL: [RunState; 6] = [
        RunState::Agent,
        RunState::Functions,
        RunState::Feedback,
        RunState::Hil,
        RunState::Completed,
        RunState::Error,
    ];

    #[test]
    fn only_documented_edges_exist() {
        let allowed = [
            (RunState::Agent, RunState::Functions),
            (RunState::Agent, RunState::Error),
            (RunState::Functions, RunState::Completed),
            (RunState::Functions, RunState::Feedback),
            (RunState::Functions, RunState::Agent),
            (RunState::Functions, RunState::Error),
            (RunState::Agent, RunState::Hil),
            (RunState::Functions, RunState::Hil),
        ];
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        let mut record = RunRecord::new("test", "goal");
        record.transition(RunState::Functions).unwrap();
        record.transition(RunState::Completed).unwrap();
        for to in ALL {
            assert!(record.transition(to).is_err());
        }
        assert_eq!(record.state(), RunState::Completed);
    }

    #[test]
    fn hil_restores_held_state() {
        let mut record = RunRecord::new("test", "goal");
        let held = record.enter_hil().unwrap();
        assert_eq!(record.state(), RunState::Hil);
        record.leave_hil(held).unwrap();
        assert_eq!(record.state(), RunState::Agent);
    }

    #[test]
    fn leave_hil_requires_hil() {
        let mut record = RunRecord::new("test", "goal");
        assert!(record.leave_hil(RunState::Agent).is_err());
    }

    #[test]
    fn cost_never_decreases() {
        let mut record = RunRecord::new("test", "goal");
        record.add_cost(0.25).unwrap();
        assert!(record.add_cost(-0.1).is_err());
        assert!(record.add_cost(f64::NAN).is_err());
        assert!((record.cost() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn fail_sets_error_description() {
        let mut record = RunRecord::new("test", "goal");
        record.fail("boom").unwrap();
        assert_eq!(record.state(), RunState::Error);
        assert_eq!(record.error.as_deref(), Some("boom"));
    }

    #[test]
    fn reopen_refuses_completed_runs() {
        let mut record = RunRecord::new("test", "goal");
        record.transition(RunState::Functions).unwrap();
        record.transition(RunState::Feedback).unwrap();
        record.invoking.push(Invocation::new("Agent.requestFeedback"));
        assert_eq!(record.reopen().unwrap(), RunState::Feedback);
        assert_eq!(record.state(), RunState::Agent);
        assert!(record.invoking.is_empty());

        record.transition(RunState::Functions).unwrap();
        record.transition(RunState::Completed).unwrap();
        assert!(matches!(record.reopen(), Err(RunError::AlreadyCompleted(_))));
    }

    #[test]
    fn memory_preserves_insertion_order() {
        let mut memory = Memory::new();
        memory.insert("zeta", "1");
        memory.insert("alpha", "2");
        memory.insert("zeta", "3");
        let keys: Vec<_> = memory.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(memory.get("zeta"), Some("3"));

        let json = serde_json::to_string(&memory).unwrap();
        assert_eq!(json, r#"{"zeta":"3","alpha":"2"}"#);
        let parsed: Memory = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, memory);
    }

    #[test]
    fn invocation_record_serializes_flat() {
        let invocation = Invocation::new("Calc.add").with_param("a", 2).with_param("b", 3);
        let record = InvocationRecord::success(invocation, &json!(5));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({"tool_name": "Calc.add", "parameters": {"a": 2, "b": 3}, "stdout": "5"})
        );

        let failed: InvocationRecord = serde_json::from_value(json!({
            "tool_name": "Foo.bar",
            "parameters": {},
            "error": "Tool Foo does not exist"
        }))
        .unwrap();
        assert!(failed.is_error());
        assert_eq!(failed.output(), "Tool Foo does not exist");
    }

    #[test]
    fn snapshot_uses_camel_case_layout() {
        let mut record = RunRecord::with_id("a-1", "tester", "do things");
        record.memory.insert("plan", "step one");
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["agentId"], "a-1");
        assert_eq!(value["agentName"], "tester");
        assert_eq!(value["state"], "agent");
        assert_eq!(value["inputPrompt"], "do things");
        assert_eq!(value["memory"]["plan"], "step one");
        assert!(value["functionCallHistory"].as_array().unwrap().is_empty());
        assert!(value.get("error").is_none());

        let parsed: RunRecord = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn answer_last_only_touches_matching_call() {
        let mut record = RunRecord::new("test", "goal");
        record.record_invocation(InvocationRecord::success(
            Invocation::new("Agent.requestFeedback").with_param("request", "which db?"),
            &json!(""),
        ));
        assert!(!record.answer_last("Agent.completed", "nope"));
        assert!(record.answer_last("Agent.requestFeedback", "use postgres"));
        assert_eq!(record.function_call_history()[0].output(), "use postgres");
    }
}
