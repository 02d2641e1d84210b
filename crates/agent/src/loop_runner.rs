//! The control loop implementation.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use stepwise_config::{DEFAULT_SYSTEM_PROMPT, HumanInLoopConfig};
use stepwise_core::error::{Error, Result, RunError};
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::generation::ModelTiers;
use stepwise_core::run::{InvocationRecord, RunRecord, RunState};
use stepwise_core::signal::{ExternalSignal, SignalRequest, SuspendReason};
use stepwise_core::store::StateStore;
use stepwise_core::tool::{ToolContext, ToolRegistry};
use tracing::{Instrument, debug, debug_span, info, info_span, warn};

use crate::budget::BudgetGuard;
use crate::functions::{AGENT_TOOL, AgentTool, COMPLETED, REQUEST_FEEDBACK};
use crate::prompt;

enum Step {
    Continue,
    Stop,
}

/// Drives runs step by step until they complete, fail or suspend.
pub struct ControlLoop {
    /// Generation capabilities; steps use the `hard` tier
    tiers: ModelTiers,

    /// Tool registry, always including the built-in `Agent` tool
    tools: Arc<ToolRegistry>,

    store: Arc<dyn StateStore>,

    /// Where budget checkpoints wait for a human
    signal: Arc<dyn ExternalSignal>,

    event_bus: Arc<EventBus>,

    budget: HumanInLoopConfig,

    /// System prompt template with a `<tools></tools>` region
    system_prompt: String,
}

impl ControlLoop {
    /// Create a control loop. The `Agent` tool is registered unless the
    /// registry already has one.
    pub fn new(
        tiers: ModelTiers,
        mut tools: ToolRegistry,
        store: Arc<dyn StateStore>,
        signal: Arc<dyn ExternalSignal>,
    ) -> Self {
        if tools.get(AGENT_TOOL).is_none() {
            tools.register(AGENT_TOOL, Box::new(AgentTool));
        }
        Self {
            tiers,
            tools: Arc::new(tools),
            store,
            signal,
            event_bus: Arc::new(EventBus::default()),
            budget: HumanInLoopConfig::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_budget(mut self, budget: HumanInLoopConfig) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Start a fresh run towards `user_prompt`.
    ///
    /// A prompt carrying an `<initial_prompt>` block (pasted from an earlier
    /// run) keeps that block's content as the goal and is sent as is.
    pub async fn start(
        &self,
        agent_name: impl Into<String>,
        user_prompt: impl Into<String>,
    ) -> Result<RunRecord> {
        let user_prompt = user_prompt.into();
        let goal = prompt::extract_initial_prompt(&user_prompt).unwrap_or_else(|| user_prompt.clone());
        let mut record = RunRecord::new(agent_name, goal);
        record.input_prompt = user_prompt;
        self.run(&mut record).await?;
        Ok(record)
    }

    /// Continue a persisted run from its saved instruction.
    pub async fn resume(&self, agent_id: &str) -> Result<RunRecord> {
        let mut record = self.store.load(agent_id).await?;
        let previous = record.reopen()?;
        info!(agent_id, from = %previous, "Resuming run");
        self.run(&mut record).await?;
        Ok(record)
    }

    /// Answer a pending feedback request and continue the run.
    pub async fn resume_with_feedback(&self, agent_id: &str, feedback: &str) -> Result<RunRecord> {
        let mut record = self.store.load(agent_id).await?;
        if record.state() != RunState::Feedback {
            return Err(RunError::NotAwaitingFeedback {
                agent_id: agent_id.to_string(),
                state: record.state(),
            }
            .into());
        }

        let answer = serde_json::Value::String(feedback.to_string());
        if !record.answer_last(REQUEST_FEEDBACK, answer.to_string()) {
            warn!(agent_id, "Last recorded call is not a feedback request");
        }
        ensure_newline(&mut record.input_prompt);
        record
            .input_prompt
            .push_str(&prompt::format_function_result(REQUEST_FEEDBACK, &answer));

        record.reopen()?;
        info!(agent_id, "Feedback received, resuming run");
        self.run(&mut record).await?;
        Ok(record)
    }

    /// Run `record` until it leaves state `agent` for good.
    ///
    /// Failures inside the run end it in `error` and return `Ok`; an `Err`
    /// means the record could not be run or persisted at all.
    pub async fn run(&self, record: &mut RunRecord) -> Result<()> {
        let span = info_span!(
            "agent_run",
            agent_id = %record.agent_id(),
            agent_name = %record.agent_name
        );
        self.drive(record).instrument(span).await
    }

    async fn drive(&self, record: &mut RunRecord) -> Result<()> {
        if record.state() != RunState::Agent {
            return Err(RunError::InvalidTransition {
                from: record.state(),
                to: RunState::Agent,
            }
            .into());
        }

        for name in &record.tools {
            if self.tools.get(name).is_none() {
                warn!(tool = %name, "Tool used by this run is no longer registered");
            }
        }
        record.model_tiers = self.tiers.names();
        record.tools = self.tools.names().into_iter().map(String::from).collect();

        info!(
            tools = record.tools.len(),
            cost = record.cost(),
            history = record.function_call_history().len(),
            "Run started"
        );

        match prompt::inject_tool_definitions(&self.system_prompt, &self.tools.definitions()) {
            Ok(system_prompt) => {
                self.store.save(record).await?;
                let mut guard = BudgetGuard::new(self.budget, record.cost());
                let mut iteration: u32 = 0;
                loop {
                    iteration += 1;
                    let step = self
                        .step(record, &system_prompt, &mut guard)
                        .instrument(debug_span!("step", iteration))
                        .await;
                    match step {
                        Ok(Step::Continue) => {}
                        Ok(Step::Stop) => break,
                        Err(e) => {
                            self.fail(record, e).await?;
                            break;
                        }
                    }
                }
            }
            Err(e) => self.fail(record, e.into()).await?,
        }

        info!(
            state = %record.state(),
            cost = record.cost(),
            history = record.function_call_history().len(),
            "Run finished"
        );
        self.event_bus.publish(DomainEvent::RunFinished {
            agent_id: record.agent_id().to_string(),
            state: record.state(),
            cost: record.cost(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn step(
        &self,
        record: &mut RunRecord,
        system_prompt: &str,
        guard: &mut BudgetGuard,
    ) -> Result<Step> {
        if let Some(reason) = guard.check(record.cost()) {
            self.suspend(record, reason).await?;
        }

        let generator = &self.tiers.hard;
        let request = prompt::compose_prompt(
            record.function_call_history(),
            &record.memory,
            &record.input_prompt,
        );
        debug!(
            generator = %generator.display_name(),
            prompt_chars = request.len(),
            "Requesting next action"
        );

        let result = generator.generate(&request, system_prompt).await?;
        record.add_cost(result.cost)?;
        self.event_bus.publish(DomainEvent::GenerationCompleted {
            agent_id: record.agent_id().to_string(),
            generator: generator.display_name().to_string(),
            invocations: result.invocations.len(),
            cost: result.cost,
            timestamp: Utc::now(),
        });

        if result.invocations.is_empty() {
            return Err(RunError::NoInvocationsProduced.into());
        }

        // Persisted with the functions snapshot so a restart mid-dispatch keeps it
        let mut next_prompt = prompt::anchor_initial_prompt(&record.user_prompt, &result.response);
        record.input_prompt = next_prompt.clone();
        record.invoking = result.invocations.clone();
        self.transition(record, RunState::Functions).await?;

        let agent_id = record.agent_id().to_string();
        let mut first_failure: Option<String> = None;
        let mut stop: Option<RunState> = None;

        for invocation in result.invocations {
            let started = Instant::now();
            let outcome = {
                let mut ctx = ToolContext {
                    agent_id: &agent_id,
                    memory: &mut record.memory,
                };
                self.tools.invoke(&invocation, &mut ctx).await
            };

            let tool_name = invocation.tool_name.clone();
            let success = outcome.is_ok();
            ensure_newline(&mut next_prompt);
            match outcome {
                Ok(value) => {
                    debug!(operation = %tool_name, "Invocation succeeded");
                    next_prompt.push_str(&prompt::format_function_result(&tool_name, &value));
                    record.record_invocation(InvocationRecord::success(invocation, &value));
                }
                Err(e) => {
                    warn!(operation = %tool_name, error = %e, "Invocation failed");
                    next_prompt.push_str(&prompt::format_function_error(&tool_name, &e.to_string()));
                    record.record_invocation(InvocationRecord::failure(invocation, &e));
                    if first_failure.is_none() {
                        first_failure = Some(e.to_string());
                    }
                }
            }

            self.event_bus.publish(DomainEvent::InvocationCompleted {
                agent_id: agent_id.clone(),
                tool_name: tool_name.clone(),
                success,
                duration_ms: started.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });

            if success {
                match tool_name.as_str() {
                    COMPLETED => stop = Some(RunState::Completed),
                    REQUEST_FEEDBACK => stop = Some(RunState::Feedback),
                    _ => {}
                }
                if stop.is_some() {
                    break;
                }
            }
        }

        record.invoking.clear();
        record.input_prompt = next_prompt;

        match (first_failure, stop) {
            // A failure outranks a completion requested in the same step
            (Some(description), _) => {
                record.fail(description)?;
                self.persist_change(record, RunState::Functions).await?;
                Ok(Step::Stop)
            }
            (None, Some(state)) => {
                self.transition(record, state).await?;
                Ok(Step::Stop)
            }
            (None, None) => {
                self.transition(record, RunState::Agent).await?;
                Ok(Step::Continue)
            }
        }
    }

    /// Pause in `hil` until the external signal acknowledges, then restore
    /// the held state.
    async fn suspend(&self, record: &mut RunRecord, reason: SuspendReason) -> Result<()> {
        let held = record.state();
        info!(reason = %reason, "Waiting for human confirmation");

        if let Err(e) = self.store.update_state(record, RunState::Hil).await {
            restore(record, held);
            return Err(e.into());
        }
        self.publish_state(record, held);
        self.event_bus.publish(DomainEvent::HumanInLoopRequested {
            agent_id: record.agent_id().to_string(),
            reason: reason.clone(),
            timestamp: Utc::now(),
        });

        let request = SignalRequest {
            agent_id: record.agent_id().to_string(),
            agent_name: record.agent_name.clone(),
            reason,
        };
        let acknowledged = self.signal.await_signal(&request).await;

        if let Err(e) = self.store.update_state(record, held).await {
            restore(record, held);
            return Err(e.into());
        }
        self.publish_state(record, RunState::Hil);

        acknowledged?;
        info!("Confirmation received, continuing");
        Ok(())
    }

    async fn transition(&self, record: &mut RunRecord, next: RunState) -> Result<()> {
        let from = record.transition(next)?;
        self.persist_change(record, from).await
    }

    async fn persist_change(&self, record: &RunRecord, from: RunState) -> Result<()> {
        self.store.save(record).await?;
        info!(from = %from, to = %record.state(), "State changed");
        self.publish_state(record, from);
        Ok(())
    }

    /// End the run in `error` and persist the description.
    async fn fail(&self, record: &mut RunRecord, error: Error) -> Result<()> {
        let description = error.to_string();
        warn!(error = %description, "Run failed");

        let from = record.state();
        if let Err(e) = record.fail(description.clone()) {
            warn!(error = %e, "Run cannot move to error, keeping the description only");
            record.error = Some(description);
            self.store.save(record).await?;
            return Ok(());
        }
        self.persist_change(record, from).await
    }

    fn publish_state(&self, record: &RunRecord, from: RunState) {
        self.event_bus.publish(DomainEvent::StateChanged {
            agent_id: record.agent_id().to_string(),
            from,
            to: record.state(),
            timestamp: Utc::now(),
        });
    }
}

fn restore(record: &mut RunRecord, held: RunState) {
    if record.state() == RunState::Hil {
        let _ = record.leave_hil(held);
    }
}

fn ensure_newline(text: &mut String) {
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}
