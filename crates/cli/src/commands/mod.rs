//! Subcommand implementations and the wiring they share.

pub mod init;
pub mod list;
pub mod resume;
pub mod run;
pub mod show;

use anyhow::{Context, bail};
use std::sync::Arc;
use stepwise_agent::{ControlLoop, REQUEST_FEEDBACK};
use stepwise_config::AppConfig;
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::run::{RunRecord, RunState};
use stepwise_providers::build_tiers;
use stepwise_store::FileStateStore;
use stepwise_tools::default_registry;
use tokio::task::JoinHandle;

use crate::console::ConsoleSignal;

pub(crate) fn load_config() -> anyhow::Result<AppConfig> {
    AppConfig::load().context("Failed to load config")
}

pub(crate) fn open_store(config: &AppConfig) -> FileStateStore {
    FileStateStore::new(config.store.runs_dir())
}

/// Build a control loop from the configuration.
pub(crate) fn build_loop(config: &AppConfig) -> anyhow::Result<ControlLoop> {
    let tiers = build_tiers(config);
    if !tiers.hard.is_configured() {
        eprintln!();
        eprintln!("  ERROR: No usable provider configured!");
        eprintln!();
        eprintln!("  Add a [[providers]] entry with an api_url, model and api_key to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!("  or set STEPWISE_API_KEY to use one key for every provider.");
        eprintln!();
        bail!("no configured provider for tier 'hard'");
    }

    let system_prompt = config.agent.system_prompt()?;
    let store = Arc::new(open_store(config));
    let tools = default_registry(config.store.files_dir());

    Ok(
        ControlLoop::new(tiers, tools, store, Arc::new(ConsoleSignal))
            .with_budget(config.human_in_loop)
            .with_system_prompt(system_prompt),
    )
}

/// Print model calls and invocations to stderr while a run executes.
pub(crate) fn show_progress(event_bus: &EventBus) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event.as_ref() {
                DomainEvent::GenerationCompleted {
                    invocations, cost, ..
                } => eprintln!("  model: {invocations} call(s), ${cost:.4}"),
                DomainEvent::InvocationCompleted {
                    tool_name,
                    success,
                    duration_ms,
                    ..
                } => {
                    let mark = if *success { "ok" } else { "FAILED" };
                    eprintln!("    {tool_name} {mark} ({duration_ms} ms)");
                }
                _ => {}
            }
        }
    })
}

/// Describe how a run ended and what the user can do next.
pub(crate) fn print_outcome(record: &RunRecord) {
    println!();
    println!("  Run:    {} ({})", record.agent_id(), record.agent_name);
    println!("  State:  {}", record.state());
    println!("  Cost:   ${:.4}", record.cost());

    match record.state() {
        RunState::Completed => println!("\n  Done."),
        RunState::Feedback => {
            let request = record
                .function_call_history()
                .last()
                .filter(|r| r.invocation.tool_name == REQUEST_FEEDBACK)
                .and_then(|r| r.invocation.parameters.values().next())
                .map(|v| v.as_str().map(String::from).unwrap_or_else(|| v.to_string()))
                .unwrap_or_default();
            println!("\n  The agent needs your input:\n    {request}");
            println!(
                "\n  Answer with: stepwise resume {} --feedback \"...\"",
                record.agent_id()
            );
        }
        RunState::Error => {
            println!("\n  Error: {}", record.error.as_deref().unwrap_or("unknown"));
            println!("  Retry with: stepwise resume {}", record.agent_id());
        }
        _ => {}
    }
}
