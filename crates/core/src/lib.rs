//! # Stepwise Core
//!
//! Domain types, ports, and error definitions for the Stepwise autonomous
//! agent runtime. This crate has **no I/O of its own**; it defines the run
//! record, the tool registry and the traits every other crate implements
//! against.
//!
//! ## Ports
//!
//! - [`GenerationPort`]: asks a language model what to do next
//! - [`StateStore`]: persists [`RunRecord`]s so runs can be resumed
//! - [`ExternalSignal`]: human-in-loop acknowledgement
//! - [`Tool`]: callable operations with declared parameter schemas

pub mod error;
pub mod event;
pub mod generation;
pub mod run;
pub mod signal;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use generation::{GenerationPort, GenerationResult, ModelTiers, Usage};
pub use run::{
    Invocation, InvocationOutcome, InvocationRecord, Memory, ModelTierSet, RunRecord, RunState,
    RunSummary,
};
pub use signal::{ExternalSignal, SignalRequest, SuspendReason};
pub use store::StateStore;
pub use tool::{Tool, ToolContext, ToolDefinition, ToolMember, ToolRegistry};
