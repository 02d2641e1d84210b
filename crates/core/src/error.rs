//! Error types for the Stepwise domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them all for callers that don't care which subsystem failed.

use thiserror::Error;

use crate::run::RunState;

/// The top-level error type for all Stepwise operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the model-calling capability.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Generator not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    /// Every provider in a fallback chain failed or was skipped.
    #[error("All providers in '{chain}' failed: {}", .attempts.join("; "))]
    Exhausted { chain: String, attempts: Vec<String> },
}

/// Failures resolving or running a tool operation.
///
/// These never abort dispatch directly: the control loop records them in the
/// failing invocation's history entry and ends the run at the end of the step.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool {0} does not exist")]
    ToolNotFound(String),

    #[error("Method {tool}.{method} does not exist")]
    MethodNotFound { tool: String, method: String },

    #[error("{tool}.{member} is not an operation")]
    NotCallable { tool: String, member: String },

    #[error("Invalid parameter name for {operation}: {parameter}")]
    UnknownParameter { operation: String, parameter: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {operation}: {reason}")]
    ExecutionFailed { operation: String, reason: String },
}

/// Failures while building a prompt.
#[derive(Debug, Clone, Error)]
pub enum PromptError {
    #[error("Unable to update tool definitions: {0}")]
    AssemblyFailure(String),
}

/// Failures of the run-record persistence backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to (de)serialize run record: {0}")]
    Serialization(String),
}

/// Failures of the human-in-loop acknowledgement channel.
#[derive(Debug, Clone, Error)]
pub enum SignalError {
    #[error("Signal channel closed: {0}")]
    Closed(String),
}

/// Control-loop level failures.
#[derive(Debug, Clone, Error)]
pub enum RunError {
    #[error("Found no function invocations")]
    NoInvocationsProduced,

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: RunState, to: RunState },

    #[error("Agent {0} has already completed")]
    AlreadyCompleted(String),

    #[error("Agent {agent_id} is not awaiting feedback (state: {state})")]
    NotAwaitingFeedback { agent_id: String, state: RunState },

    #[error("Cost must not decrease (delta: {0})")]
    NegativeCost(f64),
}
