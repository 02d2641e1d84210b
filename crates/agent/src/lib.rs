//! The Stepwise control loop.
//!
//! Each step of a run:
//!
//! 1. **Check the budget**: pause in `hil` until a human confirms, if due
//! 2. **Assemble** the prompt from call history, memory and the instruction
//! 3. **Generate** the model's next response and its invocations
//! 4. **Dispatch** the invocations in order through the tool registry
//! 5. **Transition** and persist the run record
//!
//! The loop continues until the model calls `Agent.completed`, asks for
//! feedback with `Agent.requestFeedback`, or something fails.

pub mod budget;
pub mod functions;
pub mod loop_runner;
pub mod prompt;
pub mod signal;

#[cfg(test)]
mod test_helpers;

pub use budget::BudgetGuard;
pub use functions::{AGENT_TOOL, AgentTool, COMPLETED, REQUEST_FEEDBACK};
pub use loop_runner::ControlLoop;
pub use signal::{AutoApprove, ChannelSignal, PendingSignal, SignalReceiver};
