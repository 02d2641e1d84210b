//! External signal port: human-in-loop acknowledgement.
//!
//! When the budget guard pauses a run, the control loop blocks on
//! [`ExternalSignal::await_signal`] until a human (console, UI, queue...)
//! confirms. There is no timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SignalError;

/// Why a run was paused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuspendReason {
    /// The configured number of steps ran since the last confirmation.
    IterationThreshold { iterations: u32, threshold: u32 },
    /// Spend since the last confirmation exceeded the ceiling.
    CostCeiling { spent: f64, ceiling: f64, total: f64 },
}

impl fmt::Display for SuspendReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspendReason::IterationThreshold { iterations, threshold } => {
                write!(f, "{iterations} iterations since last input (threshold {threshold})")
            }
            SuspendReason::CostCeiling { spent, ceiling, total } => write!(
                f,
                "spent ${spent:.2} since last input (ceiling ${ceiling:.2}, total ${total:.2})"
            ),
        }
    }
}

/// What the host is asked to acknowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRequest {
    pub agent_id: String,
    pub agent_name: String,
    pub reason: SuspendReason,
}

#[async_trait]
pub trait ExternalSignal: Send + Sync {
    /// Block until the host acknowledges the request.
    async fn await_signal(&self, request: &SignalRequest) -> Result<(), SignalError>;
}
