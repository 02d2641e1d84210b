//! Domain event system: lets hosts observe runs without touching them.
//!
//! The control loop publishes an event for every state change, model call
//! and dispatched invocation. Subscribers (UIs, loggers, tests) filter for
//! what they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::run::RunState;
use crate::signal::SuspendReason;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A run moved between states
    StateChanged {
        agent_id: String,
        from: RunState,
        to: RunState,
        timestamp: DateTime<Utc>,
    },

    /// The model answered
    GenerationCompleted {
        agent_id: String,
        generator: String,
        invocations: usize,
        cost: f64,
        timestamp: DateTime<Utc>,
    },

    /// An invocation was dispatched
    InvocationCompleted {
        agent_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The budget guard paused a run
    HumanInLoopRequested {
        agent_id: String,
        reason: SuspendReason,
        timestamp: DateTime<Utc>,
    },

    /// A control loop returned
    RunFinished {
        agent_id: String,
        state: RunState,
        cost: f64,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::StateChanged {
            agent_id: "a-1".into(),
            from: RunState::Agent,
            to: RunState::Functions,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::StateChanged { agent_id, to, .. } => {
                assert_eq!(agent_id, "a-1");
                assert_eq!(*to, RunState::Functions);
            }
            _ => panic!("Expected StateChanged event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::RunFinished {
            agent_id: "a-1".into(),
            state: RunState::Completed,
            cost: 0.0,
            timestamp: Utc::now(),
        });
    }
}
