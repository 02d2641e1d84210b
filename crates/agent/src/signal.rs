//! External signal implementations for hosts that don't bring their own.

use async_trait::async_trait;
use stepwise_core::error::SignalError;
use stepwise_core::signal::{ExternalSignal, SignalRequest};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::info;

/// Acknowledges every request immediately. For unattended runs where the
/// budget guard should only leave a trace in the logs.
pub struct AutoApprove;

#[async_trait]
impl ExternalSignal for AutoApprove {
    async fn await_signal(&self, request: &SignalRequest) -> Result<(), SignalError> {
        info!(
            agent_id = %request.agent_id,
            reason = %request.reason,
            "Budget checkpoint auto-approved"
        );
        Ok(())
    }
}

/// A pending request handed to the host through a [`SignalReceiver`].
pub struct PendingSignal {
    pub request: SignalRequest,
    ack: oneshot::Sender<()>,
}

impl PendingSignal {
    /// Let the waiting run continue.
    pub fn acknowledge(self) {
        let _ = self.ack.send(());
    }
}

/// Forwards requests over a channel so another task (a UI, a queue
/// consumer) decides when the run continues.
pub struct ChannelSignal {
    requests: mpsc::UnboundedSender<PendingSignal>,
}

/// The host side of a [`ChannelSignal`].
pub struct SignalReceiver {
    requests: Mutex<mpsc::UnboundedReceiver<PendingSignal>>,
}

impl ChannelSignal {
    pub fn new() -> (Self, SignalReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { requests: tx },
            SignalReceiver {
                requests: Mutex::new(rx),
            },
        )
    }
}

impl SignalReceiver {
    /// Wait for the next request; `None` once every sender is gone.
    pub async fn next(&self) -> Option<PendingSignal> {
        self.requests.lock().await.recv().await
    }
}

#[async_trait]
impl ExternalSignal for ChannelSignal {
    async fn await_signal(&self, request: &SignalRequest) -> Result<(), SignalError> {
        let (ack, acknowledged) = oneshot::channel();
        self.requests
            .send(PendingSignal {
                request: request.clone(),
                ack,
            })
            .map_err(|_| SignalError::Closed("signal receiver dropped".into()))?;
        acknowledged
            .await
            .map_err(|_| SignalError::Closed("request dropped without acknowledgement".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::signal::SuspendReason;

    fn request() -> SignalRequest {
        SignalRequest {
            agent_id: "a1".into(),
            agent_name: "test".into(),
            reason: SuspendReason::IterationThreshold {
                iterations: 3,
                threshold: 3,
            },
        }
    }

    #[tokio::test]
    async fn auto_approve_returns_immediately() {
        AutoApprove.await_signal(&request()).await.unwrap();
    }

    #[tokio::test]
    async fn channel_signal_waits_for_acknowledgement() {
        let (signal, receiver) = ChannelSignal::new();
        let waiting = tokio::spawn(async move { signal.await_signal(&request()).await });

        let pending = receiver.next().await.unwrap();
        assert_eq!(pending.request.agent_id, "a1");
        assert!(!waiting.is_finished());
        pending.acknowledge();

        waiting.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn dropped_request_is_closed() {
        let (signal, receiver) = ChannelSignal::new();
        let waiting = tokio::spawn(async move { signal.await_signal(&request()).await });
        drop(receiver.next().await.unwrap());
        assert!(matches!(waiting.await.unwrap(), Err(SignalError::Closed(_))));
    }

    #[tokio::test]
    async fn dropped_receiver_is_closed() {
        let (signal, receiver) = ChannelSignal::new();
        drop(receiver);
        assert!(matches!(
            signal.await_signal(&request()).await,
            Err(SignalError::Closed(_))
        ));
    }
}
