//! Budget checkpoints answered on the terminal.

use async_trait::async_trait;
use stepwise_core::error::SignalError;
use stepwise_core::signal::{ExternalSignal, SignalRequest};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Waits for Enter on stdin. EOF or a read error closes the signal, which
/// ends the run in `error`; it can be resumed later.
pub struct ConsoleSignal;

#[async_trait]
impl ExternalSignal for ConsoleSignal {
    async fn await_signal(&self, request: &SignalRequest) -> Result<(), SignalError> {
        eprintln!();
        eprintln!("  Paused {} ({})", request.agent_name, request.agent_id);
        eprintln!("  Reason: {}", request.reason);
        eprintln!("  Press Enter to continue, or Ctrl+C to stop here and resume later.");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(SignalError::Closed("stdin closed".into())),
            Err(e) => Err(SignalError::Closed(e.to_string())),
        }
    }
}
