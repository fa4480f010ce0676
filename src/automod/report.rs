//! Process-level sink for failures of fire-and-forget remote calls.

use tokio::sync::mpsc;
use tracing::error;

use crate::discussions::DiscussionsError;

/// A remote moderation call that failed after being dispatched.
#[derive(Debug)]
pub struct RemoteFailure {
    /// Operation name, e.g. `delete_thread`.
    pub operation: &'static str,
    /// Post or thread the operation targeted.
    pub target_id: u64,
    pub filter: String,
    pub error: DiscussionsError,
}

/// Sending half of the failure channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<RemoteFailure>,
}

impl ErrorSink {
    /// Create a sink and the receiver its failures arrive on.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RemoteFailure>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn report(&self, failure: RemoteFailure) {
        if let Err(mpsc::error::SendError(failure)) = self.tx.send(failure) {
            // Receiver gone (shutting down); still leave a trace.
            log_failure(&failure);
        }
    }
}

/// Log every failure until all senders are dropped.
pub async fn log_failures(mut rx: mpsc::UnboundedReceiver<RemoteFailure>) {
    while let Some(failure) = rx.recv().await {
        log_failure(&failure);
    }
}

fn log_failure(failure: &RemoteFailure) {
    error!(
        operation = failure.operation,
        target_id = failure.target_id,
        filter = %failure.filter,
        "Moderation action failed: {}",
        failure.error
    );
}
