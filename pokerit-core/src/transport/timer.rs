//! Single-shot, cancellable reconnect timer.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Fires once after a fixed delay unless its token is cancelled first.
///
/// Consumed by [`fire`](Self::fire), so a timer can never fire twice.
#[derive(Debug)]
pub struct ReconnectTimer {
    deadline: Instant,
    cancel: CancellationToken,
}

impl ReconnectTimer {
    pub fn arm(delay: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + delay,
            cancel,
        }
    }

    /// Wait for the deadline. Returns `false` if cancelled first.
    pub async fn fire(self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep_until(self.deadline) => true,
        }
    }
}
