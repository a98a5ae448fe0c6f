//! Cooperative shutdown signalling.
//!
//! One controller, many cloned tokens. Every long-lived task selects on
//! [`ShutdownToken::cancelled`] and unwinds within a second of the signal.

use tokio::sync::watch;

/// Sending half; owned by the orchestrator.
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    /// Create a controller and its first token.
    #[must_use]
    pub fn new() -> (Self, ShutdownToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, ShutdownToken { rx })
    }

    /// Signal every token. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving half; cheap to clone into every task.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Resolve once shutdown is signalled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                // Controller dropped; treat as shutdown.
                return;
            }
        }
    }

    /// Non-blocking check.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// A token that is already cancelled; useful in tests.
    #[must_use]
    pub fn already_cancelled() -> Self {
        let (controller, token) = ShutdownController::new();
        controller.shutdown();
        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn tokens_observe_shutdown() {
        let (controller, token) = ShutdownController::new();
        let second = token.clone();
        assert!(!token.is_cancelled());

        controller.shutdown();

        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("token should observe shutdown");
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_controller_counts_as_shutdown() {
        let (controller, token) = ShutdownController::new();
        drop(controller);
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .expect("dropped controller should cancel");
    }
}
