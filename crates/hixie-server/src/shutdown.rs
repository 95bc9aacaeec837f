//! Shutdown coordination for the accept loop.
//!
//! `Server::close` trips the signal once; the accept loop selects on it and
//! stops taking sockets. Clones share one underlying channel, so every
//! waiter observes the same trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// A one-shot, cloneable shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    triggered: Arc<AtomicBool>,
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            triggered: Arc::new(AtomicBool::new(false)),
            sender,
        }
    }

    /// Trip the signal. Idempotent; later calls are no-ops.
    pub fn trigger(&self) {
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            // No receivers is fine; the flag alone satisfies late waiters.
            let _ = self.sender.send(());
        }
    }

    /// Whether the signal has been tripped.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Wait until the signal trips; returns immediately if it already has.
    pub async fn recv(&self) {
        // Subscribe before checking the flag so a trigger between the two
        // cannot be missed.
        let mut receiver = self.sender.subscribe();
        if self.is_shutdown() {
            return;
        }
        let _ = receiver.recv().await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
