//! Process-wide cancellation scope
//!
//! One revocable scope rooted at the interrupt/termination signals; every
//! blocking transport operation observes it and returns a
//! cancellation-flavored error promptly once it fires.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation handle backed by a watch channel
#[derive(Debug, Clone)]
pub struct CancelScope {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelScope {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Fire the scope. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the scope has fired. Returns immediately if it already
    /// has.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}
