//! Process-wide "has unseen messages" signal for bell/badge indicators.
//!
//! List loops publish the aggregate once per cycle; badges and dashboards
//! subscribe instead of aggregating on their own.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct UnreadBadge {
    tx: Arc<watch::Sender<bool>>,
}

impl UnreadBadge {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Publish this cycle's value. Subscribers are only woken on change.
    pub fn publish(&self, has_unseen: bool) {
        self.tx.send_if_modified(|current| {
            if *current == has_unseen {
                return false;
            }
            *current = has_unseen;
            true
        });
    }

    pub fn has_unseen(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for UnreadBadge {
    fn default() -> Self {
        Self::new()
    }
}
