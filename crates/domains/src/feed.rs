//! # ChangeFeed
//!
//! Live query subscription handle. The store re-runs the query on every
//! commit that changes its result set and publishes the full, reordered
//! snapshot (never a diff). Delivery rides on a watch channel, which gives
//! latest-state coalescing for free: a slow consumer skips intermediate
//! states and always observes the most recent one.

use tokio::sync::watch;

use crate::document::Document;

/// One delivered query result: the full matching set in query order, tagged
/// with the store commit sequence that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub seq: u64,
    pub docs: Vec<Document>,
}

/// Subscription handle returned by `DocumentStore::watch`.
///
/// The first `next()` resolves immediately with the current snapshot;
/// subsequent calls await change. `unsubscribe` releases the store-side
/// watcher registration, is idempotent, and also runs on `Drop`, so a
/// forgotten handle never leaks a watcher.
pub struct ChangeFeed {
    rx: watch::Receiver<Snapshot>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
    primed: bool,
}

impl ChangeFeed {
    pub fn new(rx: watch::Receiver<Snapshot>, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            rx,
            cancel: Some(Box::new(cancel)),
            primed: false,
        }
    }

    /// The most recent snapshot, without waiting or consuming a delivery.
    pub fn current(&self) -> Snapshot {
        self.rx.borrow().clone()
    }

    /// Next snapshot, or `None` once the feed is torn down (either side).
    pub async fn next(&mut self) -> Option<Snapshot> {
        if self.cancel.is_none() {
            return None;
        }
        if !self.primed {
            self.primed = true;
            return Some(self.rx.borrow_and_update().clone());
        }
        match self.rx.changed().await {
            Ok(()) => Some(self.rx.borrow_and_update().clone()),
            Err(_) => None,
        }
    }

    /// Stops delivery and releases the store-side watcher. Safe to call
    /// repeatedly; after the first call `next()` returns `None`.
    pub fn unsubscribe(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("cancelled", &self.cancel.is_none())
            .field("seq", &self.rx.borrow().seq)
            .finish()
    }
}
