//! Requests parked until a script-parsed event names their path.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Waiters keyed by canonical path. Waiters for one key are released in the order they
/// registered, each at most once.
#[derive(Debug, Default)]
pub struct PendingRequests {
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<()>>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `key`. The receiver fails if the waiter is abandoned.
    pub fn wait(&self, key: &str) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Releases everything waiting on `key`; returns how many were waiting.
    pub fn resolve(&self, key: &str) -> usize {
        let waiters = self.waiters.lock().remove(key).unwrap_or_default();
        let count = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(());
        }
        count
    }

    /// Fails every waiter.
    pub fn abandon_all(&self) -> usize {
        let drained: Vec<_> = self.waiters.lock().drain().collect();
        drained.iter().map(|(_, waiters)| waiters.len()).sum()
    }

    pub fn len(&self) -> usize {
        self.waiters.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
