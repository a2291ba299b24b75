//! Process-wide serialization of the generation resource.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mutual exclusion around the single generation resource.
///
/// Clones share the same lock. Waiters are served in arrival order.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveGate {
    lock: Arc<Mutex<()>>,
}

impl ExclusiveGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the gate.
    ///
    /// The gate is released when `f` finishes, fails, panics, or the
    /// returned future is dropped.
    pub async fn with_exclusive_access<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.lock.lock().await;
        f().await
    }

    /// Whether some task currently holds the gate.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}
