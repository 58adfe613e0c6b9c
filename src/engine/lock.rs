//! Per-repository mutual exclusion for reference cache mutation.
//!
//! Waiters for the same key are served in arrival order. Keys are
//! independent: holding `acme/widgets` never delays `acme/gadgets`. The lock
//! is not reentrant, and releasing happens when the guard is dropped, so a
//! critical section that returns early or panics still releases its key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Injectable registry of per-key locks.
///
/// Clones share the same registry.
///
/// # Example
///
/// ```
/// use reprise::engine::lock::RepoLockManager;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let locks = RepoLockManager::new();
/// let guard = locks.acquire("acme/widgets").await;
/// assert!(locks.is_held("acme/widgets"));
/// drop(guard);
/// assert!(!locks.is_held("acme/widgets"));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct RepoLockManager {
    slots: Slots,
}

impl RepoLockManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until every earlier holder of `key` has released it.
    pub async fn acquire(&self, key: &str) -> RepoLockGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.to_owned()).or_default())
        };

        trace!(key, "waiting for repository lock");
        let guard = slot.lock_owned().await;
        trace!(key, "repository lock acquired");

        RepoLockGuard {
            key: key.to_owned(),
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    /// Returns true while some request holds or awaits `key`.
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

/// Proof of exclusive access to one repository key.
#[derive(Debug)]
pub struct RepoLockGuard {
    key: String,
    slots: Slots,
    guard: Option<OwnedMutexGuard<()>>,
}

impl RepoLockGuard {
    /// Key this guard protects.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        drop(guard);

        // Only the registry's reference remains once nobody else waits.
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
        trace!(key = %self.key, "repository lock released");
    }
}
