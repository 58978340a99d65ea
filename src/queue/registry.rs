//! Coordinated queue shutdown
//!
//! Queues that must be drained before the process exits register with a
//! [`ShutdownRegistry`]. At teardown one [`wait_for_end`](ShutdownRegistry::wait_for_end)
//! call ends every registered queue and then joins each of them.

use crate::queue::error::QueueResult;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A queue that can be closed and waited on during shutdown
pub trait Drain: Send + Sync {
    fn name(&self) -> &str;

    /// Stop accepting work and let the workers finish
    fn end(&self) -> QueueResult<()>;

    /// Wait for the workers to exit, bounded per worker by `timeout`
    fn join(&self, timeout: Option<Duration>) -> bool;
}

/// Set of queues ended and joined together at shutdown
///
/// Cloning shares the same set.
#[derive(Clone, Default)]
pub struct ShutdownRegistry {
    queues: Arc<Mutex<Vec<Arc<dyn Drain>>>>,
}

impl ShutdownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, queue: Arc<dyn Drain>) {
        log::debug!("Queue '{}' registered for shutdown", queue.name());
        self.lock().push(queue);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// End every registered queue, then join each with `timeout`
    ///
    /// Queues are removed from the registry, so a second call has nothing to
    /// do. Returns whether every queue joined in time.
    pub fn wait_for_end(&self, timeout: Duration) -> bool {
        let queues = std::mem::take(&mut *self.lock());
        if queues.is_empty() {
            return true;
        }
        log::info!("Waiting for {} queue(s) to finish", queues.len());

        for queue in &queues {
            if let Err(e) = queue.end() {
                log::error!("Could not end queue '{}': {}", queue.name(), e);
            }
        }

        let mut all_joined = true;
        for queue in &queues {
            if !queue.join(Some(timeout)) {
                log::warn!("Queue '{}' did not finish within {:?}", queue.name(), timeout);
                all_joined = false;
            }
        }
        all_joined
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn Drain>>> {
        match self.queues.lock() {
            Ok(queues) => queues,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for ShutdownRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self.lock().iter().map(|q| q.name().to_string()).collect();
        f.debug_struct("ShutdownRegistry").field("queues", &names).finish()
    }
}
