//! Queue-backed components
//!
//! Collaborators reach the shared queues by declaring a dependency on
//! `work_queue` or `dispatcher` and pulling the queue out of the injected
//! service.

use crate::components::{Component, ComponentError, ComponentResult};
use crate::queue::{Drain, PriorityDispatchQueue, QueueError, ShutdownRegistry, WorkQueue};
use std::sync::Arc;
use std::time::Duration;

fn start_failed(name: &str, error: QueueError) -> ComponentError {
    ComponentError::StartFailed {
        name: name.to_string(),
        cause: error.to_string(),
    }
}

/// Owns the process-wide [`WorkQueue`]
///
/// The queue is handed to the shutdown registry when it starts, so it is ended
/// and joined by `wait_for_end` rather than by the component stop hook.
pub struct WorkQueueService {
    queue: Arc<WorkQueue>,
    shutdown: ShutdownRegistry,
}

impl WorkQueueService {
    pub fn new(workers: usize, shutdown: ShutdownRegistry) -> Self {
        Self {
            queue: Arc::new(WorkQueue::new(super::WORK_QUEUE, workers)),
            shutdown,
        }
    }

    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }
}

#[async_trait::async_trait]
impl Component for WorkQueueService {
    async fn start(&self) -> ComponentResult<()> {
        self.queue
            .start()
            .map_err(|e| start_failed(super::WORK_QUEUE, e))?;
        let drain: Arc<dyn Drain> = self.queue.clone();
        self.shutdown.register(drain);
        log::info!(
            "Work queue started with {} worker(s)",
            self.queue.worker_count()
        );
        Ok(())
    }
}

/// Owns the process-wide [`PriorityDispatchQueue`]
pub struct DispatcherService {
    queue: Arc<PriorityDispatchQueue>,
    join_timeout: Duration,
}

impl DispatcherService {
    pub fn new(join_timeout: Duration) -> Self {
        Self {
            queue: Arc::new(PriorityDispatchQueue::new(super::DISPATCHER)),
            join_timeout,
        }
    }

    pub fn queue(&self) -> Arc<PriorityDispatchQueue> {
        Arc::clone(&self.queue)
    }
}

#[async_trait::async_trait]
impl Component for DispatcherService {
    async fn start(&self) -> ComponentResult<()> {
        self.queue
            .start()
            .map_err(|e| start_failed(super::DISPATCHER, e))
    }

    /// Stop the dispatcher and wait, bounded, for its consumer to exit
    async fn stop(&self) -> ComponentResult<()> {
        self.queue.stop().map_err(|e| ComponentError::StopFailed {
            name: super::DISPATCHER.to_string(),
            cause: e.to_string(),
        })?;

        let queue = Arc::clone(&self.queue);
        let timeout = self.join_timeout;
        let joined = tokio::task::spawn_blocking(move || queue.join(Some(timeout)))
            .await
            .map_err(|e| ComponentError::StopFailed {
                name: super::DISPATCHER.to_string(),
                cause: e.to_string(),
            })?;
        if !joined {
            log::warn!(
                "Dispatcher consumer did not exit within {:?}",
                self.join_timeout
            );
        }
        Ok(())
    }
}
