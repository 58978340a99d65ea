//! Queue depth monitor task

use super::queues::{DispatcherService, WorkQueueService};
use super::{DISPATCHER, WORK_QUEUE};
use crate::components::{ComponentResult, Dependencies};
use crate::queue::{PriorityDispatchQueue, WorkQueue};
use crate::scheduler::{Task, TaskResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Items waiting in each built-in queue at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepths {
    pub work_queue: usize,
    pub dispatcher: usize,
}

/// Logs the depth of the built-in queues every `interval`
pub struct QueueMonitor {
    interval: Duration,
    work_queue: Option<Arc<WorkQueue>>,
    dispatcher: Option<Arc<PriorityDispatchQueue>>,
    samples: AtomicU64,
    stopping: AtomicBool,
    wake: Notify,
}

impl QueueMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            // tokio intervals reject a zero period
            interval: interval.max(Duration::from_millis(1)),
            work_queue: None,
            dispatcher: None,
            samples: AtomicU64::new(0),
            stopping: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Number of samples logged so far
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Current depths, once the queues have been injected
    pub fn depths(&self) -> Option<QueueDepths> {
        let work_queue = self.work_queue.as_ref()?;
        let dispatcher = self.dispatcher.as_ref()?;
        Some(QueueDepths {
            work_queue: work_queue.len(),
            dispatcher: dispatcher.pending(),
        })
    }

    fn sample(&self, depths: QueueDepths) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Queue depth: {}={} {}={}",
            WORK_QUEUE,
            depths.work_queue,
            DISPATCHER,
            depths.dispatcher
        );
    }
}

#[async_trait::async_trait]
impl Task for QueueMonitor {
    fn dependencies() -> Vec<&'static str> {
        vec![WORK_QUEUE, DISPATCHER]
    }

    fn inject(&mut self, dependencies: &Dependencies) -> ComponentResult<()> {
        self.work_queue = Some(dependencies.get::<WorkQueueService>(WORK_QUEUE)?.queue());
        self.dispatcher = Some(dependencies.get::<DispatcherService>(DISPATCHER)?.queue());
        Ok(())
    }

    async fn run(&self) -> TaskResult {
        if self.depths().is_none() {
            return Err("queue monitor started without its queues".into());
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while !self.stopping.load(Ordering::Acquire) {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(depths) = self.depths() {
                        self.sample(depths);
                    }
                }
                _ = self.wake.notified() => {}
            }
        }
        log::debug!("Queue monitor exiting after {} sample(s)", self.samples());
        Ok(())
    }

    async fn stop(&self) -> TaskResult {
        self.stopping.store(true, Ordering::Release);
        self.wake.notify_one();
        Ok(())
    }
}
