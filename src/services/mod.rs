//! Built-in services
//!
//! The components and tasks every process hosts before any collaborator
//! registers its own:
//!
//! - `work_queue`: a generic [`WorkQueue`](crate::queue::WorkQueue) drained at
//!   shutdown through the [`ShutdownRegistry`]
//! - `dispatcher`: a [`PriorityDispatchQueue`](crate::queue::PriorityDispatchQueue)
//! - `queue_monitor`: a task that periodically logs the depth of both queues

pub mod monitor;
pub mod queues;

pub use monitor::{QueueDepths, QueueMonitor};
pub use queues::{DispatcherService, WorkQueueService};

use crate::components::{Component, ComponentRegistry, ComponentResult};
use crate::queue::ShutdownRegistry;
use crate::scheduler::{SchedulerResult, Task, TaskOptions, TaskScheduler};
use std::time::Duration;

pub const WORK_QUEUE: &str = "work_queue";
pub const DISPATCHER: &str = "dispatcher";
pub const QUEUE_MONITOR: &str = "queue_monitor";

/// Tunables for the built-in services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub workers: usize,
    pub join_timeout: Duration,
    pub monitor_interval: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            join_timeout: Duration::from_secs(5),
            monitor_interval: Duration::from_secs(30),
        }
    }
}

/// Register `work_queue` and `dispatcher` with the component registry
pub fn register_services(
    registry: &mut ComponentRegistry,
    settings: &ServiceSettings,
    shutdown: &ShutdownRegistry,
) -> ComponentResult<()> {
    let workers = settings.workers;
    let drains = shutdown.clone();
    registry.register_factory(WORK_QUEUE, &WorkQueueService::dependencies(), move || {
        Box::new(WorkQueueService::new(workers, drains.clone()))
    })?;

    let join_timeout = settings.join_timeout;
    registry.register_factory(DISPATCHER, &DispatcherService::dependencies(), move || {
        Box::new(DispatcherService::new(join_timeout))
    })?;
    Ok(())
}

/// Register the `queue_monitor` task with the scheduler
pub fn register_tasks(scheduler: &mut TaskScheduler, settings: &ServiceSettings) -> SchedulerResult<()> {
    let interval = settings.monitor_interval;
    scheduler.register_factory(
        QUEUE_MONITOR,
        &QueueMonitor::dependencies(),
        TaskOptions::default(),
        move || Box::new(QueueMonitor::new(interval)),
    )
}
