//! Task Scheduler
//!
//! Long-lived background tasks, each isolated on its own
//! [`ExecutionContext`](crate::context::ExecutionContext) so a slow or blocking
//! call inside one task never delays another.
//!
//! # Lifecycle
//!
//! ```text
//! Registered ─► DependenciesInjected ─► Running ─► StopRequested ─► Stopped
//!                                          │            ▲
//!                                          ▼            │
//!                                        Failed ────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use jukebox::components::ComponentRegistry;
//! use jukebox::scheduler::{Task, TaskOptions, TaskResult, TaskScheduler};
//!
//! #[derive(Default)]
//! struct Heartbeat;
//!
//! #[async_trait::async_trait]
//! impl Task for Heartbeat {
//!     async fn run(&self) -> TaskResult {
//!         log::info!("still alive");
//!         Ok(())
//!     }
//! }
//!
//! # fn example(registry: &ComponentRegistry) -> Result<(), Box<dyn std::error::Error>> {
//! let mut scheduler = TaskScheduler::new();
//! scheduler.register::<Heartbeat>("heartbeat", TaskOptions::default())?;
//! scheduler.inject_tasks(registry)?;
//! scheduler.start_tasks()?; // returns after SIGTERM / SIGINT
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod runner;
pub mod task;

pub use error::{SchedulerError, SchedulerResult};
pub use runner::{SchedulerHandle, TaskScheduler, DEFAULT_STOP_TIMEOUT};
pub use task::{Task, TaskError, TaskOptions, TaskResult, TaskState};

#[cfg(test)]
mod tests;
