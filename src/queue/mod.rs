//! Work Queues
//!
//! Producer code on any thread hands side-effecting calls to a queue instead of
//! running them itself. Each call runs exactly once on a queue worker thread,
//! or on its owning [`ExecutionContext`](crate::context::ExecutionContext) when
//! it carries one.
//!
//! # Queues
//!
//! - [`WorkQueue`]: N workers over one double-ended buffer. `add` is FIFO,
//!   `add_at_start` jumps the line (most recent first). `end` queues one stop
//!   sentinel per worker; `join` is bounded per worker.
//! - [`PriorityDispatchQueue`]: one worker, three tiers ([`Priority`]), with
//!   pending items replaced by [`DispatchId`].
//!
//! ```text
//!  producers ──add──────────►┌───────────────────────────┐
//!            ──add_at_start─►│ front ◄── buffer ──► back │──► worker-0 ──┐
//!                            └───────────────────────────┘──► worker-1 ──┤
//!                                                                        ▼
//!                                      blocking: run on the worker thread
//!                                      future:   ExecutionContext::call or
//!                                                the worker's own runtime
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use jukebox::queue::{ShutdownRegistry, Work, WorkQueue};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let shutdown = ShutdownRegistry::new();
//! let queue = Arc::new(WorkQueue::new("announcements", 2));
//! shutdown.register(queue.clone());
//! queue.start()?;
//!
//! queue.add(Work::blocking("now-playing", || {
//!     println!("Now playing: track 1");
//!     Ok::<_, std::io::Error>(())
//! }))?;
//!
//! shutdown.wait_for_end(Duration::from_secs(5));
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod item;
pub mod registry;
pub mod work;

pub use dispatch::{DispatchId, Priority, PriorityDispatchQueue};
pub use error::{QueueError, QueueResult, WorkError};
pub use item::{Work, WorkItem};
pub use registry::{Drain, ShutdownRegistry};
pub use work::WorkQueue;

#[cfg(test)]
mod tests;
