//! Execution Contexts
//!
//! Single-threaded cooperative schedulers, each owned by exactly one OS thread,
//! plus the cross-context submission primitive used by the task scheduler and
//! the work queues.
//!
//! # Example
//!
//! ```rust,no_run
//! use jukebox::context::ExecutionContext;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let voice = ExecutionContext::start("voice")?;
//!
//! // Runs on the "voice" thread; the caller blocks until it completes
//! let latency_ms = voice.call(async { 42u64 })?;
//! assert_eq!(latency_ms, 42);
//!
//! voice.stop();
//! voice.join(None);
//! # Ok(())
//! # }
//! ```

mod error;
mod execution;

pub use error::{ContextError, ContextResult};
pub use execution::{ExecutionContext, Submitted};
