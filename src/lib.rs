//! Runtime substrate for the jukebox bot
//!
//! - [`components`]: dependency-ordered lifecycle for named singletons
//! - [`scheduler`]: long-lived tasks, each on its own execution context
//! - [`queue`]: work queues that hand side effects to worker threads
//! - [`context`]: the thread-bound cooperative executors underneath
//! - [`services`]: the built-in queue services and monitor task

pub mod app;
pub mod components;
pub mod context;
pub mod core;
pub mod queue;
pub mod scheduler;
pub mod services;
