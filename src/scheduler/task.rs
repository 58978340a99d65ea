//! Task Trait
//!
//! A task is a long-lived background unit of work. It declares component
//! dependencies the same way a component does, and runs its main routine on an
//! execution context no other task uses.

use crate::components::{ComponentResult, Dependencies};
use crate::context::ExecutionContext;
use std::error::Error as StdError;

/// Error returned by a task's main or stop routine
pub type TaskError = Box<dyn StdError + Send + Sync>;

pub type TaskResult = Result<(), TaskError>;

/// A background worker managed by the scheduler
///
/// Both routines run on the task's execution context and take `&self`, so
/// state they share needs interior mutability.
#[async_trait::async_trait]
pub trait Task: Send + Sync + 'static {
    /// Names of the components this task requires
    fn dependencies() -> Vec<&'static str>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Receive started components before the task is scheduled
    fn inject(&mut self, _dependencies: &Dependencies) -> ComponentResult<()> {
        Ok(())
    }

    /// Main routine
    ///
    /// Returning ends the routine but not the context; the context runs until
    /// the scheduler stops it.
    async fn run(&self) -> TaskResult;

    /// Stop routine, called once at shutdown on the task's own context
    async fn stop(&self) -> TaskResult {
        Ok(())
    }

    /// Context supplied by the task itself
    ///
    /// Only consulted for tasks registered with `own_context: false`. The
    /// scheduler stops the returned context at shutdown.
    fn context(&self) -> Option<ExecutionContext> {
        None
    }
}

/// Registration options for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    /// Create a fresh execution context for the task
    pub own_context: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self { own_context: true }
    }
}

impl TaskOptions {
    /// The task supplies its own context through [`Task::context`]
    ///
    /// The scheduler takes ownership of the supplied context: at shutdown it
    /// runs the task's stop routine there and then stops the context.
    pub fn supplied_context() -> Self {
        Self { own_context: false }
    }
}

/// Lifecycle state of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Registered,
    DependenciesInjected,
    Running,
    /// The main routine returned an error; the context is still running
    Failed,
    StopRequested,
    Stopped,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TaskState::Registered => "registered",
            TaskState::DependenciesInjected => "dependencies-injected",
            TaskState::Running => "running",
            TaskState::Failed => "failed",
            TaskState::StopRequested => "stop-requested",
            TaskState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
