//! Task Scheduler Error Types

use crate::components::ComponentError;
use crate::context::ContextError;
use crate::core::error_handling::ContextualError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Task '{name}' is already registered")]
    AlreadyRegistered { name: String },

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Tasks '{first}' and '{second}' share execution context '{context}'")]
    SharedContext {
        first: String,
        second: String,
        context: String,
    },

    #[error("Task '{name}' is registered without its own context but supplies none")]
    MissingContext { name: String },

    #[error("Scheduler lifecycle violation: {message}")]
    Lifecycle { message: String },
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: message.into(),
        }
    }
}

impl ContextualError for SchedulerError {
    fn is_user_actionable(&self) -> bool {
        match self {
            SchedulerError::Component(e) => e.is_user_actionable(),
            SchedulerError::AlreadyRegistered { .. }
            | SchedulerError::SharedContext { .. }
            | SchedulerError::MissingContext { .. } => true,
            SchedulerError::Context(_) | SchedulerError::Lifecycle { .. } => false,
        }
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}
