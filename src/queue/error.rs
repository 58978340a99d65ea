//! Queue Error Types

use crate::context::ContextError;
use crate::core::error_handling::ContextualError;
use std::error::Error as StdError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Queue '{queue}' is closed")]
    Closed { queue: String },

    #[error("Queue '{queue}' is already started")]
    AlreadyStarted { queue: String },

    #[error("Could not spawn worker for queue '{queue}': {cause}")]
    Spawn { queue: String, cause: String },

    #[error("{message}")]
    Poisoned { message: String },
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

impl ContextualError for QueueError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<String> {
        None
    }
}

/// Failure of a single work item
///
/// Handed to the item's error callback, or logged by the worker when the item
/// has none. Never terminates the worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkError {
    #[error("{0}")]
    Failed(Box<dyn StdError + Send + Sync>),

    #[error("panicked: {message}")]
    Panicked { message: String },

    #[error(transparent)]
    Context(ContextError),

    #[error("could not build worker runtime: {cause}")]
    Runtime { cause: String },
}

impl WorkError {
    pub fn failed(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        WorkError::Failed(error.into())
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, WorkError::Panicked { .. })
    }
}

impl From<ContextError> for WorkError {
    fn from(error: ContextError) -> Self {
        match error {
            ContextError::Panicked { message, .. } => WorkError::Panicked { message },
            other => WorkError::Context(other),
        }
    }
}
