//! Execution Context Error Types

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("Execution context '{context}' is closed")]
    Closed { context: String },

    #[error("Blocking call into execution context '{context}' from its own thread")]
    SameContext { context: String },

    #[error("Call on execution context '{context}' was cancelled before completing")]
    Cancelled { context: String },

    #[error("Call on execution context '{context}' did not finish within {timeout:?}")]
    Timeout { context: String, timeout: Duration },

    #[error("Failed to start execution context '{context}': {cause}")]
    Spawn { context: String, cause: String },

    #[error("Call on execution context '{context}' panicked: {message}")]
    Panicked { context: String, message: String },
}

/// Result type for execution context operations
pub type ContextResult<T> = Result<T, ContextError>;
