//! Component Registry Error Types
//!
//! Registration and ordering errors are fatal to startup, so each variant
//! carries the complete set of offending names rather than the first one found.

use crate::core::error_handling::ContextualError;
use std::fmt;

/// Result type alias for component registry operations
pub type ComponentResult<T> = Result<T, ComponentError>;

/// A dependency name that does not resolve to a registered component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    /// The name that could not be found
    pub name: String,
    /// The component or task that asked for it, if any
    pub requested_by: Option<String>,
}

impl fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requested_by {
            Some(requester) => write!(f, "'{}' (required by '{}')", self.name, requester),
            None => write!(f, "'{}'", self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComponentError {
    #[error("Component '{name}' is already registered")]
    AlreadyRegistered { name: String },

    #[error("Not registered: {}", format_missing(.missing))]
    NotRegistered { missing: Vec<MissingDependency> },

    #[error("Circular dependency between components: {}", .names.join(", "))]
    CircularDependency { names: Vec<String> },

    #[error("Component '{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("Failed to inject dependencies into '{name}': {cause}")]
    InjectFailed { name: String, cause: String },

    #[error("Component '{name}' failed to start: {cause}")]
    StartFailed { name: String, cause: String },

    #[error("Component '{name}' failed to stop: {cause}")]
    StopFailed { name: String, cause: String },

    #[error("Lifecycle violation: {message}")]
    Lifecycle { message: String },
}

impl ComponentError {
    /// `NotRegistered` for a single name looked up directly
    pub fn not_registered(name: impl Into<String>) -> Self {
        Self::NotRegistered {
            missing: vec![MissingDependency {
                name: name.into(),
                requested_by: None,
            }],
        }
    }

    /// `NotRegistered` for a dependency declared by `requester`
    pub fn missing_dependency(name: impl Into<String>, requester: impl Into<String>) -> Self {
        Self::NotRegistered {
            missing: vec![MissingDependency {
                name: name.into(),
                requested_by: Some(requester.into()),
            }],
        }
    }

    /// Attribute an inject hook failure to `name`
    ///
    /// Lookup errors raised through [`Dependencies`](crate::components::Dependencies)
    /// already name the dependency and stay as they are.
    pub fn inject_failed(name: &str, cause: ComponentError) -> Self {
        match cause {
            e @ (Self::NotRegistered { .. } | Self::TypeMismatch { .. } | Self::InjectFailed { .. }) => e,
            e => Self::InjectFailed {
                name: name.to_string(),
                cause: e.to_string(),
            },
        }
    }

    /// Attribute a start hook failure to `name`
    pub fn start_failed(name: &str, cause: ComponentError) -> Self {
        match cause {
            e @ Self::StartFailed { .. } => e,
            e => Self::StartFailed {
                name: name.to_string(),
                cause: e.to_string(),
            },
        }
    }

    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: message.into(),
        }
    }
}

fn format_missing(missing: &[MissingDependency]) -> String {
    missing
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ContextualError for ComponentError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            ComponentError::AlreadyRegistered { .. }
                | ComponentError::NotRegistered { .. }
                | ComponentError::CircularDependency { .. }
                | ComponentError::TypeMismatch { .. }
        )
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }
}
