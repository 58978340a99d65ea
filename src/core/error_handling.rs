//! Startup error reporting
//!
//! Registration, ordering and configuration errors are fatal to process
//! startup. This module decides how much of such an error the operator sees:
//! errors they can fix (a missing dependency, a bad config key) are printed as
//! is, anything else is reported by operation with the detail at debug level.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)`; otherwise it returns `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the operator can act on
    fn is_user_actionable(&self) -> bool;

    /// The operator-facing message for user-actionable errors
    fn user_message(&self) -> Option<String>;
}

/// Log a fatal startup error with the appropriate detail level
///
/// # Examples
/// ```rust,no_run
/// use jukebox::components::ComponentError;
/// use jukebox::core::error_handling::log_error_with_context;
///
/// let err = ComponentError::CircularDependency {
///     names: vec!["player".to_string(), "voice".to_string()],
/// };
/// log_error_with_context(&err, "Resolving component start order");
/// // Logs: "FATAL: Circular dependency between components: player, voice"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
