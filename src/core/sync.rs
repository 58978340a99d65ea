//! Synchronization utilities for robust mutex handling
//!
//! Queue buffers and scheduler bookkeeping are shared between producer threads
//! and worker threads. A panic while one of those locks is held poisons it; these
//! helpers turn the poison into a domain error instead of a second panic.

use std::sync::{Condvar, LockResult, MutexGuard};

/// Handle poisoned mutex cases with consistent error handling
///
/// Converts mutex poison errors into application-specific errors using a
/// provided error constructor.
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use jukebox::core::sync::handle_mutex_poison;
/// use jukebox::queue::QueueError;
///
/// let mutex = Mutex::new(42);
/// let guard = handle_mutex_poison(mutex.lock(), |message| QueueError::Poisoned { message })
///     .unwrap();
/// assert_eq!(*guard, 42);
/// ```
pub fn handle_mutex_poison<T, E>(
    result: LockResult<T>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<T, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "Internal synchronisation error (mutex poisoned). This indicates a panic occurred while holding a lock. PoisonError: {:?}",
            poison_err
        ))
    })
}

/// Block on a condition variable until `condition` returns false
///
/// Poisoning is reported through `error_constructor` exactly like
/// [`handle_mutex_poison`].
pub fn wait_while<'a, T, E>(
    condvar: &Condvar,
    guard: MutexGuard<'a, T>,
    condition: impl FnMut(&mut T) -> bool,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<MutexGuard<'a, T>, E> {
    handle_mutex_poison(condvar.wait_while(guard, condition), error_constructor)
}
