//! Named OS threads with bounded joins
//!
//! `std::thread::JoinHandle::join` cannot time out. Queue shutdown and context
//! teardown must never hang on a worker stuck in a long call, so every runtime
//! thread is spawned through [`spawn_watched`], which pairs the handle with a
//! channel that disconnects when the thread exits (normally or by panic).

use std::any::Any;
use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

/// A spawned thread whose termination can be awaited with a timeout
#[derive(Debug)]
pub struct WatchedThread {
    name: String,
    handle: Option<JoinHandle<()>>,
    exited: mpsc::Receiver<()>,
}

/// Spawn a named thread that can later be joined with a timeout
pub fn spawn_watched<F>(name: impl Into<String>, body: F) -> io::Result<WatchedThread>
where
    F: FnOnce() + Send + 'static,
{
    let name = name.into();
    let (exit_tx, exit_rx) = mpsc::channel::<()>();
    let handle = std::thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            // dropped on return and on unwind
            let _exit_guard = exit_tx;
            body();
        })?;

    Ok(WatchedThread {
        name,
        handle: Some(handle),
        exited: exit_rx,
    })
}

impl WatchedThread {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread has already been joined
    pub fn is_joined(&self) -> bool {
        self.handle.is_none()
    }

    /// Wait for the thread to exit
    ///
    /// `None` waits indefinitely. Returns true once the thread has exited and
    /// been joined; false if the timeout elapsed first, in which case the
    /// thread is left running and `join` may be called again later.
    pub fn join(&mut self, timeout: Option<Duration>) -> bool {
        if self.handle.is_none() {
            return true;
        }

        if let Some(timeout) = timeout {
            match self.exited.recv_timeout(timeout) {
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "Thread '{}' did not exit within {:?}",
                        self.name,
                        timeout
                    );
                    return false;
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            }
        }

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Thread '{}' terminated by panic", self.name);
            }
        }
        true
    }
}

/// Best-effort text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
