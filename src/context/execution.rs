//! Dedicated-thread execution contexts
//!
//! An [`ExecutionContext`] is one OS thread driving a tokio current-thread
//! runtime. Everything submitted to it is polled on that thread only, so calls
//! interleave cooperatively with the other work on the context but never run in
//! parallel with it.

use crate::context::error::{ContextError, ContextResult};
use crate::core::sync::handle_mutex_poison;
use crate::core::threads::{panic_message, spawn_watched, WatchedThread};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::thread::ThreadId;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a single-threaded cooperative execution context
///
/// Cloning the handle is cheap; all clones refer to the same thread. The
/// context stops when [`stop`](Self::stop) is called or the last handle is
/// dropped.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    name: String,
    handle: Handle,
    thread_id: ThreadId,
    closed: Arc<AtomicBool>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<WatchedThread>,
}

type Ready = Result<(Handle, oneshot::Sender<()>, ThreadId), ContextError>;

impl ExecutionContext {
    /// Spawn the owning thread and wait until the context accepts work
    pub fn start(name: impl Into<String>) -> ContextResult<Self> {
        let name = name.into();
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let closed = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Ready>();

        let thread_name = name.clone();
        let thread_closed = Arc::clone(&closed);
        let thread = spawn_watched(format!("ctx-{}", name), move || {
            run_context(thread_name, thread_closed, ready_tx)
        })
        .map_err(|e| ContextError::Spawn {
            context: name.clone(),
            cause: e.to_string(),
        })?;

        let (handle, stop_tx, thread_id) = ready_rx.recv().map_err(|_| ContextError::Spawn {
            context: name.clone(),
            cause: "context thread exited during startup".to_string(),
        })??;

        log::debug!("Execution context '{}' (#{}) started", name, id);

        Ok(Self {
            inner: Arc::new(Inner {
                id,
                name,
                handle,
                thread_id,
                closed,
                stop_tx: Mutex::new(Some(stop_tx)),
                thread: Mutex::new(thread),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Whether the context has stopped accepting work
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Whether the calling thread is this context's owning thread
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.inner.thread_id
    }

    /// Schedule a future on the context from any thread
    ///
    /// The returned [`Submitted`] resolves to the future's output once it has
    /// completed on the context; it can be awaited from any executor.
    pub fn submit<F>(&self, future: F) -> ContextResult<Submitted<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(Submitted {
            context: self.inner.name.clone(),
            handle: self.inner.handle.spawn(future),
        })
    }

    /// Schedule a future on the context and block until it completes
    ///
    /// Must not be called from the context's own thread.
    pub fn call<F>(&self, future: F) -> ContextResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.call_inner(future, None)
    }

    /// As [`call`](Self::call), giving up after `timeout`
    ///
    /// On timeout the call keeps running on the context; only the caller stops
    /// waiting for it.
    pub fn call_timeout<F>(&self, future: F, timeout: Duration) -> ContextResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.call_inner(future, Some(timeout))
    }

    fn call_inner<F>(&self, future: F, timeout: Option<Duration>) -> ContextResult<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        if self.is_current() {
            return Err(ContextError::SameContext {
                context: self.inner.name.clone(),
            });
        }

        let (result_tx, result_rx) = mpsc::sync_channel(1);
        let submitted = self.submit(async move {
            let _ = result_tx.send(future.await);
        })?;

        let received = match timeout {
            Some(timeout) => result_rx.recv_timeout(timeout).map_err(|e| match e {
                mpsc::RecvTimeoutError::Timeout => Some(timeout),
                mpsc::RecvTimeoutError::Disconnected => None,
            }),
            None => result_rx.recv().map_err(|_| None),
        };

        match received {
            Ok(output) => Ok(output),
            Err(Some(timeout)) => Err(ContextError::Timeout {
                context: self.inner.name.clone(),
                timeout,
            }),
            // The wrapper ended without sending: it was cancelled or panicked,
            // and the join handle says which.
            Err(None) => match futures::executor::block_on(submitted) {
                Ok(()) => Err(ContextError::Cancelled {
                    context: self.inner.name.clone(),
                }),
                Err(e) => Err(e),
            },
        }
    }

    /// Ask the context to stop running; idempotent
    ///
    /// Work still pending on the context is cancelled when the owning thread
    /// tears its runtime down.
    pub fn stop(&self) {
        self.inner.request_stop();
    }

    /// Wait for the owning thread to exit; `None` waits indefinitely
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        if self.is_current() {
            log::warn!(
                "Execution context '{}' cannot join its own thread",
                self.inner.name
            );
            return false;
        }
        match handle_mutex_poison(self.inner.thread.lock(), |message| message) {
            Ok(mut thread) => thread.join(timeout),
            Err(message) => {
                log::error!("Execution context '{}': {}", self.inner.name, message);
                false
            }
        }
    }

    fn closed_error(&self) -> ContextError {
        ContextError::Closed {
            context: self.inner.name.clone(),
        }
    }
}

impl Inner {
    fn request_stop(&self) {
        self.closed.store(true, Ordering::Release);
        let sender = match self.stop_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            log::debug!("Stopping execution context '{}'", self.name);
            let _ = sender.send(());
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.request_stop();
    }
}

impl PartialEq for ExecutionContext {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for ExecutionContext {}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn run_context(name: String, closed: Arc<AtomicBool>, ready_tx: mpsc::Sender<Ready>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            closed.store(true, Ordering::Release);
            let _ = ready_tx.send(Err(ContextError::Spawn {
                context: name,
                cause: e.to_string(),
            }));
            return;
        }
    };

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let ready = (
        runtime.handle().clone(),
        stop_tx,
        std::thread::current().id(),
    );
    if ready_tx.send(Ok(ready)).is_err() {
        return;
    }

    // A dropped sender counts as a stop request as well
    runtime.block_on(async {
        let _ = stop_rx.await;
    });

    closed.store(true, Ordering::Release);
    drop(runtime);
    log::debug!("Execution context '{}' stopped", name);
}

/// A call scheduled on an [`ExecutionContext`]
#[derive(Debug)]
pub struct Submitted<T> {
    context: String,
    handle: JoinHandle<T>,
}

impl<T> Submitted<T> {
    /// Whether the call has finished on its context
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Future for Submitted<T> {
    type Output = ContextResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let context = self.context.clone();
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|result| result.map_err(|e| join_error(context, e)))
    }
}

fn join_error(context: String, error: JoinError) -> ContextError {
    if error.is_panic() {
        let message = panic_message(error.into_panic().as_ref());
        ContextError::Panicked { context, message }
    } else {
        ContextError::Cancelled { context }
    }
}
