//! Work items
//!
//! [`Work<T>`] is the typed, caller-facing description of one unit of work: a
//! blocking closure or a future, an optional owning execution context, and
//! optional success and error callbacks. Queues store it type-erased as a
//! [`WorkItem`].

use crate::context::ExecutionContext;
use crate::core::threads::panic_message;
use crate::queue::error::WorkError;
use futures::future::{BoxFuture, FutureExt};
use std::any::type_name;
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

type SuccessCallback<T> = Box<dyn FnOnce(T) + Send>;
type ErrorCallback = Box<dyn FnOnce(WorkError) + Send>;
type Job = Box<dyn FnOnce(&mut LocalRuntime) -> Result<(), WorkError> + Send>;

enum Target<T> {
    Blocking(Box<dyn FnOnce() -> Result<T, WorkError> + Send>),
    Future(BoxFuture<'static, Result<T, WorkError>>),
}

/// One unit of work producing a `T`
///
/// ```rust
/// use jukebox::queue::Work;
///
/// let work = Work::blocking("announce", || Ok::<_, std::io::Error>(3))
///     .on_success(|tracks| println!("{} tracks queued", tracks))
///     .on_error(|e| eprintln!("announce failed: {}", e));
/// assert_eq!(work.label(), "announce");
/// ```
pub struct Work<T> {
    label: String,
    target_name: &'static str,
    target: Target<T>,
    context: Option<ExecutionContext>,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T: Send + 'static> Work<T> {
    /// Work that runs synchronously on the worker thread
    pub fn blocking<F, E>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + 'static,
    {
        Self::new(
            label,
            type_name::<F>(),
            Target::Blocking(Box::new(move || f().map_err(WorkError::failed))),
        )
    }

    /// Work that is awaited to completion
    ///
    /// Without an owning context the future runs on the worker thread's own
    /// runtime; see [`on_context`](Self::on_context).
    pub fn future<Fut, E>(label: impl Into<String>, future: Fut) -> Self
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: Into<Box<dyn StdError + Send + Sync>> + 'static,
    {
        Self::new(
            label,
            type_name::<Fut>(),
            Target::Future(async move { future.await.map_err(WorkError::failed) }.boxed()),
        )
    }

    fn new(label: impl Into<String>, target_name: &'static str, target: Target<T>) -> Self {
        Self {
            label: label.into(),
            target_name,
            target,
            context: None,
            on_success: None,
            on_error: None,
        }
    }

    /// Run the future on `context` instead of the worker thread
    ///
    /// The worker blocks until the call has completed on the context. Blocking
    /// work always runs on the worker thread and ignores this.
    pub fn on_context(mut self, context: &ExecutionContext) -> Self {
        self.context = Some(context.clone());
        self
    }

    pub fn on_success(mut self, callback: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl FnOnce(WorkError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl<T: Send + 'static> From<Work<T>> for WorkItem {
    fn from(work: Work<T>) -> Self {
        let Work {
            label,
            target_name,
            target,
            context,
            on_success,
            on_error,
        } = work;

        let job: Job = Box::new(move |local: &mut LocalRuntime| {
            let outcome = match (target, context) {
                (Target::Blocking(f), _) => run_blocking(f),
                (Target::Future(future), Some(context)) => {
                    context.call(future).unwrap_or_else(|e| Err(e.into()))
                }
                (Target::Future(future), None) => local.block_on(future),
            };
            match (outcome, on_error) {
                (Ok(value), _) => {
                    if let Some(callback) = on_success {
                        callback(value);
                    }
                    Ok(())
                }
                (Err(e), Some(callback)) => {
                    callback(e);
                    Ok(())
                }
                (Err(e), None) => Err(e),
            }
        });

        WorkItem {
            label,
            target: target_name,
            job,
        }
    }
}

/// A type-erased unit of work as stored by the queues
pub struct WorkItem {
    label: String,
    target: &'static str,
    job: Job,
}

impl WorkItem {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Type name of the callable or future this item wraps
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Run the item and route its outcome
    ///
    /// Failures without an error callback, and panics raised by the callbacks
    /// themselves, are logged against `worker`.
    pub(crate) fn execute(self, worker: &str, local: &mut LocalRuntime) {
        let WorkItem { label, target, job } = self;
        log::trace!("[{}] running '{}'", worker, label);

        let result = panic::catch_unwind(AssertUnwindSafe(|| job(local))).unwrap_or_else(|payload| {
            Err(WorkError::Panicked {
                message: panic_message(payload.as_ref()),
            })
        });
        if let Err(e) = result {
            log::error!(
                "[{}] work item '{}' failed (target {}): {}",
                worker,
                label,
                target,
                e
            );
        }
    }
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("label", &self.label)
            .field("target", &self.target)
            .finish()
    }
}

fn run_blocking<T>(f: Box<dyn FnOnce() -> Result<T, WorkError> + Send>) -> Result<T, WorkError> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(WorkError::Panicked {
            message: panic_message(payload.as_ref()),
        })
    })
}

/// Per-worker runtime for futures that have no owning context
///
/// Built on first use so workers that only see blocking work never create one.
#[derive(Default)]
pub(crate) struct LocalRuntime {
    runtime: Option<tokio::runtime::Runtime>,
}

impl LocalRuntime {
    pub(crate) fn block_on<T>(
        &mut self,
        future: BoxFuture<'static, Result<T, WorkError>>,
    ) -> Result<T, WorkError> {
        let runtime = match self.runtime.take() {
            Some(runtime) => runtime,
            None => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| WorkError::Runtime {
                    cause: e.to_string(),
                })?,
        };

        let result = runtime
            .block_on(AssertUnwindSafe(future).catch_unwind())
            .unwrap_or_else(|payload| {
                Err(WorkError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });
        self.runtime = Some(runtime);
        result
    }
}
