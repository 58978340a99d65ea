//! Generic multi-worker work queue
//!
//! One double-ended buffer drained by N worker threads. `add` appends at the
//! back; `add_at_start` pushes at the front, so jumped-in-line items run most
//! recent first and ahead of everything added normally. Idle workers block on
//! a condition variable.

use crate::core::sync::{handle_mutex_poison, wait_while};
use crate::core::threads::{spawn_watched, WatchedThread};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::item::{LocalRuntime, WorkItem};
use crate::queue::registry::Drain;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

enum Entry {
    Work(WorkItem),
    /// Terminates the one worker that pops it
    Stop,
}

#[derive(Default)]
struct Buffer {
    entries: VecDeque<Entry>,
    pending: usize,
    ended: bool,
}

struct Shared {
    buffer: Mutex<Buffer>,
    available: Condvar,
}

impl Shared {
    fn lock(&self) -> QueueResult<MutexGuard<'_, Buffer>> {
        handle_mutex_poison(self.buffer.lock(), |message| QueueError::Poisoned { message })
    }

    fn pop(&self) -> QueueResult<Entry> {
        let guard = self.lock()?;
        let mut buffer = wait_while(
            &self.available,
            guard,
            |buffer| buffer.entries.is_empty(),
            |message| QueueError::Poisoned { message },
        )?;
        let entry = buffer
            .entries
            .pop_front()
            .ok_or_else(|| QueueError::Poisoned {
                message: "woken with an empty buffer".to_string(),
            })?;
        if matches!(entry, Entry::Work(_)) {
            buffer.pending -= 1;
        }
        Ok(entry)
    }
}

/// Work queue drained by a fixed pool of worker threads
pub struct WorkQueue {
    name: String,
    worker_count: usize,
    shared: Arc<Shared>,
    workers: Mutex<Vec<WatchedThread>>,
}

impl WorkQueue {
    /// Create a queue with `worker_count` workers (at least one)
    ///
    /// Items may be added before [`start`](Self::start); they wait in the
    /// buffer until a worker is running.
    pub fn new(name: impl Into<String>, worker_count: usize) -> Self {
        Self {
            name: name.into(),
            worker_count: worker_count.max(1),
            shared: Arc::new(Shared {
                buffer: Mutex::new(Buffer::default()),
                available: Condvar::new(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Number of work items waiting to run
    pub fn len(&self) -> usize {
        match self.shared.buffer.lock() {
            Ok(buffer) => buffer.pending,
            Err(poisoned) => poisoned.into_inner().pending,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an item; runs after everything already queued
    pub fn add(&self, item: impl Into<WorkItem>) -> QueueResult<()> {
        self.insert(Entry::Work(item.into()), false)
    }

    /// Push an item in front of everything already queued
    pub fn add_at_start(&self, item: impl Into<WorkItem>) -> QueueResult<()> {
        self.insert(Entry::Work(item.into()), true)
    }

    fn insert(&self, entry: Entry, at_start: bool) -> QueueResult<()> {
        let mut buffer = self.shared.lock()?;
        if buffer.ended {
            return Err(QueueError::Closed {
                queue: self.name.clone(),
            });
        }
        if at_start {
            buffer.entries.push_front(entry);
        } else {
            buffer.entries.push_back(entry);
        }
        buffer.pending += 1;
        drop(buffer);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Launch the worker threads
    pub fn start(&self) -> QueueResult<()> {
        let mut workers = handle_mutex_poison(self.workers.lock(), |message| {
            QueueError::Poisoned { message }
        })?;
        if !workers.is_empty() {
            return Err(QueueError::AlreadyStarted {
                queue: self.name.clone(),
            });
        }

        for worker_id in 0..self.worker_count {
            let worker_name = format!("{}-worker-{}", self.name, worker_id);
            let shared = Arc::clone(&self.shared);
            let label = worker_name.clone();
            let thread = spawn_watched(worker_name, move || worker_loop(label, shared)).map_err(
                |e| QueueError::Spawn {
                    queue: self.name.clone(),
                    cause: e.to_string(),
                },
            )?;
            workers.push(thread);
        }
        log::debug!(
            "Work queue '{}' started {} worker(s)",
            self.name,
            self.worker_count
        );
        Ok(())
    }

    /// Close the queue and queue one stop sentinel per worker
    ///
    /// Items already queued still run; the sentinels sit behind them. Calling
    /// `end` again has no effect.
    pub fn end(&self) -> QueueResult<()> {
        let mut buffer = self.shared.lock()?;
        if buffer.ended {
            log::debug!("Work queue '{}' already ended", self.name);
            return Ok(());
        }
        buffer.ended = true;
        for _ in 0..self.worker_count {
            buffer.entries.push_back(Entry::Stop);
        }
        drop(buffer);
        self.shared.available.notify_all();
        log::debug!("Work queue '{}' ended", self.name);
        Ok(())
    }

    /// Wait for the worker threads to exit
    ///
    /// The timeout applies to each worker separately, so the total wait is
    /// bounded by `worker_count * timeout`. Returns whether every worker
    /// exited.
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        let mut workers = match self.workers.lock() {
            Ok(workers) => workers,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut all_joined = true;
        for worker in workers.iter_mut() {
            if !worker.join(timeout) {
                all_joined = false;
            }
        }
        if all_joined {
            log::debug!("Work queue '{}' joined", self.name);
        } else {
            log::warn!(
                "Work queue '{}' still has workers running after {:?} each",
                self.name,
                timeout
            );
        }
        all_joined
    }
}

impl Drain for WorkQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn end(&self) -> QueueResult<()> {
        WorkQueue::end(self)
    }

    fn join(&self, timeout: Option<Duration>) -> bool {
        WorkQueue::join(self, timeout)
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        // Idle workers would otherwise wait on the condvar forever
        let _ = self.end();
    }
}

impl std::fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("worker_count", &self.worker_count)
            .field("pending", &self.len())
            .finish()
    }
}

fn worker_loop(worker: String, shared: Arc<Shared>) {
    let mut local = LocalRuntime::default();
    loop {
        match shared.pop() {
            Ok(Entry::Work(item)) => item.execute(&worker, &mut local),
            Ok(Entry::Stop) => break,
            Err(e) => {
                log::error!("[{}] stopping: {}", worker, e);
                break;
            }
        }
    }
    log::debug!("[{}] exited", worker);
}
