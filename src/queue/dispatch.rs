//! Priority dispatch queue
//!
//! A single consumer draining three fixed tiers, highest first. Every pending
//! item has a unique [`DispatchId`]; adding under an id that is still pending
//! replaces the stored item, so repeated "update the same status" calls
//! collapse into the latest one instead of all running.

use crate::core::sync::{handle_mutex_poison, wait_while};
use crate::core::threads::{spawn_watched, WatchedThread};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::item::{LocalRuntime, WorkItem};
use crate::queue::registry::Drain;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Dispatch tier; lower values drain first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Priority {
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    fn tier(self) -> usize {
        self as usize - 1
    }
}

/// Identifies one logical slot in the dispatch queue
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchId(String);

impl DispatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DispatchId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DispatchId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

struct Pending {
    priority: Priority,
    item: WorkItem,
}

#[derive(Default)]
struct Tiers {
    order: [VecDeque<DispatchId>; 3],
    items: HashMap<DispatchId, Pending>,
    stopped: bool,
}

impl Tiers {
    fn remove_from_tier(&mut self, id: &DispatchId, priority: Priority) {
        let tier = &mut self.order[priority.tier()];
        if let Some(position) = tier.iter().position(|queued| queued == id) {
            tier.remove(position);
        }
    }

    fn next(&mut self) -> Option<(DispatchId, WorkItem)> {
        for tier in 0..self.order.len() {
            if let Some(id) = self.order[tier].pop_front() {
                if let Some(pending) = self.items.remove(&id) {
                    return Some((id, pending.item));
                }
            }
        }
        None
    }
}

struct Shared {
    tiers: Mutex<Tiers>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> QueueResult<MutexGuard<'_, Tiers>> {
        handle_mutex_poison(self.tiers.lock(), |message| QueueError::Poisoned { message })
    }
}

/// Single-consumer queue with three priority tiers and replace-by-id
pub struct PriorityDispatchQueue {
    name: String,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    worker: Mutex<Option<WatchedThread>>,
}

impl PriorityDispatchQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared {
                tiers: Mutex::new(Tiers::default()),
                wake: Condvar::new(),
            }),
            next_id: AtomicU64::new(1),
            worker: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue `item` under `id` (generated when `None`) at `priority`
    ///
    /// Generated ids never collide with a pending id. If `id` is still pending, the stored item is replaced and re-queued at
    /// the back of the new priority's tier. Returns the id for later
    /// replacements of the same slot.
    pub fn add(
        &self,
        item: impl Into<WorkItem>,
        id: Option<DispatchId>,
        priority: Priority,
    ) -> QueueResult<DispatchId> {
        let item = item.into();

        let mut tiers = self.shared.lock()?;
        if tiers.stopped {
            return Err(QueueError::Closed {
                queue: self.name.clone(),
            });
        }
        let id = match id {
            Some(id) => id,
            None => self.generate_id(&tiers),
        };
        if let Some(previous) = tiers.items.get(&id).map(|p| p.priority) {
            log::trace!(
                "Dispatch queue '{}' replacing '{}' ({:?} -> {:?})",
                self.name,
                id,
                previous,
                priority
            );
            tiers.remove_from_tier(&id, previous);
        }
        tiers.order[priority.tier()].push_back(id.clone());
        tiers.items.insert(id.clone(), Pending { priority, item });
        drop(tiers);

        self.shared.wake.notify_one();
        Ok(id)
    }

    /// Next `auto-<n>` id not held by a pending item
    fn generate_id(&self, tiers: &Tiers) -> DispatchId {
        loop {
            let id = DispatchId(format!("auto-{}", self.next_id.fetch_add(1, Ordering::Relaxed)));
            if !tiers.items.contains_key(&id) {
                return id;
            }
        }
    }

    /// Number of items waiting to run
    pub fn pending(&self) -> usize {
        match self.shared.tiers.lock() {
            Ok(tiers) => tiers.items.len(),
            Err(poisoned) => poisoned.into_inner().items.len(),
        }
    }

    /// Whether `id` names a pending item
    pub fn contains(&self, id: &DispatchId) -> bool {
        match self.shared.tiers.lock() {
            Ok(tiers) => tiers.items.contains_key(id),
            Err(poisoned) => poisoned.into_inner().items.contains_key(id),
        }
    }

    /// Priority of a pending item
    pub fn priority_of(&self, id: &DispatchId) -> Option<Priority> {
        let tiers = match self.shared.tiers.lock() {
            Ok(tiers) => tiers,
            Err(poisoned) => poisoned.into_inner(),
        };
        tiers.items.get(id).map(|pending| pending.priority)
    }

    pub fn is_stopped(&self) -> bool {
        match self.shared.tiers.lock() {
            Ok(tiers) => tiers.stopped,
            Err(poisoned) => poisoned.into_inner().stopped,
        }
    }

    /// Launch the consumer thread
    pub fn start(&self) -> QueueResult<()> {
        let mut worker = handle_mutex_poison(self.worker.lock(), |message| {
            QueueError::Poisoned { message }
        })?;
        if worker.is_some() {
            return Err(QueueError::AlreadyStarted {
                queue: self.name.clone(),
            });
        }
        if self.is_stopped() {
            return Err(QueueError::Closed {
                queue: self.name.clone(),
            });
        }

        let worker_name = format!("{}-dispatch", self.name);
        let label = worker_name.clone();
        let shared = Arc::clone(&self.shared);
        let thread = spawn_watched(worker_name, move || dispatch_loop(label, shared)).map_err(|e| {
            QueueError::Spawn {
                queue: self.name.clone(),
                cause: e.to_string(),
            }
        })?;
        *worker = Some(thread);
        log::debug!("Dispatch queue '{}' started", self.name);
        Ok(())
    }

    /// Close the queue and wake the consumer so it exits
    ///
    /// Items still pending are discarded. A second call only logs a warning.
    pub fn stop(&self) -> QueueResult<()> {
        let mut tiers = self.shared.lock()?;
        if tiers.stopped {
            log::warn!("Dispatch queue '{}' is already stopped", self.name);
            return Ok(());
        }
        tiers.stopped = true;
        let discarded = tiers.items.len();
        tiers.items.clear();
        for tier in tiers.order.iter_mut() {
            tier.clear();
        }
        drop(tiers);

        self.shared.wake.notify_all();
        if discarded > 0 {
            log::info!(
                "Dispatch queue '{}' stopped, discarded {} pending item(s)",
                self.name,
                discarded
            );
        } else {
            log::debug!("Dispatch queue '{}' stopped", self.name);
        }
        Ok(())
    }

    /// Wait for the consumer thread to exit
    pub fn join(&self, timeout: Option<Duration>) -> bool {
        let mut worker = match self.worker.lock() {
            Ok(worker) => worker,
            Err(poisoned) => poisoned.into_inner(),
        };
        match worker.as_mut() {
            Some(thread) => thread.join(timeout),
            None => true,
        }
    }
}

impl Drain for PriorityDispatchQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn end(&self) -> QueueResult<()> {
        if self.is_stopped() {
            return Ok(());
        }
        self.stop()
    }

    fn join(&self, timeout: Option<Duration>) -> bool {
        PriorityDispatchQueue::join(self, timeout)
    }
}

impl Drop for PriorityDispatchQueue {
    fn drop(&mut self) {
        if !self.is_stopped() {
            let _ = self.stop();
        }
    }
}

impl fmt::Debug for PriorityDispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityDispatchQueue")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn dispatch_loop(worker: String, shared: Arc<Shared>) {
    let mut local = LocalRuntime::default();
    loop {
        let next = shared.lock().and_then(|guard| {
            let mut tiers = wait_while(
                &shared.wake,
                guard,
                |tiers| !tiers.stopped && tiers.items.is_empty(),
                |message| QueueError::Poisoned { message },
            )?;
            Ok(if tiers.stopped { None } else { tiers.next() })
        });

        match next {
            Ok(Some((id, item))) => {
                log::trace!("[{}] dispatching '{}'", worker, id);
                item.execute(&worker, &mut local);
            }
            Ok(None) => break,
            Err(e) => {
                log::error!("[{}] stopping: {}", worker, e);
                break;
            }
        }
    }
    log::debug!("[{}] exited", worker);
}
