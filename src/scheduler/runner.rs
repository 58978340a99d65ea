//! Task Scheduler
//!
//! Runs each registered task's main routine on an execution context of its
//! own, then blocks until every context has stopped. Shutdown is driven by
//! SIGTERM / SIGINT or an explicit [`SchedulerHandle::stop_all`]: every task's
//! stop routine is submitted to that task's context, and the context is
//! stopped once the routine completes or the stop timeout expires.
//!
//! ```text
//! register(...)*  ──►  inject_tasks(&registry)  ──►  start_tasks()  (blocks)
//!                                                         │
//!                          signal / handle.stop_all() ────┤
//!                                                         ▼
//!                                 stop routines ─► contexts stopped ─► return
//! ```

use crate::components::{ComponentError, ComponentRegistry};
use crate::context::ExecutionContext;
use crate::core::shutdown::{ShutdownCoordinator, SignalListener};
use crate::core::threads::panic_message;
use crate::scheduler::error::{SchedulerError, SchedulerResult};
use crate::scheduler::task::{Task, TaskOptions, TaskResult, TaskState};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Default bound on a task's stop routine
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

type TaskFactory = Box<dyn Fn() -> Box<dyn Task> + Send + Sync>;

struct TaskDescriptor {
    name: String,
    dependencies: Vec<String>,
    options: TaskOptions,
    factory: TaskFactory,
    instance: Option<Arc<dyn Task>>,
    supplied_context: Option<ExecutionContext>,
}

struct RunningTask {
    name: String,
    task: Arc<dyn Task>,
    context: ExecutionContext,
}

struct Shared {
    running: Mutex<Vec<RunningTask>>,
    states: Mutex<HashMap<String, TaskState>>,
    shutdown: ShutdownCoordinator,
    stop_timeout: Duration,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    fn state(&self, name: &str) -> Option<TaskState> {
        lock(&self.states).get(name).copied()
    }

    fn set_state(&self, name: &str, state: TaskState) {
        let previous = lock(&self.states).insert(name.to_string(), state);
        if let Some(previous) = previous.filter(|p| *p != state) {
            log::debug!("Task '{}': {} -> {}", name, previous, state);
        }
    }

    fn mark_failed(&self, name: &str) {
        let mut states = lock(&self.states);
        if let Some(state) = states.get_mut(name).filter(|s| **s == TaskState::Running) {
            *state = TaskState::Failed;
        }
    }

    fn on_task_context(&self) -> bool {
        lock(&self.running).iter().any(|t| t.context.is_current())
    }

    /// Run every task's stop routine and stop its context
    ///
    /// Stop routines run concurrently on their own contexts and share one
    /// deadline of `stop_timeout`.
    fn stop_all(&self) {
        if !self.shutdown.trigger_shutdown() {
            log::debug!("Task shutdown already in progress");
            return;
        }
        let tasks: Vec<(String, Arc<dyn Task>, ExecutionContext)> = lock(&self.running)
            .iter()
            .map(|t| (t.name.clone(), Arc::clone(&t.task), t.context.clone()))
            .collect();
        if tasks.is_empty() {
            return;
        }
        log::info!("Stopping {} task(s)", tasks.len());

        let deadline = Instant::now() + self.stop_timeout;
        let mut waiting = Vec::with_capacity(tasks.len());
        for (name, task, context) in tasks {
            self.set_state(&name, TaskState::StopRequested);
            let (done_tx, done_rx) = mpsc::sync_channel::<TaskResult>(1);
            let submitted = context.submit(async move {
                let _ = done_tx.send(task.stop().await);
            });
            let done_rx = match submitted {
                Ok(_) => Some(done_rx),
                Err(e) => {
                    log::error!("Could not submit stop routine of task '{}': {}", name, e);
                    None
                }
            };
            waiting.push((name, context, done_rx));
        }

        for (name, context, done_rx) in waiting {
            if let Some(done_rx) = done_rx {
                let remaining = deadline.saturating_duration_since(Instant::now());
                match done_rx.recv_timeout(remaining) {
                    Ok(Ok(())) => log::info!("Task '{}' stopped", name),
                    Ok(Err(e)) => log::error!("Task '{}' stop routine failed: {}", name, e),
                    Err(RecvTimeoutError::Timeout) => log::warn!(
                        "Task '{}' did not stop within {:?}; stopping its context anyway",
                        name,
                        self.stop_timeout
                    ),
                    Err(RecvTimeoutError::Disconnected) => {
                        log::warn!("Task '{}' stop routine was cancelled or panicked", name)
                    }
                }
            }
            context.stop();
            self.set_state(&name, TaskState::Stopped);
        }
    }
}

/// Cloneable control handle for a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl SchedulerHandle {
    /// Stop every task; a no-op once shutdown has begun
    ///
    /// Blocks until all stop routines have finished or timed out. Called from
    /// a task's own context, the work is handed to a separate thread instead,
    /// since that context must stay free to run its stop routine.
    pub fn stop_all(&self) {
        if self.shared.on_task_context() {
            let shared = Arc::clone(&self.shared);
            let spawned = std::thread::Builder::new()
                .name("scheduler-stop".to_string())
                .spawn(move || shared.stop_all());
            if let Err(e) = spawned {
                log::error!("Could not spawn scheduler stop thread: {}", e);
            }
            return;
        }
        self.shared.stop_all();
    }

    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.shared.state(name)
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.shutdown.is_shutdown_requested()
    }

    /// Receiver notified when shutdown begins
    ///
    /// A receiver created after shutdown began sees nothing; check
    /// [`is_stopping`](Self::is_stopping) after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shared.shutdown.subscribe()
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("stopping", &self.is_stopping())
            .finish()
    }
}

/// Registry and runner of background tasks
pub struct TaskScheduler {
    descriptors: Vec<TaskDescriptor>,
    index: HashMap<String, usize>,
    injected: bool,
    started: bool,
    shared: Arc<Shared>,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::with_stop_timeout(DEFAULT_STOP_TIMEOUT)
    }

    pub fn with_stop_timeout(stop_timeout: Duration) -> Self {
        Self {
            descriptors: Vec::new(),
            index: HashMap::new(),
            injected: false,
            started: false,
            shared: Arc::new(Shared {
                running: Mutex::new(Vec::new()),
                states: Mutex::new(HashMap::new()),
                shutdown: ShutdownCoordinator::new(),
                stop_timeout,
            }),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        self.shared.stop_timeout
    }

    /// Register a task type under `name`
    pub fn register<T>(&mut self, name: &str, options: TaskOptions) -> SchedulerResult<()>
    where
        T: Task + Default,
    {
        self.register_factory(name, &T::dependencies(), options, || Box::new(T::default()))
    }

    /// Register a task built by `factory` with an explicit dependency list
    pub fn register_factory<F>(
        &mut self,
        name: &str,
        dependencies: &[&str],
        options: TaskOptions,
        factory: F,
    ) -> SchedulerResult<()>
    where
        F: Fn() -> Box<dyn Task> + Send + Sync + 'static,
    {
        if self.index.contains_key(name) {
            return Err(SchedulerError::AlreadyRegistered {
                name: name.to_string(),
            });
        }
        if self.injected {
            return Err(SchedulerError::lifecycle(format!(
                "cannot register task '{}' after injection",
                name
            )));
        }

        let mut deps: Vec<String> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deps.iter().any(|d| d == dep) {
                deps.push(dep.to_string());
            }
        }

        log::debug!(
            "Registered task '{}' (depends on {:?}, own context: {})",
            name,
            deps,
            options.own_context
        );
        self.index.insert(name.to_string(), self.descriptors.len());
        self.descriptors.push(TaskDescriptor {
            name: name.to_string(),
            dependencies: deps,
            options,
            factory: Box::new(factory),
            instance: None,
            supplied_context: None,
        });
        self.shared.set_state(name, TaskState::Registered);
        Ok(())
    }

    /// Build every task and inject its started component dependencies
    ///
    /// Unregistered dependencies of all tasks are reported together before any
    /// task is built. Tasks registered without their own context must supply
    /// one, and no two tasks may supply the same context.
    pub fn inject_tasks(&mut self, registry: &ComponentRegistry) -> SchedulerResult<()> {
        if self.injected {
            return Err(SchedulerError::lifecycle("tasks were already injected"));
        }

        let mut resolved = Vec::with_capacity(self.descriptors.len());
        let mut missing = Vec::new();
        let mut other = None;
        for descriptor in &self.descriptors {
            match registry.dependencies_for(&descriptor.name, &descriptor.dependencies) {
                Ok(dependencies) => resolved.push(dependencies),
                Err(ComponentError::NotRegistered { missing: names }) => missing.extend(names),
                Err(e) => {
                    other.get_or_insert(e);
                }
            }
        }
        if !missing.is_empty() {
            return Err(ComponentError::NotRegistered { missing }.into());
        }
        if let Some(e) = other {
            return Err(e.into());
        }

        for (descriptor, dependencies) in self.descriptors.iter_mut().zip(resolved) {
            let mut task = (descriptor.factory)();
            task.inject(&dependencies)?;

            if !descriptor.options.own_context {
                let context = task.context().ok_or_else(|| SchedulerError::MissingContext {
                    name: descriptor.name.clone(),
                })?;
                descriptor.supplied_context = Some(context);
            }
            descriptor.instance = Some(Arc::from(task));
            self.shared
                .set_state(&descriptor.name, TaskState::DependenciesInjected);
        }

        let mut owners: HashMap<u64, &str> = HashMap::new();
        for descriptor in &self.descriptors {
            if let Some(context) = &descriptor.supplied_context {
                if let Some(first) = owners.insert(context.id(), &descriptor.name) {
                    return Err(SchedulerError::SharedContext {
                        first: first.to_string(),
                        second: descriptor.name.clone(),
                        context: context.name().to_string(),
                    });
                }
            }
        }

        self.injected = true;
        log::debug!("Injected {} task(s)", self.descriptors.len());
        Ok(())
    }

    /// Start every task and block until all of their contexts have stopped
    ///
    /// Installs SIGTERM / SIGINT handling for the duration of the call and puts
    /// the previous dispositions back before returning.
    pub fn start_tasks(&mut self) -> SchedulerResult<()> {
        if !self.injected {
            return Err(SchedulerError::lifecycle(
                "inject_tasks must run before start_tasks",
            ));
        }
        if self.started {
            return Err(SchedulerError::lifecycle("tasks were already started"));
        }
        self.started = true;

        let handle = self.handle();
        let listener = match SignalListener::spawn(move |_signal| handle.stop_all()) {
            Ok(listener) => Some(listener),
            Err(e) => {
                log::warn!("Could not install signal handlers: {}", e);
                None
            }
        };

        let contexts = self.launch();
        if let Ok(contexts) = &contexts {
            if contexts.is_empty() {
                log::info!("No tasks to run");
            } else {
                log::info!("{} task(s) running", contexts.len());
            }
            for context in contexts {
                context.join(None);
            }
        }

        if let Some(listener) = listener {
            listener.stop();
        }
        contexts?;
        log::info!("All tasks stopped");
        Ok(())
    }

    fn launch(&self) -> SchedulerResult<Vec<ExecutionContext>> {
        let mut running = lock(&self.shared.running);
        if self.shared.shutdown.is_shutdown_requested() {
            log::info!("Shutdown requested before tasks started");
            return Ok(Vec::new());
        }

        for descriptor in &self.descriptors {
            let Some(task) = descriptor.instance.clone() else {
                continue;
            };

            let context = match &descriptor.supplied_context {
                Some(context) => context.clone(),
                None => match ExecutionContext::start(format!("task-{}", descriptor.name)) {
                    Ok(context) => context,
                    Err(e) => {
                        drop(running);
                        self.abort_launch(&descriptor.name, &e.to_string());
                        return Err(e.into());
                    }
                },
            };

            self.shared.set_state(&descriptor.name, TaskState::Running);
            let main = main_routine(
                Arc::clone(&self.shared),
                descriptor.name.clone(),
                Arc::clone(&task),
            );
            if let Err(e) = context.submit(main) {
                if descriptor.supplied_context.is_none() {
                    context.stop();
                }
                drop(running);
                self.abort_launch(&descriptor.name, &e.to_string());
                return Err(e.into());
            }

            log::info!(
                "Task '{}' running on context '{}'",
                descriptor.name,
                context.name()
            );
            running.push(RunningTask {
                name: descriptor.name.clone(),
                task,
                context,
            });
        }

        Ok(running.iter().map(|t| t.context.clone()).collect())
    }

    fn abort_launch(&self, name: &str, cause: &str) {
        log::error!("Task '{}' could not be started: {}", name, cause);
        self.shared.set_state(name, TaskState::Stopped);
        self.shared.stop_all();
    }

    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.shared.state(name)
    }

    /// Registered task names in registration order
    pub fn names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }

    pub fn dependencies_of(&self, name: &str) -> Option<&[String]> {
        self.index
            .get(name)
            .map(|&i| self.descriptors[i].dependencies.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field(
                "tasks",
                &self
                    .descriptors
                    .iter()
                    .map(|d| (&d.name, self.shared.state(&d.name)))
                    .collect::<Vec<_>>(),
            )
            .field("stop_timeout", &self.shared.stop_timeout)
            .finish()
    }
}

async fn main_routine(shared: Arc<Shared>, name: String, task: Arc<dyn Task>) {
    match AssertUnwindSafe(task.run()).catch_unwind().await {
        Ok(Ok(())) => log::info!("Task '{}' main routine finished", name),
        Ok(Err(e)) => {
            log::error!("Task '{}' failed: {}", name, e);
            shared.mark_failed(&name);
        }
        Err(payload) => {
            log::error!(
                "Task '{}' panicked: {}",
                name,
                panic_message(payload.as_ref())
            );
            shared.mark_failed(&name);
        }
    }
}
