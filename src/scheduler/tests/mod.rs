//! Scheduler test suites and the recording task they share


use crate::context::ExecutionContext;
use crate::scheduler::{SchedulerHandle, Task, TaskResult, TaskState};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string()
}

/// How a [`Recorder`] misbehaves
#[derive(Default, Clone)]
pub struct Behaviour {
    pub fail_run: bool,
    pub hang_on_stop: bool,
    pub fail_stop: bool,
    pub panic_on_stop: bool,
    pub context: Option<ExecutionContext>,
    /// Ask the scheduler to stop from inside the main routine
    pub stop_from_run: Option<SchedulerHandle>,
}

/// Task that logs "run:<name>@<thread>" and "stop:<name>@<thread>"
pub struct Recorder {
    name: String,
    log: EventLog,
    behaviour: Behaviour,
    stopped: Notify,
}

impl Recorder {
    pub fn new(name: &str, log: &EventLog, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
            behaviour,
            stopped: Notify::new(),
        }
    }

    fn record(&self, event: &str) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}@{}", event, self.name, thread_name()));
    }
}

#[async_trait::async_trait]
impl Task for Recorder {
    async fn run(&self) -> TaskResult {
        self.record("run");
        if self.behaviour.fail_run {
            return Err("main routine failed".into());
        }
        if let Some(handle) = &self.behaviour.stop_from_run {
            handle.stop_all();
        }
        self.stopped.notified().await;
        self.record("exit");
        Ok(())
    }

    async fn stop(&self) -> TaskResult {
        self.record("stop");
        if self.behaviour.hang_on_stop {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        self.stopped.notify_one();
        if self.behaviour.panic_on_stop {
            panic!("stop routine of '{}' exploded", self.name);
        }
        if self.behaviour.fail_stop {
            return Err("stop routine failed".into());
        }
        Ok(())
    }

    fn context(&self) -> Option<ExecutionContext> {
        self.behaviour.context.clone()
    }
}

/// Poll `handle` until `name` reaches `state`
pub fn wait_for_state(handle: &SchedulerHandle, name: &str, state: TaskState) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if handle.state(name) == Some(state) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

/// Poll until `log` holds an event starting with `prefix`
pub fn wait_for_event(log: &EventLog, prefix: &str) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if events(log).iter().any(|e| e.starts_with(prefix)) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
