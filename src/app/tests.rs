//! Bootstrap tests: full runs of the built-in services with collaborators

use super::cli::{Args, Config, ConfigError};
use super::startup::{load_config, run_with, StartupError};
use crate::components::{Component, ComponentError, ComponentResult, Dependencies};
use crate::core::error_handling::ContextualError;
use crate::queue::{Work, WorkQueue};
use crate::scheduler::{SchedulerError, SchedulerHandle, Task, TaskOptions, TaskResult};
use crate::services::{WorkQueueService, WORK_QUEUE};
use clap::Parser;
use serial_test::serial;
use std::io::Write;
use std::sync::{Arc, Mutex};

type Events = Arc<Mutex<Vec<String>>>;

fn events(log: &Events) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn quick_config() -> Config {
    let mut config = Config::default();
    config.queue.workers = 2;
    config.queue.join_timeout_ms = 2000;
    config.queue.monitor_interval_ms = 10;
    config.scheduler.stop_timeout_ms = 2000;
    config
}

/// Component that queues an announcement on the shared work queue when started
struct Announcer {
    log: Events,
    queue: Option<Arc<WorkQueue>>,
}

#[async_trait::async_trait]
impl Component for Announcer {
    fn inject(&mut self, deps: &Dependencies) -> ComponentResult<()> {
        self.queue = Some(deps.get::<WorkQueueService>(WORK_QUEUE)?.queue());
        Ok(())
    }

    async fn start(&self) -> ComponentResult<()> {
        let log = Arc::clone(&self.log);
        if let Some(queue) = &self.queue {
            queue
                .add(Work::blocking("announce", move || {
                    let mut events = log.lock().map_err(|e| e.to_string())?;
                    events.push("announced".to_string());
                    Ok::<(), String>(())
                }))
                .map_err(|e| ComponentError::StartFailed {
                    name: "announcer".to_string(),
                    cause: e.to_string(),
                })?;
        }
        Ok(())
    }

    async fn stop(&self) -> ComponentResult<()> {
        self.log.lock().unwrap().push("stop:announcer".to_string());
        Ok(())
    }
}

/// Task that requests shutdown as soon as it runs
struct OneShot {
    log: Events,
    handle: SchedulerHandle,
}

#[async_trait::async_trait]
impl Task for OneShot {
    async fn run(&self) -> TaskResult {
        self.log.lock().unwrap().push("run:one-shot".to_string());
        self.handle.stop_all();
        Ok(())
    }

    async fn stop(&self) -> TaskResult {
        self.log.lock().unwrap().push("stop:one-shot".to_string());
        Ok(())
    }
}

fn register_announcer(
    registry: &mut crate::components::ComponentRegistry,
    log: &Events,
) -> ComponentResult<()> {
    let log = Arc::clone(log);
    registry.register_factory("announcer", &[WORK_QUEUE], move || {
        Box::new(Announcer {
            log: Arc::clone(&log),
            queue: None,
        })
    })
}

#[test]
#[serial]
fn test_run_hosts_collaborators_until_shutdown() {
    let log: Events = Arc::default();
    let config = quick_config();

    let outcome = run_with(&config, |registry, scheduler| {
        register_announcer(registry, &log)?;
        let handle = scheduler.handle();
        let task_log = Arc::clone(&log);
        scheduler.register_factory("one-shot", &["announcer"], TaskOptions::default(), move || {
            Box::new(OneShot {
                log: Arc::clone(&task_log),
                handle: handle.clone(),
            })
        })?;
        Ok(())
    });

    assert!(outcome.is_ok(), "run failed: {:?}", outcome);
    let seen = events(&log);
    assert!(seen.contains(&"announced".to_string()), "{:?}", seen);
    assert!(seen.contains(&"run:one-shot".to_string()));
    assert!(seen.contains(&"stop:one-shot".to_string()));
    let position = |event: &str| seen.iter().position(|e| e == event);
    assert!(position("stop:one-shot") < position("stop:announcer"));
}

#[test]
#[serial]
fn test_duplicate_service_name_refuses_start() {
    let log: Events = Arc::default();
    let outcome = run_with(&quick_config(), |registry, _| {
        let log = Arc::clone(&log);
        registry.register_factory(WORK_QUEUE, &[], move || {
            Box::new(Announcer {
                log: Arc::clone(&log),
                queue: None,
            })
        })?;
        Ok(())
    });

    match outcome {
        Err(StartupError::Component(ComponentError::AlreadyRegistered { name })) => {
            assert_eq!(name, WORK_QUEUE)
        }
        other => panic!("Expected AlreadyRegistered, got {:?}", other),
    }
}

#[test]
#[serial]
fn test_cycle_is_reported_before_anything_starts() {
    let log: Events = Arc::default();
    let outcome = run_with(&quick_config(), |registry, _| {
        for (name, dep) in [("left", "right"), ("right", "left")] {
            let log = Arc::clone(&log);
            registry.register_factory(name, &[dep], move || {
                Box::new(Announcer {
                    log: Arc::clone(&log),
                    queue: None,
                })
            })?;
        }
        Ok(())
    });

    let err = outcome.unwrap_err();
    assert!(matches!(
        &err,
        StartupError::Component(ComponentError::CircularDependency { names })
            if names == &["left".to_string(), "right".to_string()]
    ));
    assert!(err.is_user_actionable());
    assert!(events(&log).is_empty());
}

#[test]
#[serial]
fn test_task_injection_failure_still_stops_components() {
    let log: Events = Arc::default();
    let outcome = run_with(&quick_config(), |registry, scheduler| {
        register_announcer(registry, &log)?;
        let handle = scheduler.handle();
        let task_log = Arc::clone(&log);
        scheduler.register_factory("orphan", &["playlist"], TaskOptions::default(), move || {
            Box::new(OneShot {
                log: Arc::clone(&task_log),
                handle: handle.clone(),
            })
        })?;
        Ok(())
    });

    match outcome {
        Err(StartupError::Scheduler(SchedulerError::Component(e))) => {
            assert_eq!(e, ComponentError::missing_dependency("playlist", "orphan"))
        }
        other => panic!("Expected a missing dependency, got {:?}", other),
    }
    assert!(events(&log).contains(&"stop:announcer".to_string()));
}

#[test]
fn test_load_config_merges_file_and_flags() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[queue]\nworkers = 5\n\n[logging]\nformat = \"ext\"").unwrap();
    let path = file.path().to_string_lossy().into_owned();

    let args = Args::try_parse_from(["jukebox", "--config", &path, "--workers", "7"]).unwrap();
    let config = load_config(&args).unwrap();
    assert_eq!(config.queue.workers, 7);
    assert_eq!(config.logging.format, "ext");

    let args = Args::try_parse_from(["jukebox", "--config", &path, "--workers", "0"]).unwrap();
    assert!(matches!(
        load_config(&args),
        Err(ConfigError::Invalid { key, .. }) if key == "queue.workers"
    ));
}

#[test]
fn test_runtime_errors_are_not_user_actionable() {
    let err = StartupError::Runtime(std::io::Error::other("no threads"));
    assert!(!err.is_user_actionable());
    assert_eq!(err.user_message(), None);
    assert_eq!(err.operation(), "Building the async runtime");
    assert!(err.to_string().contains("no threads"));
}
