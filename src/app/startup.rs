//! Process bootstrap
//!
//! ```text
//! args ─► config ─► logging ─► components: create_all ─► resolve_order ─► inject_and_start
//!                                                                                │
//!        wait_for_end ◄── components: stop_all ◄── tasks: inject ─► start (blocks until signal)
//! ```
//!
//! Any registration or ordering error ends the process with a non-zero status;
//! there is no partial start.

use super::cli::{Args, Config, ConfigError};
use crate::components::{ComponentError, ComponentRegistry};
use crate::core::error_handling::{log_error_with_context, ContextualError};
use crate::core::logging::init_logging;
use crate::core::shutdown::reset_sigpipe;
use crate::core::version;
use crate::queue::ShutdownRegistry;
use crate::scheduler::{SchedulerError, TaskScheduler};
use crate::services::{register_services, register_tasks};
use clap::Parser;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Component(#[from] ComponentError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Failed to build the async runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl StartupError {
    /// Phase reported when the error is not user-actionable
    pub fn operation(&self) -> &'static str {
        match self {
            StartupError::Config(_) => "Loading configuration",
            StartupError::Component(_) => "Starting components",
            StartupError::Scheduler(_) => "Running tasks",
            StartupError::Runtime(_) => "Building the async runtime",
        }
    }
}

impl ContextualError for StartupError {
    fn is_user_actionable(&self) -> bool {
        match self {
            StartupError::Config(e) => e.is_user_actionable(),
            StartupError::Component(e) => e.is_user_actionable(),
            StartupError::Scheduler(e) => e.is_user_actionable(),
            StartupError::Runtime(_) => false,
        }
    }

    fn user_message(&self) -> Option<String> {
        match self {
            StartupError::Config(e) => e.user_message(),
            StartupError::Component(e) => e.user_message(),
            StartupError::Scheduler(e) => e.user_message(),
            StartupError::Runtime(_) => None,
        }
    }
}

/// Binary entry point
pub fn startup() {
    reset_sigpipe();
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let log_file = config
        .logging
        .file
        .as_ref()
        .map(|path| path.to_string_lossy().into_owned());
    if let Err(e) = init_logging(
        Some(config.logging.level.as_str()),
        Some(config.logging.format.as_str()),
        log_file.as_deref(),
        config.use_color(),
    ) {
        eprintln!("Error: failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    log::info!("jukebox {} starting", version::long_version());
    log::debug!("Effective configuration: {:?}", config);

    if let Err(e) = run(&config) {
        log_error_with_context(&e, e.operation());
        std::process::exit(1);
    }
}

/// Load the configuration file and apply command-line overrides
pub fn load_config(args: &Args) -> Result<Config, ConfigError> {
    let mut config = Config::load(args.config.as_deref())?;
    config.apply_args(args);
    config.validate()?;
    Ok(config)
}

/// Host the built-in services until a termination signal arrives
pub fn run(config: &Config) -> Result<(), StartupError> {
    run_with(config, |_, _| Ok(()))
}

/// As [`run`], letting collaborators register components and tasks first
///
/// `register` runs before any component is created. Whatever happens after
/// components start, started components are stopped and registered queues
/// are drained before this returns.
pub fn run_with<F>(config: &Config, register: F) -> Result<(), StartupError>
where
    F: FnOnce(&mut ComponentRegistry, &mut TaskScheduler) -> Result<(), StartupError>,
{
    let settings = config.service_settings();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("jukebox-runtime")
        .build()
        .map_err(StartupError::Runtime)?;

    let shutdown = ShutdownRegistry::new();
    let mut registry = ComponentRegistry::new();
    let mut scheduler = TaskScheduler::with_stop_timeout(config.stop_timeout());

    register_services(&mut registry, &settings, &shutdown)?;
    register_tasks(&mut scheduler, &settings)?;
    register(&mut registry, &mut scheduler)?;

    registry.create_all()?;
    registry.resolve_order()?;

    let outcome = runtime
        .block_on(registry.inject_and_start())
        .map_err(StartupError::from)
        .and_then(|()| {
            scheduler.inject_tasks(&registry)?;
            scheduler.start_tasks()?;
            Ok(())
        });

    log::info!("Stopping components");
    let failures = runtime.block_on(registry.stop_all());
    if !failures.is_empty() {
        log::warn!("{} component(s) failed to stop cleanly", failures.len());
    }
    if !shutdown.wait_for_end(settings.join_timeout) {
        log::warn!(
            "Some queues did not drain within {:?}",
            settings.join_timeout
        );
    }

    outcome?;
    log::info!("Shutdown complete");
    Ok(())
}
