//! TOML configuration file loading
//!
//! The file is looked up at `--config` when given (it must then exist) or at
//! `<config_dir>/Jukebox/jukebox.toml`. Missing sections and keys take their
//! defaults; unknown keys are rejected.

use super::args::Args;
use crate::core::error_handling::ContextualError;
use crate::core::logging::LogFormat;
use crate::services::ServiceSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("The specified configuration file does not exist: {}", .path.display())]
    Missing { path: PathBuf },

    #[error("Error reading configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Error parsing configuration file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        true
    }

    fn user_message(&self) -> Option<String> {
        Some(self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub file: Option<PathBuf>,
    /// `None` picks color when stderr is a terminal
    pub color: Option<bool>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
            file: None,
            color: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueueConfig {
    pub workers: usize,
    pub join_timeout_ms: u64,
    pub monitor_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        let defaults = ServiceSettings::default();
        Self {
            workers: defaults.workers,
            join_timeout_ms: defaults.join_timeout.as_millis() as u64,
            monitor_interval_ms: defaults.monitor_interval.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub stop_timeout_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: crate::scheduler::DEFAULT_STOP_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub logging: LoggingConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
}

const MAX_WORKERS: usize = 256;

impl Config {
    /// `<config_dir>/Jukebox/jukebox.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Jukebox").join("jukebox.toml"))
    }

    /// Load the explicit file, else the default file if present, else defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) if !path.exists() => Err(ConfigError::Missing {
                path: path.to_path_buf(),
            }),
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Let command-line flags override file values
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(format) = &args.log_format {
            self.logging.format = format.clone();
        }
        if let Some(file) = &args.log_file {
            self.logging.file = Some(file.clone());
        }
        if let Some(color) = args.color_choice() {
            self.logging.color = Some(color);
        }
        if let Some(workers) = args.workers {
            self.queue.workers = workers;
        }

        // "none" and "-" switch file logging off, from either source
        if let Some(file) = &self.logging.file {
            let file = file.to_string_lossy();
            if file.eq_ignore_ascii_case("none") || file == "-" {
                self.logging.file = None;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = flexi_logger::LogSpecification::parse(&self.logging.level) {
            return Err(ConfigError::invalid("logging.level", e.to_string()));
        }
        if LogFormat::parse(&self.logging.format).is_none() {
            return Err(ConfigError::invalid(
                "logging.format",
                format!("'{}' is not one of text, ext, json", self.logging.format),
            ));
        }
        if self.queue.workers == 0 || self.queue.workers > MAX_WORKERS {
            return Err(ConfigError::invalid(
                "queue.workers",
                format!("must be between 1 and {}", MAX_WORKERS),
            ));
        }
        for (key, value) in [
            ("queue.join_timeout_ms", self.queue.join_timeout_ms),
            ("queue.monitor_interval_ms", self.queue.monitor_interval_ms),
            ("scheduler.stop_timeout_ms", self.scheduler.stop_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(key, "must be greater than zero"));
            }
        }
        Ok(())
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            workers: self.queue.workers,
            join_timeout: Duration::from_millis(self.queue.join_timeout_ms),
            monitor_interval: Duration::from_millis(self.queue.monitor_interval_ms),
        }
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.scheduler.stop_timeout_ms)
    }

    /// Explicit color setting, or whether stderr is a terminal
    pub fn use_color(&self) -> bool {
        use std::io::IsTerminal;
        self.logging
            .color
            .unwrap_or_else(|| std::io::stderr().is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.service_settings(), ServiceSettings::default());
        assert_eq!(config.stop_timeout(), crate::scheduler::DEFAULT_STOP_TIMEOUT);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
[logging]
level = "debug"

[queue]
workers = 2
"#,
        );
        let config = Config::load(Some(file.path())).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.queue, QueueConfig { workers: 2, ..QueueConfig::default() });
        assert_eq!(config.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn test_full_file() {
        let file = write_config(
            r#"
[logging]
level = "warn,jukebox::queue=debug"
format = "json"
file = "/tmp/jukebox.log"
color = false

[queue]
workers = 8
join_timeout_ms = 250
monitor_interval_ms = 1000

[scheduler]
stop_timeout_ms = 1500
"#,
        );
        let config = Config::load(Some(file.path())).unwrap();
        assert!(config.validate().is_ok());
        assert!(!config.use_color());

        let settings = config.service_settings();
        assert_eq!(settings.workers, 8);
        assert_eq!(settings.join_timeout, Duration::from_millis(250));
        assert_eq!(settings.monitor_interval, Duration::from_secs(1));
        assert_eq!(config.stop_timeout(), Duration::from_millis(1500));
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/jukebox.log")));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        match Config::load(Some(&path)) {
            Err(ConfigError::Missing { path: reported }) => assert_eq!(reported, path),
            other => panic!("Expected Missing, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_key_is_named() {
        let file = write_config("[queue]\nworkerz = 3\n");
        let err = Config::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("workerz"));
    }

    #[test]
    fn test_wrong_type_is_a_parse_error() {
        let file = write_config("[scheduler]\nstop_timeout_ms = \"soon\"\n");
        assert!(matches!(
            Config::load(Some(file.path())),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_validation_names_the_key() {
        let mut config = Config::default();
        config.queue.workers = 0;
        match config.validate() {
            Err(ConfigError::Invalid { key, .. }) => assert_eq!(key, "queue.workers"),
            other => panic!("Expected Invalid, got {:?}", other),
        }

        let mut config = Config::default();
        config.scheduler.stop_timeout_ms = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for 'scheduler.stop_timeout_ms': must be greater than zero"
        );
        assert!(err.is_user_actionable());

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key, .. }) if key == "logging.format"
        ));
    }

    #[test]
    fn test_args_override_file_values() {
        let mut config = Config::default();
        config.logging.color = Some(true);
        config.logging.file = Some(PathBuf::from("/tmp/from-file.log"));

        let args = Args::try_parse_from([
            "jukebox",
            "--log-level",
            "trace",
            "--no-color",
            "--workers",
            "3",
            "--log-file",
            "none",
        ])
        .unwrap();
        config.apply_args(&args);

        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.color, Some(false));
        assert_eq!(config.queue.workers, 3);
        assert_eq!(config.logging.file, None);
    }

    #[test]
    fn test_unset_args_leave_config_alone() {
        let mut config = Config::default();
        config.queue.workers = 6;
        config.apply_args(&Args::default());
        assert_eq!(config.queue.workers, 6);
        assert_eq!(config.logging, LoggingConfig::default());
    }
}
