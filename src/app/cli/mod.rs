//! Command-line arguments and the configuration file they point at

pub mod args;
pub mod config;

pub use args::Args;
pub use config::{Config, ConfigError};
