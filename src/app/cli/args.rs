//! Command-line arguments
//!
//! Every flag is optional; anything left unset falls back to the configuration
//! file and then to built-in defaults.

use crate::core::version;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "jukebox")]
#[command(about = "Music bot runtime host")]
#[command(version = version::version(), long_version = version::long_version())]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level or flexi_logger spec (e.g. "info,jukebox::queue=debug")
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Force colored log output
    #[arg(long = "color", overrides_with = "no_color")]
    pub color: bool,

    /// Disable colored log output
    #[arg(long = "no-color", overrides_with = "color")]
    pub no_color: bool,

    /// Worker threads for the shared work queue
    #[arg(short = 'w', long = "workers", value_name = "COUNT")]
    pub workers: Option<usize>,
}

impl Args {
    /// Color override from the command line; `None` leaves it to the config
    pub fn color_choice(&self) -> Option<bool> {
        match (self.color, self.no_color) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults_leave_everything_unset() {
        let args = Args::try_parse_from(["jukebox"]).unwrap();
        assert_eq!(args.config, None);
        assert_eq!(args.log_level, None);
        assert_eq!(args.workers, None);
        assert_eq!(args.color_choice(), None);
    }

    #[test]
    fn test_short_and_long_flags() {
        let args = Args::try_parse_from([
            "jukebox",
            "-c",
            "/etc/jukebox.toml",
            "--log-level",
            "debug",
            "-o",
            "json",
            "-f",
            "/var/log/jukebox.log",
            "-w",
            "8",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("/etc/jukebox.toml")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert_eq!(args.log_format.as_deref(), Some("json"));
        assert_eq!(args.log_file, Some(PathBuf::from("/var/log/jukebox.log")));
        assert_eq!(args.workers, Some(8));
    }

    #[test]
    fn test_last_color_flag_wins() {
        let args = Args::try_parse_from(["jukebox", "--color", "--no-color"]).unwrap();
        assert_eq!(args.color_choice(), Some(false));

        let args = Args::try_parse_from(["jukebox", "--no-color", "--color"]).unwrap();
        assert_eq!(args.color_choice(), Some(true));
    }

    #[test]
    fn test_unknown_log_format_is_rejected() {
        assert!(Args::try_parse_from(["jukebox", "--log-format", "xml"]).is_err());
        assert!(Args::try_parse_from(["jukebox", "--workers", "many"]).is_err());
    }
}
