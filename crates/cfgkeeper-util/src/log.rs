//! Logging setup using tracing.
//!
//! Every run logs to stdout and, unless disabled, appends to a log file
//! rotated by month (`backup_YYYY-MM.log`) inside the configured log directory.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level, overridden by `RUST_LOG` when set.
    pub level: LogLevel,
    /// Whether to print logs to stdout.
    pub console: bool,
    /// Directory for the monthly log file. `None` disables file logging.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            console: true,
            dir: Some(PathBuf::from("logs")),
        }
    }
}

/// Path of the log file for the month containing `now`.
pub fn monthly_log_file(dir: &Path, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("backup_{}.log", now.format("%Y-%m")))
}

/// Initialize logging with the given configuration.
///
/// Call once at startup. Returns the log file path when file logging is on.
pub fn init(config: &LogConfig) -> io::Result<Option<PathBuf>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let (file_layer, log_file) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = monthly_log_file(dir, Local::now());
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    let console_layer = config
        .console
        .then(|| {
            fmt::layer()
                .with_target(true)
                .with_ansi(io::stdout().is_terminal())
                .with_writer(io::stdout)
        });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    Ok(log_file)
}
