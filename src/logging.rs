use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILENAME: &str = "sidechat.log";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Filter directive: this crate at the chosen level, dependencies at warn.
    pub fn directive(self) -> String {
        format!("warn,sidechat={}", self.as_str())
    }
}

/// `RUST_LOG` when set, otherwise the configured level.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()))
}

fn file_subscriber(file: File, filter: EnvFilter) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .finish()
}

/// Route tracing output to `sidechat.log` in `log_dir`, away from the terminal.
pub fn init_logging(log_dir: &Path, level: LogLevel) -> Result<()> {
    let log_path = log_dir.join(LOG_FILENAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    tracing::subscriber::set_global_default(file_subscriber(file, env_filter(level)))
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))
}
