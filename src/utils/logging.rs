//! Logging initialization for TaskClaw.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact `timestamp LEVEL target: message fields` lines; use
//!   the [`log_component!`] macro to add a `component` field for filtering
//! - `json`: structured JSON lines for log aggregators
//!
//! `RUST_LOG` takes precedence over `logging.level`. When `logging.file` is
//! set, output is appended there instead of stderr.

use std::fs::{File, OpenOptions};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, TaskClawError};

/// Build the filter: `RUST_LOG` if set and valid, else `cfg.level`.
fn build_filter(cfg: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&cfg.level)
        .map_err(|e| TaskClawError::Config(format!("invalid log level '{}': {}", cfg.level, e)))
}

fn open_log_file(path: &str) -> Result<Arc<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(Arc::new(file))
}

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
///
/// # Errors
///
/// `Config` for an invalid level or if a subscriber is already installed,
/// `Io` if the log file cannot be opened.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = build_filter(cfg)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = match (cfg.format, cfg.file.as_deref()) {
        (LogFormat::Json, Some(path)) => builder
            .json()
            .with_writer(open_log_file(path)?)
            .try_init(),
        (LogFormat::Json, None) => builder.json().with_writer(std::io::stderr).try_init(),
        (LogFormat::Pretty, Some(path)) => builder
            .pretty()
            .with_ansi(false)
            .with_writer(open_log_file(path)?)
            .try_init(),
        (LogFormat::Pretty, None) => builder.pretty().with_writer(std::io::stderr).try_init(),
        (LogFormat::Component, Some(path)) => builder
            .compact()
            .with_ansi(false)
            .with_writer(open_log_file(path)?)
            .try_init(),
        (LogFormat::Component, None) => builder.compact().with_writer(std::io::stderr).try_init(),
    };

    installed.map_err(|e| TaskClawError::Config(format!("failed to install logger: {}", e)))
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`).
/// The `component` field makes it easy to grep logs by subsystem:
///
/// ```
/// # use taskclaw::log_component;
/// log_component!(info, "queue", "lane drained");
/// log_component!(warn, "agent", "context window nearly full", used = 27000u64, limit = 32768u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}
