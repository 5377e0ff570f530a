//! # Logging
//!
//! Installs the global `tracing` subscriber:
//! - Console output, always
//! - A plain-text log file when `log_dir` is configured, written through a
//!   non-blocking appender
//! - Level filtering from `RUST_LOG`, defaulting to `info`

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Keeps the file writer alive. Dropping it flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    path: PathBuf,
}

impl LoggingGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Full path of the log file, or `None` for console-only logging.
pub fn log_file_path(config: &LoggingConfig) -> Option<PathBuf> {
    if config.log_dir.is_empty() {
        None
    } else {
        Some(Path::new(&config.log_dir).join(&config.log_file))
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global subscriber.
///
/// # Returns
///
/// A guard when file logging is enabled; keep it alive for the whole process.
///
/// # Errors
///
/// Returns error if the log directory cannot be created.
pub fn init_logging(config: &LoggingConfig) -> io::Result<Option<LoggingGuard>> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(true);

    let Some(path) = log_file_path(config) else {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(console_layer)
            .init();
        return Ok(None);
    };

    fs::create_dir_all(&config.log_dir)?;

    // Appends across restarts
    let file_appender = tracing_appender::rolling::never(&config.log_dir, &config.log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(Some(LoggingGuard {
        _file_guard: file_guard,
        path,
    }))
}
