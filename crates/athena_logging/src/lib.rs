//! Shared logging setup for the Athena binary.
//!
//! Two sinks: human-readable stderr and a daily-rolling plain-text file under
//! `$ATHENA_HOME/logs`. Share-protocol noise (expected access-denied and
//! timeout failures) is logged at `debug`, so it only reaches the file when
//! the filter asks for it.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "athena=info,athena_db=info";
const VERBOSE_LOG_FILTER: &str = "athena=debug,athena_db=debug";

/// Logging configuration for Athena binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
    /// Override for the log directory (defaults to [`logs_dir`])
    pub log_dir: Option<&'a Path>,
}

/// Initialize tracing with a rolling file writer and stderr output.
///
/// The returned guard flushes the file writer on drop; hold it for the
/// lifetime of the process.
pub fn init_logging(config: LogConfig<'_>) -> Result<WorkerGuard> {
    let log_dir = match config.log_dir {
        Some(dir) => dir.to_path_buf(),
        None => logs_dir(),
    };
    ensure_dir(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, log_file_name(config.app_name));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter = env_filter(config.verbose);
    let console_filter = env_filter(config.verbose);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn env_filter(verbose: bool) -> EnvFilter {
    if verbose {
        return EnvFilter::new(VERBOSE_LOG_FILTER);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Get the Athena home directory: `$ATHENA_HOME` or `~/.athena`
pub fn athena_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("ATHENA_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".athena")
}

/// Get the logs directory: `<athena home>/logs`
pub fn logs_dir() -> PathBuf {
    athena_home().join("logs")
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))
}

fn log_file_name(app_name: &str) -> String {
    let base: String = app_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    format!("{base}.log")
}
