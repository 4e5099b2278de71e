//! File and terminal logging for an acquisition run.

use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Global root logger.
static LOGGING_GUARDS: OnceLock<LoggingGuards> = OnceLock::new();

/// Logger thread handles, which must be kept alive for as long as the logging
/// targets will be used. Flushed automatically when dropped.
pub struct LoggingGuards {
    _stdout: WorkerGuard,
    _file: WorkerGuard,
}

/// Set up terminal logging plus a per-run log file under `op_dir/logs/`.
///
/// Log level comes from `RUST_LOG`, defaulting to `info`. Initialization is
/// process-global; a second call returns the existing guards without
/// repointing the file writer.
pub fn init_logging(op_dir: &Path, op_name: &str) -> Result<(PathBuf, &'static LoggingGuards)> {
    let log_dir = op_dir.join("logs");
    fs::create_dir_all(&log_dir)
        .map_err(|e| Error::Logging(format!("failed to create log directory: {e}")))?;
    let log_path = log_dir.join(format!("{op_name}.log"));

    if let Some(guards) = LOGGING_GUARDS.get() {
        return Ok((log_path, guards));
    }

    let logfile = OpenOptions::new()
        .create(true)
        .truncate(false)
        .append(true)
        .open(&log_path)
        .map_err(|e| Error::Logging(format!("failed to create log file: {e}")))?;

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let (file_writer, file_guard) = tracing_appender::non_blocking(logfile);

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::Logging(format!("failed to set up logging env filter: {e}")))?;

    let stdout_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(stdout_writer)
        .with_target(false);

    let file_layer = fmt::layer()
        .with_timer(fmt::time::ChronoUtc::rfc_3339())
        .with_writer(file_writer)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| Error::Logging(format!("failed to initialize logging: {e}")))?;

    let guards = LOGGING_GUARDS.get_or_init(|| LoggingGuards {
        _stdout: stdout_guard,
        _file: file_guard,
    });

    Ok((log_path, guards))
}
