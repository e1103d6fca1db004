//! Tracing setup: compact stdout output plus a non-blocking file layer.
//!
//! The file path comes from [`Config::log_file`] (`PDF_QUERY_LOG_FILE`, default
//! `logs/pdf-query.log`). When the file cannot be prepared the service keeps running with stdout
//! only.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Config;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Reasons the file layer could not be installed.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// Path has no usable file name component.
    #[error("Log path {0} does not name a file")]
    InvalidPath(PathBuf),
    /// Parent directory could not be created.
    #[error("Failed to create log directory {path}: {source}")]
    CreateDir {
        /// Directory we attempted to create.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Appender could not open the log file.
    #[error("Failed to open log file: {0}")]
    Appender(#[from] InitError),
}

/// Install the global subscriber.
///
/// `RUST_LOG` controls filtering and defaults to `info`. The non-blocking writer guard is kept
/// alive for the rest of the process.
pub fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let mut file_error = None;
    let file_layer = match open_log_writer(&config.log_file) {
        Ok((writer, guard)) => {
            let _ = LOG_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact(),
            )
        }
        Err(error) => {
            file_error = Some(error);
            None
        }
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    match file_error {
        Some(error) => tracing::warn!(%error, "File logging disabled"),
        None => tracing::debug!(path = %config.log_file.display(), "File logging enabled"),
    }
}

/// Open `path` for appending through a non-blocking writer, creating its directory first.
fn open_log_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    let (directory, file_name) = split_log_path(path)?;
    std::fs::create_dir_all(&directory).map_err(|source| LoggingError::CreateDir {
        path: directory.clone(),
        source,
    })?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(&directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String), LoggingError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| LoggingError::InvalidPath(path.to_path_buf()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, file_name.to_string()))
}
