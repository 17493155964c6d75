//! Global `tracing` subscriber installation driven by [`LoggerConfig`].

use cargolib_schema::LoggerConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Overrides the configured level when set, using `EnvFilter` directive syntax.
pub const LOG_ENV_VAR: &str = "CARGOLIB_LOG";

const DEFAULT_LOG_FILE_PREFIX: &str = "cargolib.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file appender: {0}")]
    Appender(#[from] InitError),
}

/// Directory and file-name prefix for the rotating log file.
fn file_target(config: &LoggerConfig) -> (PathBuf, String) {
    let directory = config
        .rotate_directory
        .clone()
        .or_else(|| {
            config
                .file_path
                .as_deref()
                .and_then(Path::parent)
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
        .unwrap_or_else(|| PathBuf::from("."));
    let prefix = config
        .file_path
        .as_deref()
        .and_then(Path::file_name)
        .map_or_else(
            || DEFAULT_LOG_FILE_PREFIX.to_owned(),
            |name| name.to_string_lossy().into_owned(),
        );
    (directory, prefix)
}

/// Install the process-wide subscriber.
///
/// Returns `Ok(true)` when this call installed it and `Ok(false)` when
/// logging is disabled or another subscriber was already set.
pub fn init_subscriber(config: &LoggerConfig) -> Result<bool, LoggingError> {
    if !config.use_logger {
        return Ok(false);
    }

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| {
        EnvFilter::default().add_directive(LevelFilter::from_level(config.level).into())
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.use_ansi)
        .with_target(false);

    let file_layer = if config.file_enabled {
        let (directory, prefix) = file_target(config);
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::HOURLY)
            .filename_prefix(prefix)
            .build(&directory)?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(appender)
                .with_ansi(false),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        debug!(
            "logging initialized at {} (oslog category {:?}, subsystem {:?})",
            config.level, config.oslog_category, config.oslog_subsystem
        );
    } else {
        debug!("a global subscriber is already installed, keeping it");
    }
    Ok(installed)
}
