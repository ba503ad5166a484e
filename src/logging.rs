//! Logging setup
//!
//! Console output plus, when a directory is configured, JSON lines through a
//! daily rolling file. `RUST_LOG` overrides the configured level.

use once_cell::sync::OnceCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time;
use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Result, WaitError};

static INIT: OnceCell<()> = OnceCell::new();
const LOG_ROTATION_INTERVAL: Duration = Duration::from_secs(86400);
const LOG_PREFIX: &str = "quorum-wait";

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(config: &LoggingConfig) -> Result<()> {
    INIT.get_or_try_init(|| install(config)).map(|_| ())
}

fn install(config: &LoggingConfig) -> Result<()> {
    let console = fmt::Layer::new()
        .with_target(true)
        .with_ansi(true)
        .with_filter(filter(&config.level));

    let file = match &config.directory {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::RollingFileAppender::builder()
                .rotation(tracing_appender::rolling::Rotation::DAILY)
                .filename_prefix(LOG_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| WaitError::config(format!("Failed to create log file appender: {}", e)))?;
            Some(
                fmt::Layer::new()
                    .json()
                    .with_writer(appender)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_target(true)
                    .with_ansi(false)
                    .with_filter(filter(&config.level)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| WaitError::config(format!("Failed to set tracing subscriber: {}", e)))?;

    if let Some(dir) = &config.directory {
        cleanup_old_logs(dir, config.files_to_keep);
        spawn_rotation(dir.clone(), config.files_to_keep);
    }
    Ok(())
}

/// Prune periodically when running inside a tokio runtime.
fn spawn_rotation(log_dir: PathBuf, keep: usize) {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move {
            let mut interval = time::interval(LOG_ROTATION_INTERVAL);
            loop {
                interval.tick().await;
                cleanup_old_logs(&log_dir, keep);
            }
        });
    }
}

/// Delete all but the `keep` most recently modified `.log` files.
pub fn cleanup_old_logs(log_dir: &Path, keep: usize) {
    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    let mut log_files: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().map(|ext| ext == "log").unwrap_or(false))
        .collect();

    // Newest first
    log_files.sort_by_key(|entry| {
        std::cmp::Reverse(
            entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        )
    });

    for old_file in log_files.iter().skip(keep) {
        debug!(path = ?old_file.path(), "removing old log file");
        let _ = fs::remove_file(old_file.path());
    }
}
