//! Logging system configuration and initialization
//!
//! This module provides the logging setup with:
//! - File logging with startup rotation and bounded retention
//! - Configuration file based log level control
//! - Structured JSON logging (optional)
//! - Console and file output support

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use chrono::Utc;
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::infrastructure::config::ConfigManager;
// Re-export LoggingConfig from config module
pub use crate::infrastructure::config::LoggingConfig;

const LOG_FILE_NAME: &str = "stocksync.log";

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// UTC time formatter for log lines
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

/// Get the log directory under the application data directory
pub fn get_log_directory() -> PathBuf {
    ConfigManager::get_app_data_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| {
            std::env::current_dir()
                .unwrap_or_default()
                .join("logs")
        })
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    let config = LoggingConfig::default();
    init_logging_with_config(config)
}

/// Rotate the existing log file by renaming it with its modification timestamp
fn rotate_existing_log_file(log_dir: &PathBuf) -> Result<()> {
    let log_file_path = log_dir.join(LOG_FILE_NAME);

    if log_file_path.exists() {
        let metadata = std::fs::metadata(&log_file_path)
            .map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;

        let file_time = metadata
            .created()
            .or_else(|_| metadata.modified())
            .unwrap_or_else(|_| std::time::SystemTime::now());

        let datetime: chrono::DateTime<Utc> = file_time.into();
        let file_stem = LOG_FILE_NAME.trim_end_matches(".log");
        let timestamped_name = format!("{}.{}.log", file_stem, datetime.format("%Y%m%dT%H%M%S"));
        let timestamped_path = log_dir.join(&timestamped_name);

        std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
            anyhow!(
                "Failed to rotate log file {} to {}: {}",
                log_file_path.display(),
                timestamped_path.display(),
                e
            )
        })?;
    }

    Ok(())
}

/// Clean up rotated log files beyond the retention limit
fn cleanup_old_logs(log_dir: &PathBuf, config: &LoggingConfig) -> Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let mut log_files = Vec::new();

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() {
            if let Some(filename) = path.file_name().and_then(|n| n.to_str()) {
                if filename.ends_with(".log") {
                    if let Ok(metadata) = entry.metadata() {
                        if let Ok(modified) = metadata.modified() {
                            log_files.push((path, modified));
                        }
                    }
                }
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    if log_files.len() > config.max_files as usize {
        for (path, _) in log_files.iter().skip(config.max_files as usize) {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to remove old log file {:?}: {}", path, e);
            }
        }
    }

    Ok(())
}

/// Initialize logging with custom configuration
///
/// Verbose dependency output (sqlx query logs, HTTP client internals, runtime
/// scheduling) is suppressed unless the configured level is `trace`.
///
/// # Environment Variable Override
/// The filtering can be overridden with the RUST_LOG environment variable:
/// ```bash
/// # Show all SQL queries even on DEBUG level
/// RUST_LOG="debug,sqlx::query=debug" stocksync sync inventory
///
/// # Show only errors from all dependencies
/// RUST_LOG="info,sqlx=error,reqwest=error,tokio=error" stocksync sync inventory
/// ```
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    let log_dir = get_log_directory();

    if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        rotate_existing_log_file(&log_dir)?;
        cleanup_old_logs(&log_dir, &config)?;
    }

    // Set up environment filter; RUST_LOG wins over the config file
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut filter = EnvFilter::new(&config.level);

        if !config.level.to_lowercase().contains("trace") {
            filter = filter
                // SQLx query logs (prepared statements) - only show on TRACE
                .add_directive("sqlx::query=warn".parse().unwrap())
                .add_directive("sqlx::sqlite=warn".parse().unwrap())
                // HTTP client detailed logs - only show on TRACE
                .add_directive("reqwest=info".parse().unwrap())
                .add_directive("hyper=warn".parse().unwrap())
                .add_directive("h2=warn".parse().unwrap())
                // Tokio runtime details - only show on TRACE
                .add_directive("tokio=info".parse().unwrap())
                .add_directive("runtime=warn".parse().unwrap());

            for (module, level) in &config.module_filters {
                if let Ok(directive) = format!("{}={}", module, level).parse() {
                    filter = filter.add_directive(directive);
                }
            }
        }

        filter
    });

    let registry = Registry::default().with(env_filter);

    match (config.file_output, config.console_output) {
        (true, true) => {
            let file_appender = rolling::never(&log_dir, LOG_FILE_NAME);
            let (file_writer, file_guard) = non_blocking(file_appender);

            // Store the guard globally to prevent it from being dropped
            LOG_GUARDS.lock().unwrap().push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(true)
                    .with_ansi(false);
                let console_layer = fmt::Layer::new()
                    .with_writer(std::io::stdout)
                    .with_timer(UtcTimeFormatter)
                    .with_target(false);

                registry.with(file_layer).with(console_layer).init();
            } else {
                // File layer with minimal formatting (time + level + message only)
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false);
                let console_layer = fmt::Layer::new()
                    .with_writer(std::io::stdout)
                    .with_timer(UtcTimeFormatter)
                    .with_target(false);

                registry.with(file_layer).with(console_layer).init();
            }
        }
        (true, false) => {
            let file_appender = rolling::never(&log_dir, LOG_FILE_NAME);
            let (file_writer, file_guard) = non_blocking(file_appender);

            LOG_GUARDS.lock().unwrap().push(file_guard);

            if config.json_format {
                let file_layer = fmt::Layer::new()
                    .json()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(true)
                    .with_ansi(false);

                registry.with(file_layer).init();
            } else {
                let file_layer = fmt::Layer::new()
                    .with_writer(file_writer)
                    .with_timer(UtcTimeFormatter)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(false);

                registry.with(file_layer).init();
            }
        }
        (false, true) => {
            let console_layer = fmt::Layer::new()
                .with_writer(std::io::stdout)
                .with_timer(UtcTimeFormatter)
                .with_target(false);

            registry.with(console_layer).init();
        }
        (false, false) => {
            return Err(anyhow!("No logging output configured"));
        }
    }

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
    }
    if !config.level.to_lowercase().contains("trace") {
        info!("SQL and verbose logs suppressed (use TRACE level to see all logs)");
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== StockSync System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }

    info!("Log directory: {:?}", get_log_directory());
    info!("====================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert!(!config.level.is_empty());
        assert!(config.console_output);
        assert!(config.file_output);
    }

    #[test]
    fn test_log_directory_is_deterministic() {
        let log_dir = get_log_directory();
        assert!(log_dir.to_string_lossy().ends_with("logs"));
    }
}
