//! Infrastructure layer for configuration, persistence and upstream access
//!
//! This module provides the SQLite connection and repositories, the
//! rate-limited upstream REST client, and the logging and configuration
//! plumbing the sync engine runs on.

pub mod config;  // Configuration management and constants
pub mod database_connection;
pub mod inventory_repository;
pub mod logging;  // Logging infrastructure
pub mod retry;  // Retry policy with exponential backoff
pub mod sync_log_repository;
pub mod upstream_client;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, LoggingConfig, SyncConfig, UpstreamConfig};
pub use database_connection::DatabaseConnection;
pub use inventory_repository::InventoryRepository;
pub use logging::{get_log_directory, init_logging, init_logging_with_config, log_system_info};
pub use retry::RetryPolicy;
pub use sync_log_repository::SyncLogRepository;
pub use upstream_client::{
    PageRequest, RawPage, UpstreamClient, UpstreamError, UpstreamFetcher,
};
