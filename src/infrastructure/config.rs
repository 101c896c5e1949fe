//! Configuration infrastructure
//!
//! Contains configuration loading and management for upstream synchronization.
//!
//! Configuration is organized into three sections:
//! 1. Upstream connection settings (credentials, pagination, retry budget)
//! 2. Sync behavior settings (batch size, resources, watchdog thresholds)
//! 3. Logging settings

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::info;
use url::Url;

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream connection settings
    pub upstream: UpstreamConfig,

    /// Sync engine behavior settings
    pub sync: SyncConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Upstream connection settings
///
/// An immutable copy of this struct is handed to the client at construction;
/// nothing reads it from ambient state afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the upstream REST surface, e.g. `https://erp.example.com/rest`
    pub base_url: String,

    /// API key sent as the Basic Auth username. Never logged.
    pub api_key: String,

    /// API secret sent as the Basic Auth password. Never logged.
    pub api_secret: String,

    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Request rate ceiling per second
    pub requests_per_second: u32,

    /// Maximum attempts per page fetch (first try included)
    pub max_retries: u32,

    /// Base delay for retry backoff in milliseconds
    pub retry_base_delay_ms: u64,

    /// Cap for retry backoff delay in milliseconds
    pub retry_max_delay_ms: u64,

    /// Records requested per page
    pub page_size: u32,
}

impl UpstreamConfig {
    /// Parse and validate the configured base URL
    pub fn parsed_base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .with_context(|| format!("Invalid upstream base URL: {}", self.base_url))
    }
}

/// Sync engine behavior settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Records per write batch
    pub batch_size: usize,

    /// Upstream resource the inventory sync reads (`product` or `inventoryitem`)
    pub inventory_resource: String,

    /// Heartbeat age in seconds after which a running sync counts as stale
    pub stale_run_threshold_seconds: i64,

    /// Watchdog sweep interval in seconds
    pub watchdog_interval_seconds: u64,

    /// SQLite database file; resolved under the app data directory when unset
    pub database_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Structured JSON output for the log file
    pub json_format: bool,

    /// Output to console/terminal
    pub console_output: bool,

    /// Output to rotating file under the app data directory
    pub file_output: bool,

    /// Maximum rotated log files to keep
    pub max_files: u32,

    /// Per-module log level filters
    pub module_filters: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            upstream: UpstreamConfig::default(),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            requests_per_second: defaults::REQUESTS_PER_SECOND,
            max_retries: defaults::MAX_RETRIES,
            retry_base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: defaults::RETRY_MAX_DELAY_MS,
            page_size: defaults::PAGE_SIZE,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            inventory_resource: upstream::RESOURCE_PRODUCT.to_string(),
            stale_run_threshold_seconds: defaults::STALE_RUN_THRESHOLD_SECONDS,
            watchdog_interval_seconds: defaults::WATCHDOG_INTERVAL_SECONDS,
            database_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            max_files: defaults::LOG_MAX_FILES,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("sqlx".to_string(), "warn".to_string());
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters.insert("stocksync_lib".to_string(), "info".to_string());
                filters
            },
        }
    }
}

impl AppConfig {
    /// Override credentials from the environment when present
    ///
    /// `STOCKSYNC_API_KEY` / `STOCKSYNC_API_SECRET` take precedence over the
    /// config file so deployments can keep secrets out of it.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("STOCKSYNC_API_KEY") {
            if !key.is_empty() {
                self.upstream.api_key = key;
            }
        }
        if let Ok(secret) = std::env::var("STOCKSYNC_API_SECRET") {
            if !secret.is_empty() {
                self.upstream.api_secret = secret;
            }
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("stocksync");

        Ok(config_dir)
    }

    /// Get application data directory (database, logs)
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join("stocksync");

        Ok(data_dir)
    }

    /// Create a new configuration manager with the standard config path
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        let config_path = config_dir.join("stocksync_config.json");

        Ok(Self { config_path })
    }

    /// Initialize configuration system on first run
    pub async fn initialize_on_first_run(&self) -> Result<AppConfig> {
        let config_dir = self
            .config_path
            .parent()
            .context("Failed to get config directory")?;

        if !config_dir.exists() {
            fs::create_dir_all(config_dir)
                .await
                .context("Failed to create config directory")?;
            info!("✅ Created configuration directory: {:?}", config_dir);
        }

        let is_first_run = !self.config_path.exists();

        if is_first_run {
            info!("🎉 First run detected - initializing default configuration");

            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            self.create_data_directories().await?;

            info!("✅ Initial configuration setup completed");
            Ok(default_config)
        } else {
            self.load_config().await
        }
    }

    /// Create necessary data directories
    async fn create_data_directories(&self) -> Result<()> {
        let app_data_dir = Self::get_app_data_dir()?;

        let directories = [app_data_dir.join("database"), app_data_dir.join("logs")];

        for dir in &directories {
            if !dir.exists() {
                fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("Failed to create directory: {:?}", dir))?;
                info!("📁 Created directory: {:?}", dir);
            }
        }

        Ok(())
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!(
                "Configuration file not found, creating default: {:?}",
                self.config_path
            );
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                tracing::warn!("⚠️  Configuration file unreadable: {}", parse_error);
                tracing::warn!("⚠️  Resetting to default configuration");

                // Keep the unreadable file around for manual recovery
                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    tracing::warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;

                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Update sync settings in place
    pub async fn update_sync_config<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut SyncConfig),
    {
        let mut config = self.load_config().await?;
        updater(&mut config.sync);
        self.save_config(&config).await
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Resolve the SQLite database path from config or the data directory
    pub fn resolve_database_path(config: &AppConfig) -> Result<PathBuf> {
        if let Some(path) = &config.sync.database_path {
            return Ok(path.clone());
        }

        let data_dir = Self::get_app_data_dir()?;
        Ok(data_dir.join("database").join("stocksync.db"))
    }
}

/// Upstream REST resource names and query parameters
pub mod upstream {
    /// Product catalog records (default source for the inventory sync)
    pub const RESOURCE_PRODUCT: &str = "product";

    /// Warehouse-level inventory records (alternate source for the inventory sync)
    pub const RESOURCE_INVENTORY_ITEM: &str = "inventoryitem";

    /// Vendor / supplier records
    pub const RESOURCE_PARTY: &str = "party";

    /// Purchase order records
    pub const RESOURCE_ORDER: &str = "order";

    /// Query parameter names understood by the upstream list endpoints
    pub mod params {
        /// Page size parameter
        pub const LIMIT: &str = "limit";

        /// Page start offset parameter
        pub const OFFSET: &str = "offset";

        /// Incremental filter: only records modified after this instant
        pub const UPDATED_AFTER: &str = "updatedAfter";
    }
}

/// Default configuration values
pub mod defaults {
    /// Default upstream base URL (development target; overridden in deployments)
    pub const BASE_URL: &str = "http://localhost:8080/rest";

    /// Default records requested per page
    pub const PAGE_SIZE: u32 = 100;

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Default request rate ceiling per second
    pub const REQUESTS_PER_SECOND: u32 = 5;

    /// Default maximum attempts per page fetch
    pub const MAX_RETRIES: u32 = 3;

    /// Default retry backoff base delay in milliseconds
    pub const RETRY_BASE_DELAY_MS: u64 = 500;

    /// Default retry backoff delay cap in milliseconds
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;

    /// Default records per write batch
    pub const BATCH_SIZE: usize = 50;

    /// Default heartbeat age in seconds before a running sync counts as stale
    pub const STALE_RUN_THRESHOLD_SECONDS: i64 = 600;

    /// Default watchdog sweep interval in seconds
    pub const WATCHDOG_INTERVAL_SECONDS: u64 = 60;

    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Default JSON format setting
    pub const LOG_JSON_FORMAT: bool = false;

    /// Default console output setting
    pub const LOG_CONSOLE_OUTPUT: bool = true;

    /// Default file output setting
    pub const LOG_FILE_OUTPUT: bool = true;

    /// Default maximum log files to keep
    pub const LOG_MAX_FILES: u32 = 5;
}
