//! Configuration management for BillRelay
//!
//! Values are layered: built-in defaults, an optional TOML file, then
//! `BILLRELAY_*` environment variables (`__` separates nested keys, e.g.
//! `BILLRELAY_STORAGE__SPREADSHEET_ID`). The variable names used by the
//! earlier deployments (`TELEGRAM_BOT_TOKEN`, `GOOGLE_SHEET_ID`, ...) are
//! applied last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::CheckTime;

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "BILLRELAY";

/// Legacy variable name -> configuration key
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TELEGRAM_BOT_TOKEN", "telegram.token"),
    ("AXENTA_API_URL", "billing.api_url"),
    ("AXENTA_AUTH_ENDPOINT", "billing.auth_endpoint"),
    ("GOOGLE_SHEET_ID", "storage.spreadsheet_id"),
    ("GOOGLE_CREDENTIALS_FILE", "storage.credentials_file"),
    ("LOG_LEVEL", "logging.level"),
];

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram bot configuration
    pub telegram: TelegramConfig,

    /// Billing provider configuration
    pub billing: BillingConfig,

    /// Spreadsheet store configuration
    pub storage: StorageConfig,

    /// Notification poller configuration
    pub notifications: NotificationsConfig,

    /// Daily maintenance jobs
    pub maintenance: MaintenanceConfig,

    /// Operational HTTP server
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            billing: BillingConfig::default(),
            storage: StorageConfig::default(),
            notifications: NotificationsConfig::default(),
            maintenance: MaintenanceConfig::default(),
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// A `.env` file in the working directory is read first when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("billrelay").required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        for (var, key) in LEGACY_ENV {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Check the settings every command needs.
    pub fn validate(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Sheets && self.storage.spreadsheet_id.is_empty()
        {
            return Err(Error::config(
                "storage.spreadsheet_id is required for the sheets backend",
            ));
        }
        if self.notifications.check_interval.is_zero() {
            return Err(Error::config("notifications.check_interval must be positive"));
        }
        self.storage.timezone()?;
        Ok(())
    }

    /// Check the settings needed to talk to Telegram.
    pub fn validate_telegram(&self) -> Result<()> {
        if self.telegram.token.trim().is_empty() {
            return Err(Error::config(
                "telegram.token (or TELEGRAM_BOT_TOKEN) is not set",
            ));
        }
        Ok(())
    }
}

/// Telegram bot configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token
    pub token: String,
}

/// Billing provider (Axenta) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Base URL of the provider API
    pub api_url: String,
    /// Path of the login endpoint
    pub auth_endpoint: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Retries for network failures and server errors
    pub max_retries: u32,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            api_url: "https://axenta.cloud/".to_string(),
            auth_endpoint: "/auth/login".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl BillingConfig {
    /// Full URL of the login endpoint
    pub fn auth_url(&self) -> String {
        let base = self.api_url.trim_end_matches('/');
        let endpoint = self.auth_endpoint.trim_start_matches('/');
        format!("{base}/{endpoint}")
    }
}

/// Row store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Google Sheets
    #[default]
    Sheets,
    /// In-process store (local development)
    Memory,
}

/// Spreadsheet store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Which backend to use
    pub backend: StorageBackend,
    /// Spreadsheet id
    pub spreadsheet_id: String,
    /// Service account key file
    pub credentials_file: PathBuf,
    /// Sheets API base URL
    pub api_url: String,
    /// OAuth token endpoint
    pub token_url: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Retries per Sheets API call
    pub max_retries: u32,
    /// TTL of cached users, balances and directory entries
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Offset (hours east of UTC) used for timestamps written to the sheet
    pub utc_offset_hours: i32,
    /// JSON file with initial rows for the memory backend
    pub seed_file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sheets,
            spreadsheet_id: String::new(),
            credentials_file: PathBuf::from("credentials/service_account.json"),
            api_url: "https://sheets.googleapis.com/v4/".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            cache_ttl: Duration::from_secs(3600),
            utc_offset_hours: 3,
            seed_file: None,
        }
    }
}

impl StorageConfig {
    /// Timezone of the timestamps stored in the sheet
    pub fn timezone(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            Error::config(format!(
                "storage.utc_offset_hours out of range: {}",
                self.utc_offset_hours
            ))
        })
    }
}

/// Notification poller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Interval between checks
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Offset used when a user has none in the directory
    pub default_utc_offset_hours: i32,
    /// Preset check times offered in the chat menu
    pub time_options: Vec<CheckTime>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            default_utc_offset_hours: 3,
            time_options: ["10:00", "12:00", "15:00"]
                .iter()
                .filter_map(|t| t.parse().ok())
                .collect(),
        }
    }
}

/// Daily maintenance jobs, in the store timezone
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// When to flush the repository cache
    pub cache_clear_at: CheckTime,
    /// When to remove old log rows
    pub log_cleanup_at: CheckTime,
    /// Age after which log rows are removed
    pub log_retention_days: u32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cache_clear_at: CheckTime::new(3, 5).unwrap_or_default(),
            log_cleanup_at: CheckTime::new(3, 10).unwrap_or_default(),
            log_retention_days: 30,
        }
    }
}

/// Operational HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Whether `serve` starts the HTTP server
    pub enabled: bool,
    /// Host to bind to
    pub host: String,
    /// HTTP port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive
    pub level: String,
    /// Console format
    pub format: LogFormat,
    /// Directory for daily rolling log files (disabled when unset)
    pub directory: Option<PathBuf>,
    /// File name prefix for rolling log files
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            directory: None,
            file_prefix: "billrelay.log".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid_for_memory_backend() {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;

        assert!(config.validate().is_ok());
        assert!(config.validate_telegram().is_err());
    }

    #[test]
    fn test_sheets_backend_requires_spreadsheet_id() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_auth_url_joins_without_double_slash() {
        let billing = BillingConfig::default();
        assert_eq!(billing.auth_url(), "https://axenta.cloud/auth/login");

        let billing = BillingConfig {
            api_url: "http://localhost:9000".to_string(),
            auth_endpoint: "api/login".to_string(),
            ..BillingConfig::default()
        };
        assert_eq!(billing.auth_url(), "http://localhost:9000/api/login");
    }

    #[test]
    fn test_default_time_options() {
        let options: Vec<String> = NotificationsConfig::default()
            .time_options
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(options, vec!["10:00", "12:00", "15:00"]);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("billrelay.toml");
        std::fs::write(
            &path,
            r#"
[storage]
backend = "memory"
cache_ttl = "10m"

[notifications]
check_interval = "5m"
time_options = ["09:30"]

[maintenance]
cache_clear_at = "04:00"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.cache_ttl, Duration::from_secs(600));
        assert_eq!(config.notifications.check_interval, Duration::from_secs(300));
        assert_eq!(config.notifications.time_options[0].to_string(), "09:30");
        assert_eq!(config.maintenance.cache_clear_at.to_string(), "04:00");
        assert_eq!(config.maintenance.log_retention_days, 30);
    }
}
