use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub fetcher: FetcherConfig,
    pub scheduler: SchedulerConfig,
    pub notifications: NotificationsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Prefix the percent-encoded storefront URL is appended to.
    pub relay_url: String,
    pub request_timeout_seconds: u64,
    pub user_agent: String,
    pub storefront_host: String,
    pub not_found_title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub tick_interval_seconds: u64,
    pub tick_deadline_seconds: u64,
    pub pacing_delay_ms: u64,
    pub max_batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    pub telegram_api_base: String,
    pub request_timeout_seconds: u64,
    /// Offset used when rendering timestamps in alert messages.
    pub timezone_offset_minutes: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
    pub directory: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/delist-watcher.db".to_string(),
            max_connections: 5,
            acquire_timeout: 30,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            relay_url: "https://api.allorigins.win/raw?url=".to_string(),
            request_timeout_seconds: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0 Safari/537.36"
                .to_string(),
            storefront_host: "play.google.com".to_string(),
            not_found_title: crate::status::DEFAULT_NOT_FOUND_TITLE.to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 60,
            tick_deadline_seconds: 300,
            pacing_delay_ms: 2000,
            max_batch_size: 100,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            telegram_api_base: "https://api.telegram.org".to_string(),
            request_timeout_seconds: 10,
            timezone_offset_minutes: 0,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9001,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "delist_watcher=info,tower_http=info".to_string(),
            directory: None,
        }
    }
}

impl AppConfig {
    /// Layers built-in defaults, an optional config file, `DELIST_*` variables and
    /// finally the plain `DATABASE_URL` / `PORT` variables.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let path = config_path.unwrap_or("config/default");

        let s = Config::builder()
            // Start with built-in defaults
            .add_source(Config::try_from(&AppConfig::default())?)
            // Add the config file if there is one
            .add_source(File::with_name(path).required(config_path.is_some()))
            // Add environment variables with prefix "DELIST_"
            .add_source(
                Environment::with_prefix("DELIST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate server configuration
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        // Validate database configuration
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Message("Database url must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Message("Database max_connections must be greater than 0".into()));
        }

        // Validate fetcher configuration
        if Url::parse(&self.fetcher.relay_url).is_err() {
            return Err(ConfigError::Message("Invalid fetcher relay_url format".into()));
        }

        if self.fetcher.request_timeout_seconds == 0 {
            return Err(ConfigError::Message("Fetcher request_timeout_seconds must be greater than 0".into()));
        }

        if self.fetcher.storefront_host.trim().is_empty() {
            return Err(ConfigError::Message("Fetcher storefront_host must not be empty".into()));
        }

        // Validate scheduler configuration
        if self.scheduler.tick_interval_seconds == 0 {
            return Err(ConfigError::Message("Scheduler tick_interval_seconds must be greater than 0".into()));
        }

        if self.scheduler.max_batch_size == 0 {
            return Err(ConfigError::Message("Scheduler max_batch_size must be greater than 0".into()));
        }

        if self.scheduler.tick_deadline_seconds.saturating_mul(1000) <= self.scheduler.pacing_delay_ms {
            return Err(ConfigError::Message("Scheduler tick_deadline_seconds must exceed pacing_delay_ms".into()));
        }

        // Validate notification configuration
        if Url::parse(&self.notifications.telegram_api_base).is_err() {
            return Err(ConfigError::Message("Invalid notifications telegram_api_base format".into()));
        }

        if self.notifications.timezone_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Message("Notifications timezone_offset_minutes must be within one day".into()));
        }

        // Validate metrics configuration
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::Message("Metrics port must be greater than 0".into()));
        }

        Ok(())
    }
}
