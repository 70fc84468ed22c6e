use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {message}")]
    LoadError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

/// Which storage backend serves the repository contract. Selected once at
/// startup; nothing outside the application root branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Redis,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_backend")]
    pub backend: Backend,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_postgres_url")]
    pub postgres_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub enable_json_logging: bool,
}

impl Config {
    pub fn from_environment() -> Result<Self, ConfigError> {
        info!("Loading configuration from environment");

        let config = Config {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            observability: ObservabilityConfig::from_env()?,
        };

        config.validate()?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError {
                message: "Server port cannot be 0".to_string(),
            });
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "Request timeout cannot be 0".to_string(),
            });
        }

        let url = match self.database.backend {
            Backend::Redis => &self.database.redis_url,
            Backend::Postgres => &self.database.postgres_url,
        };
        if url.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "Store URL for the selected backend cannot be empty".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError {
                message: "Connection pool size cannot be 0".to_string(),
            });
        }

        Ok(())
    }
}

fn from_env_section<T: for<'de> Deserialize<'de>>(section: &str) -> Result<T, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::Environment::with_prefix("ORDERS"))
        .build()
        .map_err(|e| ConfigError::LoadError {
            message: format!("Failed to load {section} config: {e}"),
        })?;

    settings.try_deserialize().map_err(|e| ConfigError::LoadError {
        message: format!("Failed to deserialize {section} config: {e}"),
    })
}

impl ServerConfig {
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        from_env_section("server")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl DatabaseConfig {
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        from_env_section("database")
    }
}

impl ObservabilityConfig {
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        from_env_section("observability")
    }
}

// Default value functions
pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    3000
}

pub(crate) fn default_timeout() -> u64 {
    30
}

pub(crate) fn default_backend() -> Backend {
    Backend::Redis
}

pub(crate) fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

pub(crate) fn default_postgres_url() -> String {
    "postgresql://localhost:5432/orders".to_string()
}

pub(crate) fn default_max_connections() -> u32 {
    10
}

pub(crate) fn default_service_name() -> String {
    "orders-rs".to_string()
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}
