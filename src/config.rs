//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub network: NetworkConfig,
    pub paging: PagingConfig,
    pub logging: LoggingConfig,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the cache database file
    pub path: PathBuf,
}

/// Network configuration shared by all backend clients
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
    /// User-Agent header sent to every backend
    pub user_agent: String,
}

/// Paging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PagingConfig {
    /// Default page size for timeline fetches (clamped to 1..=100)
    pub page_size: usize,
}

impl PagingConfig {
    /// Page size clamped against safety caps.
    ///
    /// The result is always in `1..=100`; backends reject larger pages.
    pub fn bounded_page_size(&self) -> usize {
        self.page_size.clamp(1, 100)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (ROOST_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::EngineError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("database.path", "roost-cache.db")?
            .set_default("network.timeout_seconds", 30)?
            .set_default("network.user_agent", "Roost/0.1.0")?
            .set_default("paging.page_size", 20)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("ROOST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::EngineError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::EngineError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::EngineError> {
        if self.network.timeout_seconds == 0 {
            return Err(crate::error::EngineError::Config(
                "network.timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.paging.page_size == 0 {
            return Err(crate::error::EngineError::Config(
                "paging.page_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Initialize the global tracing subscriber from the logging section.
///
/// Falls back to the `ROOST_LOG` env filter when set.
pub fn init_tracing(logging: &LoggingConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("ROOST_LOG")
        .unwrap_or_else(|_| EnvFilter::new(logging.level.clone()));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_page_size_clamps() {
        let paging = PagingConfig { page_size: 0 };
        assert_eq!(paging.bounded_page_size(), 1);
        let paging = PagingConfig { page_size: 500 };
        assert_eq!(paging.bounded_page_size(), 100);
        let paging = PagingConfig { page_size: 20 };
        assert_eq!(paging.bounded_page_size(), 20);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = AppConfig {
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/roost-test.db"),
            },
            network: NetworkConfig {
                timeout_seconds: 0,
                user_agent: "Roost/test".to_string(),
            },
            paging: PagingConfig { page_size: 20 },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        assert!(config.validate().is_err());
    }
}
