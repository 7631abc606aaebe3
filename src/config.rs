//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Domain this instance mints object URIs under
    /// (e.g., "social.example.com")
    pub local_domain: String,
    /// How long a deletion tombstone suppresses a late create.
    /// Operational tuning parameter, hours-scale by default.
    pub tombstone_ttl_seconds: u64,
    /// Bounded wait for the per-activity lock. On expiry the activity is
    /// treated as being processed by another worker.
    pub lock_wait_ms: u64,
    /// Auto-expiry for a held lock, so a crashed holder cannot wedge a key.
    pub lock_hold_ttl_seconds: u64,
}

impl IngestConfig {
    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_secs(self.tombstone_ttl_seconds)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }

    pub fn lock_hold_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_hold_ttl_seconds)
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
    /// 4. Environment variables (FEDINGEST_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::PipelineError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("database.path", "data/fedingest.db")?
            .set_default("ingest.tombstone_ttl_seconds", 6 * 3600)?
            .set_default("ingest.lock_wait_ms", 1000)?
            .set_default("ingest.lock_hold_ttl_seconds", 900)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (FEDINGEST_*)
            .add_source(
                Environment::with_prefix("FEDINGEST")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::PipelineError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::PipelineError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::PipelineError> {
        if self.ingest.local_domain.trim().is_empty() {
            return Err(crate::error::PipelineError::Config(
                "ingest.local_domain must not be empty".to_string(),
            ));
        }

        if self.ingest.tombstone_ttl_seconds == 0 {
            return Err(crate::error::PipelineError::Config(
                "ingest.tombstone_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if self.ingest.lock_hold_ttl_seconds == 0 {
            return Err(crate::error::PipelineError::Config(
                "ingest.lock_hold_ttl_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            database: DatabaseConfig {
                path: PathBuf::from("/tmp/fedingest-test.db"),
            },
            ingest: IngestConfig {
                local_domain: "social.example.com".to_string(),
                tombstone_ttl_seconds: 6 * 3600,
                lock_wait_ms: 1000,
                lock_hold_ttl_seconds: 900,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_defaults() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.ingest.tombstone_ttl(), Duration::from_secs(21_600));
    }

    #[test]
    fn validate_rejects_empty_local_domain() {
        let mut config = valid_config();
        config.ingest.local_domain = "  ".to_string();

        let error = config
            .validate()
            .expect_err("empty local domain must fail validation");
        assert!(matches!(
            error,
            crate::error::PipelineError::Config(message)
                if message.contains("ingest.local_domain")
        ));
    }

    #[test]
    fn validate_rejects_zero_tombstone_ttl() {
        let mut config = valid_config();
        config.ingest.tombstone_ttl_seconds = 0;

        let error = config
            .validate()
            .expect_err("zero tombstone TTL must fail validation");
        assert!(matches!(
            error,
            crate::error::PipelineError::Config(message)
                if message.contains("tombstone_ttl_seconds")
        ));
    }
}
