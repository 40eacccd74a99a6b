//! Configuration management for the SupplyMate backend
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with SUPPLYMATE_ prefix

use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Admin account seeded on an empty install
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdminConfig>,

    /// Stock ledger locking and retry behaviour
    pub ledger: LedgerConfig,

    /// Reporting configuration
    pub reporting: ReportingConfig,

    /// Log output configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Seconds to wait for a pooled connection before reporting busy
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for signing and verifying JWT tokens
    pub secret: String,

    /// Access token lifetime in seconds
    pub access_token_expiry_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BootstrapAdminConfig {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Longest a command waits for a product row lock
    pub lock_timeout_ms: u64,

    /// How many times a busy command is retried before failing
    pub busy_retries: u32,

    /// Base delay between busy retries; grows linearly per attempt
    pub busy_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportingConfig {
    /// Offset of the business's local day from UTC, in minutes
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// "pretty" or "json"
    pub format: String,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("SUPPLYMATE_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("jwt.access_token_expiry_secs", 86400)?
            .set_default("ledger.lock_timeout_ms", 2000)?
            .set_default("ledger.busy_retries", 3)?
            .set_default("ledger.busy_backoff_ms", 50)?
            .set_default("reporting.utc_offset_minutes", 420)?
            .set_default("logging.format", "pretty")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (SUPPLYMATE_ prefix)
            .add_source(
                Environment::with_prefix("SUPPLYMATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl LedgerConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl ReportingConfig {
    /// Local offset used to turn ledger timestamps into calendar days.
    /// Out-of-range values fall back to UTC.
    pub fn offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 2000,
            busy_retries: 3,
            busy_backoff_ms: 50,
        }
    }
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 420,
        }
    }
}
