//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use poker_engine::db::DatabaseConfig;
use std::net::SocketAddr;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration; `None` means no `DATABASE_URL` was set and the
    /// server falls back to an in-memory profile repository.
    pub database: Option<DatabaseConfig>,
    /// Room defaults configuration
    pub room_defaults: RoomDefaultsConfig,
}

/// Default room configuration, applied to every room a lobby creates.
#[derive(Debug, Clone)]
pub struct RoomDefaultsConfig {
    /// Small blind amount
    pub small_blind: u64,
    /// Big blind amount
    pub big_blind: u64,
    /// Starting chip stack for a newly-seen player
    pub starting_chips: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Returns
    ///
    /// * `Result<ServerConfig, ConfigError>` - Loaded configuration or error
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = bind_override
            .or_else(|| {
                std::env::var("SERVER_BIND")
                    .ok()
                    .and_then(|s| s.parse().ok())
            })
            .unwrap_or_else(|| {
                "127.0.0.1:6969"
                    .parse()
                    .expect("Default bind address is valid")
            });

        let database_url = database_url_override.or_else(|| std::env::var("DATABASE_URL").ok());
        let database = database_url.map(|database_url| DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", 100),
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", 5),
            connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT_SECS", 5),
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", 1800),
        });

        let room_defaults = RoomDefaultsConfig {
            small_blind: parse_env_or("ROOM_SMALL_BLIND", 10),
            big_blind: parse_env_or("ROOM_BIG_BLIND", 20),
            starting_chips: parse_env_or("ROOM_STARTING_CHIPS", 1000),
        };

        Ok(ServerConfig {
            bind,
            database,
            room_defaults,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.room_defaults.small_blind == 0 {
            return Err(ConfigError::Invalid {
                var: "ROOM_SMALL_BLIND".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.room_defaults.big_blind <= self.room_defaults.small_blind {
            return Err(ConfigError::Invalid {
                var: "ROOM_BIG_BLIND".to_string(),
                reason: format!(
                    "Must be greater than small blind ({})",
                    self.room_defaults.small_blind
                ),
            });
        }

        if self.room_defaults.starting_chips < self.room_defaults.big_blind {
            return Err(ConfigError::Invalid {
                var: "ROOM_STARTING_CHIPS".to_string(),
                reason: "Must be at least one big blind".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
