//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).
//!
//! | Variable | Default |
//! |---|---|
//! | `LISTEN_ADDR` | `0.0.0.0:3000` |
//! | `STORE_BACKEND` | `memory` (`memory` or `postgres`) |
//! | `DATABASE_URL` | unset |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `DATABASE_MIN_CONNECTIONS` | `2` |
//! | `DATABASE_CONNECT_TIMEOUT_SECS` | `5` |
//! | `EVENT_BUS_CAPACITY` | `10000` |
//! | `STORE_CHANGE_CAPACITY` | `1024` |
//! | `MAX_OPEN_JOBS` | `1000` |
//! | `LOG_FORMAT` | `text` (`text` or `json`) |
//! | `REQUEST_TIMEOUT_SECS` | `30` |

use std::net::SocketAddr;
use std::str::FromStr;

/// Error raised when a configuration value cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` is not a socket address.
    #[error("invalid LISTEN_ADDR {value:?}: {source}")]
    ListenAddr {
        /// Raw value.
        value: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },
    /// An enumerated setting holds an unknown value.
    #[error("invalid {key}: {value:?} (expected one of {expected})")]
    Unknown {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Accepted values.
        expected: &'static str,
    },
}

/// Which [`crate::store::RecordStore`] adapter to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// Process-local store. Data is lost on restart.
    #[default]
    Memory,
    /// PostgreSQL through `sqlx`.
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(ConfigError::Unknown {
                key: "STORE_BACKEND",
                value: s.to_string(),
                expected: "memory, postgres",
            }),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::Unknown {
                key: "LOG_FORMAT",
                value: s.to_string(),
                expected: "text, json",
            }),
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string. Required for the postgres backend.
    pub url: Option<String>,
    /// Maximum number of database connections in the pool.
    pub max_connections: u32,
    /// Minimum idle connections in the pool.
    pub min_connections: u32,
    /// Timeout in seconds for acquiring a database connection.
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 5,
        }
    }
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`MarketConfig::from_env`].
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Record store adapter.
    pub store_backend: StoreBackend,

    /// Database settings, used by the postgres backend.
    pub database: DatabaseConfig,

    /// Capacity of the `MarketEvent` broadcast channel.
    pub event_bus_capacity: usize,

    /// Capacity of the store's change feed.
    pub store_change_capacity: usize,

    /// Upper bound on open jobs scanned per discovery query.
    pub max_open_jobs: usize,

    /// Log output format.
    pub log_format: LogFormat,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            store_backend: StoreBackend::Memory,
            database: DatabaseConfig::default(),
            event_bus_capacity: 10_000,
            store_change_capacity: 1024,
            max_open_jobs: 1000,
            log_format: LogFormat::Text,
            request_timeout_secs: 30,
        }
    }
}

impl MarketConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to the defaults above when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `LISTEN_ADDR`, `STORE_BACKEND` or
    /// `LOG_FORMAT` is set to a value that cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`MarketConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(value) => value
                .parse()
                .map_err(|source| ConfigError::ListenAddr { value, source })?,
            None => defaults.listen_addr,
        };
        let store_backend = lookup("STORE_BACKEND")
            .map(|v| v.parse::<StoreBackend>())
            .transpose()?
            .unwrap_or_default();
        let log_format = lookup("LOG_FORMAT")
            .map(|v| v.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        let database = DatabaseConfig {
            url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: parse_or(
                &lookup,
                "DATABASE_MAX_CONNECTIONS",
                defaults.database.max_connections,
            ),
            min_connections: parse_or(
                &lookup,
                "DATABASE_MIN_CONNECTIONS",
                defaults.database.min_connections,
            ),
            connect_timeout_secs: parse_or(
                &lookup,
                "DATABASE_CONNECT_TIMEOUT_SECS",
                defaults.database.connect_timeout_secs,
            ),
        };

        Ok(Self {
            listen_addr,
            store_backend,
            database,
            event_bus_capacity: parse_or(&lookup, "EVENT_BUS_CAPACITY", defaults.event_bus_capacity),
            store_change_capacity: parse_or(
                &lookup,
                "STORE_CHANGE_CAPACITY",
                defaults.store_change_capacity,
            ),
            max_open_jobs: parse_or(&lookup, "MAX_OPEN_JOBS", defaults.max_open_jobs),
            log_format,
            request_timeout_secs: parse_or(
                &lookup,
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
        })
    }
}

/// Parses a variable as `T`, returning `default` on missing or invalid
/// values.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
