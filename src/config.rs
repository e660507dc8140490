//! Ledger configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Missing or unparsable values fall back
//! to defaults, except `LISTEN_ADDR`, which must parse if set.

use std::net::SocketAddr;
use std::time::Duration;

use crate::service::RetryPolicy;

/// Startup configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `LISTEN_ADDR` is set but is not a socket address.
    #[error("LISTEN_ADDR {value:?} is not a valid socket address")]
    InvalidListenAddr {
        /// Offending value.
        value: String,
        /// Parser error.
        #[source]
        source: std::net::AddrParseError,
    },

    /// Neither `DATABASE_URL` nor a complete `DB_*` set is present.
    #[error("{0} must be set when DATABASE_URL is not provided")]
    MissingDatabaseSetting(&'static str),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Connection URL.
    pub url: String,
    /// Maximum number of database connections in the pool.
    pub max_connections: u32,
    /// Minimum idle connections in the pool.
    pub min_connections: u32,
    /// Timeout in seconds for acquiring a database connection.
    pub connect_timeout_secs: u64,
}

/// Top-level ledger configuration.
///
/// Loaded once at startup via [`LedgerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Database settings; `None` when persistence is disabled.
    pub database: Option<DatabaseConfig>,

    /// Whether to apply the schema at startup.
    pub run_migrations: bool,

    /// Total transfer attempts, counting the first.
    pub transfer_max_attempts: u32,

    /// Backoff base between transfer attempts, in milliseconds.
    pub transfer_retry_base_delay_ms: u64,

    /// Per-request deadline in seconds.
    pub request_timeout_secs: u64,

    /// Log output format.
    pub log_format: LogFormat,
}

impl LedgerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `LISTEN_ADDR` does not parse, or if
    /// persistence is enabled without a usable database setting.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`LedgerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw_addr = lookup("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let listen_addr = raw_addr
            .parse::<SocketAddr>()
            .map_err(|source| ConfigError::InvalidListenAddr {
                value: raw_addr.clone(),
                source,
            })?;

        let persistence_enabled = parse_bool(lookup("PERSISTENCE_ENABLED"), true);
        let database = if persistence_enabled {
            Some(DatabaseConfig {
                url: database_url(&lookup)?,
                max_connections: parse_or(lookup("DATABASE_MAX_CONNECTIONS"), 10),
                min_connections: parse_or(lookup("DATABASE_MIN_CONNECTIONS"), 2),
                connect_timeout_secs: parse_or(lookup("DATABASE_CONNECT_TIMEOUT_SECS"), 5),
            })
        } else {
            None
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            database,
            run_migrations: parse_bool(lookup("RUN_MIGRATIONS"), true),
            transfer_max_attempts: parse_or(
                lookup("TRANSFER_MAX_ATTEMPTS"),
                RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            ),
            transfer_retry_base_delay_ms: parse_or(lookup("TRANSFER_RETRY_BASE_DELAY_MS"), 10),
            request_timeout_secs: parse_or(lookup("REQUEST_TIMEOUT_SECS"), 30),
            log_format,
        })
    }

    /// Retry policy for transfers.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.transfer_max_attempts,
            Duration::from_millis(self.transfer_retry_base_delay_ms),
        )
    }

    /// Per-request deadline.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Outer HTTP timeout: one second past [`LedgerConfig::request_timeout`]
    /// so the handler's own deadline answers first.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        self.request_timeout().saturating_add(Duration::from_secs(1))
    }
}

/// `DATABASE_URL`, or a URL composed from the `DB_*` variables.
fn database_url<F>(lookup: &F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("DATABASE_URL") {
        return Ok(url);
    }
    let required = |key: &'static str| lookup(key).ok_or(ConfigError::MissingDatabaseSetting(key));
    let user = required("DB_USER")?;
    let password = required("DB_PASSWORD")?;
    let dbname = required("DB_DBNAME")?;
    let host = lookup("DB_HOST").unwrap_or_else(|| "postgres".to_string());
    let port: u16 = parse_or(lookup("DB_PORT"), 5432);
    let sslmode = lookup("DB_SSLMODE").unwrap_or_else(|| "disable".to_string());
    Ok(format!(
        "postgres://{user}:{password}@{host}:{port}/{dbname}?sslmode={sslmode}"
    ))
}

/// Parses `value` as `T`, returning `default` on missing or invalid values.
fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

/// Parses a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
        _ => default,
    }
}
