//! Configuration loading and representation.
//!
//! Everything comes from environment variables; unset variables fall back to
//! defaults, malformed ones are an error.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// How often the ledger re-runs a unit of work that lost an optimistic race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never below 1.
    pub max_attempts: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    /// `None` runs the service on in-memory stores.
    pub database: Option<DatabaseConfig>,
    pub retry: RetryPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (tests pass a map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = parse_or(
            "BIND_ADDR",
            get("BIND_ADDR"),
            DEFAULT_BIND_ADDR.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                var: "BIND_ADDR",
                reason: e.to_string(),
            })?,
        )?;

        let database = match get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(
                    "DATABASE_MAX_CONNECTIONS",
                    get("DATABASE_MAX_CONNECTIONS"),
                    DEFAULT_MAX_CONNECTIONS,
                )?,
            }),
            None => None,
        };

        let max_attempts: u32 = parse_or(
            "LEDGER_MAX_ATTEMPTS",
            get("LEDGER_MAX_ATTEMPTS"),
            DEFAULT_MAX_ATTEMPTS,
        )?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "LEDGER_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }
        let backoff_ms: u64 = parse_or(
            "LEDGER_RETRY_BACKOFF_MS",
            get("LEDGER_RETRY_BACKOFF_MS"),
            DEFAULT_RETRY_BACKOFF_MS,
        )?;

        Ok(Self {
            bind_addr,
            database,
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(backoff_ms)),
        })
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: format!("'{raw}': {e}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_database() {
        let c = config(&[]).unwrap();
        assert_eq!(c.bind_addr.to_string(), "0.0.0.0:8080");
        assert!(c.database.is_none());
        assert_eq!(c.retry, RetryPolicy::default());
    }

    #[test]
    fn reads_database_and_retry_settings() {
        let c = config(&[
            ("DATABASE_URL", "postgres://localhost/avicola"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("LEDGER_MAX_ATTEMPTS", "8"),
            ("LEDGER_RETRY_BACKOFF_MS", "0"),
        ])
        .unwrap();
        let db = c.database.unwrap();
        assert_eq!(db.max_connections, 4);
        assert_eq!(c.retry.max_attempts, 8);
        assert_eq!(c.retry.backoff, Duration::ZERO);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            config(&[("BIND_ADDR", "not-an-addr")]),
            Err(ConfigError::Invalid { var: "BIND_ADDR", .. })
        ));
        assert!(config(&[("LEDGER_MAX_ATTEMPTS", "0")]).is_err());
        assert!(config(&[("LEDGER_RETRY_BACKOFF_MS", "-3")]).is_err());
    }

    #[test]
    fn blank_database_url_means_in_memory() {
        assert!(config(&[("DATABASE_URL", "  ")]).unwrap().database.is_none());
    }
}
