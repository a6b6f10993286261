//! Configuration loading and representation.
//!
//! Everything is read from the process environment:
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | required for the Postgres backend |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `RESERVATION_TTL_SECS` | `900` |
//! | `RESERVATION_SWEEP_INTERVAL_SECS` | `60` |
//! | `RESERVATION_SWEEP_BATCH` | `500` |

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::workers::SweeperConfig;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Hold duration used when the caller does not pass an explicit expiry.
    pub reservation_ttl: Duration,
    pub sweep_interval: Duration,
    pub sweep_batch_size: usize,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 10,
            reservation_ttl: Duration::from_secs(15 * 60),
            sweep_interval: Duration::from_secs(60),
            sweep_batch_size: 500,
        }
    }
}

impl InventoryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());

        let database_max_connections = parse_or(
            &lookup,
            "DATABASE_MAX_CONNECTIONS",
            defaults.database_max_connections,
        )?;
        if database_max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DATABASE_MAX_CONNECTIONS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let ttl_secs: u64 = parse_or(&lookup, "RESERVATION_TTL_SECS", defaults.reservation_ttl.as_secs())?;
        let sweep_secs: u64 = parse_or(
            &lookup,
            "RESERVATION_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval.as_secs(),
        )?;
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RESERVATION_SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        let sweep_batch_size = parse_or(&lookup, "RESERVATION_SWEEP_BATCH", defaults.sweep_batch_size)?;
        if sweep_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "RESERVATION_SWEEP_BATCH",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            database_url,
            database_max_connections,
            reservation_ttl: Duration::from_secs(ttl_secs),
            sweep_interval: Duration::from_secs(sweep_secs),
            sweep_batch_size,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    /// Expiry marker for a hold created at `now` with the default TTL.
    pub fn default_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.reservation_ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn sweeper(&self) -> SweeperConfig {
        SweeperConfig {
            interval: self.sweep_interval,
            batch_size: self.sweep_batch_size,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
