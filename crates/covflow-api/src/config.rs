//! Service configuration read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use covflow_orchestration::application::command_handlers::DEFAULT_CONFLICT_RETRY_LIMIT;

use crate::error::AppError;

/// Settings the service needs at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Upper bound of the connection pool.
    pub database_max_connections: u32,
    /// Append attempts allowed per producer event.
    pub conflict_retry_limit: u32,
    /// Interval between purges of expired state changes.
    pub expiry_purge_interval: Duration,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is missing or invalid.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which returns the value of a
    /// variable if it is set.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a variable is missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".to_owned())
        })?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned());
        let port: u16 = parse_or(&lookup, "PORT", 3000)?;
        let listen_addr = format!("{host}:{port}")
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;

        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?;
        let conflict_retry_limit =
            parse_or(&lookup, "CONFLICT_RETRY_LIMIT", DEFAULT_CONFLICT_RETRY_LIMIT)?;
        if conflict_retry_limit == 0 {
            return Err(AppError::Config(
                "CONFLICT_RETRY_LIMIT must be at least 1".to_owned(),
            ));
        }
        let purge_secs: u64 = parse_or(&lookup, "EXPIRY_PURGE_INTERVAL_SECS", 300)?;
        if purge_secs == 0 {
            return Err(AppError::Config(
                "EXPIRY_PURGE_INTERVAL_SECS must be at least 1".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            listen_addr,
            database_max_connections,
            conflict_retry_limit,
            expiry_purge_interval: Duration::from_secs(purge_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
        None => Ok(default),
    }
}
