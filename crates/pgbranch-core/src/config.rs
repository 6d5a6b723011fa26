//! Engine configuration.
//!
//! Values come from `PGBRANCH_*` environment variables and fall back to
//! [`crate::defaults`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::defaults;
use crate::error::{Error, Result};

/// Environment variable names.
pub const ENV_BATCH_SIZE: &str = "PGBRANCH_BATCH_SIZE";
pub const ENV_STATEMENT_TIMEOUT_SECS: &str = "PGBRANCH_STATEMENT_TIMEOUT_SECS";
pub const ENV_CONNECT_TIMEOUT_SECS: &str = "PGBRANCH_CONNECT_TIMEOUT_SECS";
pub const ENV_ADMIN_DATABASE: &str = "PGBRANCH_ADMIN_DATABASE";
pub const ENV_MAX_CONNECTIONS: &str = "PGBRANCH_MAX_CONNECTIONS";

/// Tunables for a clone engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Rows per multi-row INSERT.
    pub batch_size: usize,
    /// Applied as `statement_timeout` on every connection.
    pub statement_timeout: Duration,
    /// Bounds connection establishment and pool acquisition.
    pub connect_timeout: Duration,
    /// Database used for CREATE/DROP DATABASE.
    pub admin_database: String,
    /// Maximum connections per leased pool.
    pub max_connections: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            statement_timeout: Duration::from_secs(defaults::STATEMENT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            admin_database: defaults::ADMIN_DATABASE.to_string(),
            max_connections: defaults::POOL_MAX_CONNECTIONS,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from `PGBRANCH_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base = Self::default();

        let batch_size = parse_var(&lookup, ENV_BATCH_SIZE)?.unwrap_or(base.batch_size);
        let statement_timeout = parse_var::<u64, _>(&lookup, ENV_STATEMENT_TIMEOUT_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(base.statement_timeout);
        let connect_timeout = parse_var::<u64, _>(&lookup, ENV_CONNECT_TIMEOUT_SECS)?
            .map(Duration::from_secs)
            .unwrap_or(base.connect_timeout);
        let admin_database = lookup(ENV_ADMIN_DATABASE)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(base.admin_database);
        let max_connections =
            parse_var(&lookup, ENV_MAX_CONNECTIONS)?.unwrap_or(base.max_connections);

        let config = Self {
            batch_size,
            statement_timeout,
            connect_timeout,
            admin_database,
            max_connections,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine unusable.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config(format!("{} must be positive", ENV_BATCH_SIZE)));
        }
        if self.max_connections == 0 {
            return Err(Error::Config(format!(
                "{} must be positive",
                ENV_MAX_CONNECTIONS
            )));
        }
        if self.statement_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(Error::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    /// Set the rows per INSERT batch.
    pub fn batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    /// Set the per-statement timeout.
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the administrative database.
    pub fn admin_database(mut self, name: impl Into<String>) -> Self {
        self.admin_database = name.into();
        self
    }

    /// Set the maximum connections per leased pool.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", key, raw))),
    }
}
