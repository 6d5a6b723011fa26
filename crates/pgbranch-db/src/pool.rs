//! Connection management.
//!
//! Two kinds of connections are used by a clone:
//! - leased pools for the source and target databases, handed out by an
//!   explicit [`PoolRegistry`] owned by the surrounding service;
//! - short-lived single connections to the administrative database for
//!   CREATE/DROP DATABASE, which are never pooled.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgConnection, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use pgbranch_core::{defaults, EngineConfig, Error, Result, ServerConfig};

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Acquire timeout duration.
    pub connect_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
    /// Applied as the `statement_timeout` session parameter.
    pub statement_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: defaults::POOL_MAX_CONNECTIONS,
            min_connections: 0,
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(defaults::POOL_IDLE_TIMEOUT_SECS),
            statement_timeout: Duration::from_secs(defaults::STATEMENT_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive pool settings from the engine configuration.
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self::default()
            .max_connections(config.max_connections)
            .connect_timeout(config.connect_timeout)
            .statement_timeout(config.statement_timeout)
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the per-statement timeout.
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }
}

/// Build connect options for `database` on `server`.
pub fn connect_options(
    server: &ServerConfig,
    database: &str,
    statement_timeout: Duration,
) -> PgConnectOptions {
    let ssl_mode = if server.ssl {
        PgSslMode::Require
    } else {
        PgSslMode::Prefer
    };

    PgConnectOptions::new()
        .host(&server.host)
        .port(server.port)
        .username(&server.username)
        .password(&server.password)
        .database(database)
        .ssl_mode(ssl_mode)
        .application_name("pgbranch")
        .options([(
            "statement_timeout",
            statement_timeout.as_millis().to_string(),
        )])
}

/// Create a new PostgreSQL connection pool with custom configuration.
pub async fn create_pool_with_config(
    options: PgConnectOptions,
    config: &PoolConfig,
) -> Result<PgPool> {
    let start = Instant::now();

    debug!(
        subsystem = "db",
        component = "pool",
        op = "create",
        db_name = options.get_database().unwrap_or_default(),
        max_connections = config.max_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        statement_timeout_secs = config.statement_timeout.as_secs(),
        "Creating database connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .connect_with(options)
        .await
        .map_err(Error::Database)?;

    debug!(
        subsystem = "db",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Open one unpooled connection to the administrative database.
///
/// Used for CREATE/DROP DATABASE, which must not run on a connection bound
/// to the database being created or dropped. Callers close it when done.
pub async fn connect_admin(server: &ServerConfig, config: &EngineConfig) -> Result<PgConnection> {
    let options = connect_options(server, &config.admin_database, config.statement_timeout);
    let connect = PgConnection::connect_with(&options);
    match tokio::time::timeout(config.connect_timeout, connect).await {
        Ok(conn) => conn.map_err(Error::Database),
        Err(_) => Err(Error::Database(sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!(
                "connecting to {} timed out after {}s",
                config.admin_database,
                config.connect_timeout.as_secs()
            ),
        )))),
    }
}

/// Registry key: one pool per server login and database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub database: String,
}

impl PoolKey {
    pub fn new(server: &ServerConfig, database: &str) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            username: server.username.clone(),
            database: database.to_string(),
        }
    }
}

/// A counted claim on a registry pool. Return it with [`PoolRegistry::release`].
#[derive(Debug)]
pub struct PoolLease {
    key: PoolKey,
    pool: PgPool,
}

impl PoolLease {
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }
}

struct RegistryEntry {
    pool: PgPool,
    leases: usize,
}

/// Reference-counted pools keyed by server login and database.
///
/// Owned by the surrounding service and shared with every engine. A pool is
/// opened on first lease and closed when its last lease is released, so a
/// target database never keeps connections once its clone has finished.
pub struct PoolRegistry {
    config: PoolConfig,
    pools: Mutex<HashMap<PoolKey, RegistryEntry>>,
}

impl PoolRegistry {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            pools: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self::new(PoolConfig::from_engine_config(config))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Lease the pool for `database`, opening it if needed.
    ///
    /// The registry lock is not held while a new pool connects, so a slow or
    /// unreachable database never stalls leases on other databases.
    pub async fn acquire(&self, server: &ServerConfig, database: &str) -> Result<PoolLease> {
        let key = PoolKey::new(server, database);
        if let Some(lease) = self.lease_existing(&key).await {
            return Ok(lease);
        }

        let options = connect_options(server, database, self.config.statement_timeout);
        let pool = create_pool_with_config(options, &self.config).await?;

        let mut pools = self.pools.lock().await;
        if let Some(entry) = pools.get_mut(&key) {
            if !entry.pool.is_closed() {
                // Another caller opened the same pool while we connected.
                entry.leases += 1;
                let existing = entry.pool.clone();
                drop(pools);
                pool.close().await;
                debug!(
                    subsystem = "db",
                    component = "pool",
                    db_name = %key.database,
                    "Discarded duplicate pool"
                );
                return Ok(PoolLease {
                    key,
                    pool: existing,
                });
            }
        }
        pools.insert(
            key.clone(),
            RegistryEntry {
                pool: pool.clone(),
                leases: 1,
            },
        );
        drop(pools);

        info!(
            subsystem = "db",
            component = "pool",
            op = "open",
            db_name = %key.database,
            "Opened pool"
        );
        Ok(PoolLease { key, pool })
    }

    /// Bump the lease count on an open pool for `key`, dropping a closed one.
    async fn lease_existing(&self, key: &PoolKey) -> Option<PoolLease> {
        let mut pools = self.pools.lock().await;
        let entry = pools.get_mut(key)?;
        if entry.pool.is_closed() {
            pools.remove(key);
            return None;
        }
        entry.leases += 1;
        Some(PoolLease {
            key: key.clone(),
            pool: entry.pool.clone(),
        })
    }

    /// Return a lease; closes the pool when no leases remain.
    pub async fn release(&self, lease: PoolLease) {
        let PoolLease { key, pool } = lease;
        let mut pools = self.pools.lock().await;

        let close = match pools.get_mut(&key) {
            Some(entry) => {
                entry.leases = entry.leases.saturating_sub(1);
                entry.leases == 0
            }
            None => true,
        };

        if close {
            pools.remove(&key);
            drop(pools);
            pool.close().await;
            info!(
                subsystem = "db",
                component = "pool",
                op = "close",
                db_name = %key.database,
                "Closed pool"
            );
        }
    }

    /// Number of outstanding leases for `database`.
    pub async fn lease_count(&self, server: &ServerConfig, database: &str) -> usize {
        let key = PoolKey::new(server, database);
        self.pools
            .lock()
            .await
            .get(&key)
            .map(|e| e.leases)
            .unwrap_or(0)
    }

    /// Close every pool. Outstanding leases keep working until they are
    /// released but new statements on them fail with `PoolClosed`.
    pub async fn close_all(&self) {
        let drained: Vec<(PoolKey, RegistryEntry)> = self.pools.lock().await.drain().collect();
        for (key, entry) in drained {
            if entry.leases > 0 {
                warn!(
                    subsystem = "db",
                    component = "pool",
                    db_name = %key.database,
                    leases = entry.leases,
                    "Closing pool with outstanding leases"
                );
            }
            entry.pool.close().await;
        }
    }
}
