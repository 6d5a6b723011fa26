//! Centralized default constants for pgbranch.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration falls back to these when the environment does not override
//! them.

// =============================================================================
// DATA COPY
// =============================================================================

/// Rows per multi-row INSERT during data copy.
pub const BATCH_SIZE: usize = 1000;

/// PostgreSQL's hard limit on bind parameters in a single statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

// =============================================================================
// CONNECTIONS
// =============================================================================

/// Per-statement timeout. Bounds worst-case blocking for a single DDL
/// statement or batch insert.
pub const STATEMENT_TIMEOUT_SECS: u64 = 300;

/// Timeout for establishing a connection or acquiring one from a pool.
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Maximum connections in each leased pool. Clones are sequential, so a
/// lease rarely holds more than two.
pub const POOL_MAX_CONNECTIONS: u32 = 5;

/// Idle timeout for leased pool connections.
pub const POOL_IDLE_TIMEOUT_SECS: u64 = 600;

/// Administrative database used for CREATE/DROP DATABASE.
pub const ADMIN_DATABASE: &str = "postgres";

/// Attempts at DROP DATABASE while the database is still in use.
pub const DROP_DATABASE_ATTEMPTS: u32 = 10;

/// Pause between DROP DATABASE attempts.
pub const DROP_DATABASE_RETRY_MS: u64 = 200;

/// Default PostgreSQL port.
pub const POSTGRES_PORT: u16 = 5432;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// PostgreSQL identifier length limit (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LEN: usize = 63;
