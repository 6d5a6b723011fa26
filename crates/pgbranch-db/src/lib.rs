//! # pgbranch-db
//!
//! PostgreSQL clone/branch engine for pgbranch.
//!
//! This crate provides:
//! - A reference-counted pool registry owned by the surrounding service
//! - Catalog introspection into a structural snapshot
//! - DDL synthesis with deferred foreign keys
//! - Batched, trigger-free data copy with per-table row limits
//! - Sequence resynchronization and best-effort foreign key application
//! - Target database creation and cleanup on failure
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pgbranch_db::{
//!     CloneEngine, CloneMode, CloneRequest, EngineConfig, PgCloneEngine, PoolRegistry,
//!     ServerConfig, TableOption,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::from_env()?;
//!     let registry = Arc::new(PoolRegistry::from_engine_config(&config));
//!     let engine = PgCloneEngine::new(registry.clone(), config);
//!
//!     let server = ServerConfig::new("localhost", 5432, "postgres", "secret");
//!     let request = CloneRequest::new("app", "app_dev", CloneMode::Full).with_table_options(vec![
//!         TableOption::include("public", "users").with_row_limit(100),
//!         TableOption::exclude("public", "logs"),
//!     ]);
//!
//!     let result = engine.clone_database(&server, &request).await?;
//!     println!("Branch ready: {}", result.connection_string);
//!
//!     registry.close_all().await;
//!     Ok(())
//! }
//! ```
pub mod cleanup;
pub mod clone;
pub mod copy;
pub mod ddl;
pub mod foreign_keys;
pub mod identifiers;
pub mod introspect;
pub mod pool;
pub mod sequences;
pub mod statements;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use pgbranch_core::*;

pub use cleanup::{create_database, database_exists, drop_database, target_exists};
pub use clone::PgCloneEngine;
pub use copy::{DataCopier, ReplicaSession};
pub use ddl::{synthesize, DdlPlan};
pub use identifiers::{qualified_name, quote_ident, quote_literal, validate_database_name};
pub use introspect::{Introspector, SchemaSnapshot};
pub use pool::{PoolConfig, PoolLease, PoolRegistry};
