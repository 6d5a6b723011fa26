//! # pgbranch-core
//!
//! Core types, traits, and configuration for pgbranch, the database
//! branch/clone engine.
//!
//! This crate provides the request/result types exchanged with the
//! surrounding service, the error taxonomy, configuration, and the
//! [`CloneEngine`] trait implemented by `pgbranch-db`.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
