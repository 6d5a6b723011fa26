//! Core traits for pgbranch abstractions.
//!
//! The surrounding service talks to the clone engine only through
//! [`CloneEngine`], so handlers can be tested against a stand-in.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{CloneRequest, CloneResult, ServerConfig};

/// Branches one database on a server into a new, independent database.
#[async_trait]
pub trait CloneEngine: Send + Sync {
    /// Clone `request.source_database` into `request.target_database`.
    ///
    /// On success the target exists and the result carries its connection
    /// string, even when some best-effort statements were skipped. A target
    /// this call created is dropped again before an error is returned.
    ///
    /// # Arguments
    /// * `server` - Resolved server-level connection parameters
    /// * `request` - Source, target, mode and per-table options
    async fn clone_database(
        &self,
        server: &ServerConfig,
        request: &CloneRequest,
    ) -> Result<CloneResult>;
}
