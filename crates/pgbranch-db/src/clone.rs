//! Clone orchestration.
//!
//! [`PgCloneEngine`] runs one clone through its fixed phases:
//!
//! ```text
//! Creating -> Introspecting -> ApplyingDdl
//!          -> [CopyingData -> ResyncingSequences]   (full mode only)
//!          -> ApplyingForeignKeys -> Succeeded
//! ```
//!
//! Statement-level failures inside the later phases are recorded in the
//! [`CloneReport`] and never fail the clone. A failure that escapes a phase
//! moves the clone to `Failed`: both pool leases are released, the target
//! database is dropped, and the original error is returned.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{error, info, instrument, Span};
use uuid::Uuid;

use pgbranch_core::logging::redact_connection_string;
use pgbranch_core::{
    CloneEngine, CloneReport, CloneRequest, CloneResult, CloneState, EngineConfig, Error, Result,
    ServerConfig, StatementPhase,
};

use crate::cleanup::{create_database, drop_database};
use crate::copy::DataCopier;
use crate::ddl::synthesize;
use crate::foreign_keys::{apply_foreign_keys, apply_unvalidated_checks};
use crate::identifiers::validate_request;
use crate::introspect::Introspector;
use crate::pool::{PoolLease, PoolRegistry};
use crate::sequences::resync_sequences;
use crate::statements::apply_best_effort;

/// PostgreSQL implementation of [`CloneEngine`].
pub struct PgCloneEngine {
    registry: Arc<PoolRegistry>,
    config: EngineConfig,
}

impl PgCloneEngine {
    pub fn new(registry: Arc<PoolRegistry>, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Everything after the target exists, on leased pools.
    async fn run_phases(
        &self,
        source: &PgPool,
        target: &PgPool,
        request: &CloneRequest,
        progress: &mut Progress,
    ) -> Result<()> {
        progress.enter(CloneState::Introspecting);
        let snapshot = Introspector::new(source)
            .snapshot()
            .await
            .map_err(|e| Error::Introspection {
                database: request.source_database.clone(),
                message: e.to_string(),
            })?;

        progress.enter(CloneState::ApplyingDdl);
        let plan = synthesize(&snapshot);
        let ddl =
            apply_best_effort(target, StatementPhase::Ddl, plan.structure_statements()).await?;
        progress.report.extend(ddl);

        if request.mode.copies_data() {
            progress.enter(CloneState::CopyingData);
            let copier = DataCopier::new(source, target, self.config.batch_size);
            let copied = copier.copy_all(&snapshot.tables, request).await?;
            progress.report.tables.extend(copied.tables);
            progress.report.extend(copied.records);

            progress.enter(CloneState::ResyncingSequences);
            let sequences = resync_sequences(target, &snapshot.sequences).await?;
            progress.report.extend(sequences);
        }

        progress.enter(CloneState::ApplyingForeignKeys);
        let checks = apply_unvalidated_checks(target, &plan.unvalidated_checks).await?;
        progress.report.extend(checks);
        let foreign_keys = apply_foreign_keys(target, &plan.foreign_keys).await?;
        progress.report.extend(foreign_keys);

        Ok(())
    }

    /// Lease both pools and run the phases, releasing the leases on every path.
    async fn run_leased(
        &self,
        server: &ServerConfig,
        request: &CloneRequest,
        progress: &mut Progress,
    ) -> Result<()> {
        let target = self
            .registry
            .acquire(server, &request.target_database)
            .await?;
        let source = match self
            .registry
            .acquire(server, &request.source_database)
            .await
        {
            Ok(lease) => lease,
            Err(e) => {
                self.registry.release(target).await;
                return Err(e);
            }
        };

        let result = self
            .run_phases(source.pool(), target.pool(), request, progress)
            .await;

        self.release_all(source, target).await;
        result
    }

    async fn release_all(&self, source: PoolLease, target: PoolLease) {
        // Target first: DROP DATABASE fails while its pool holds connections.
        self.registry.release(target).await;
        self.registry.release(source).await;
    }

    /// Drop the half-built target. A failed drop is logged, not returned.
    async fn cleanup(&self, server: &ServerConfig, request: &CloneRequest) {
        if let Err(e) = drop_database(server, &self.config, &request.target_database).await {
            error!(
                subsystem = "clone",
                component = "orchestrator",
                op = "cleanup",
                db_name = %request.target_database,
                error = %e,
                "Target database left behind after failed clone"
            );
        }
    }
}

#[async_trait]
impl CloneEngine for PgCloneEngine {
    #[instrument(
        skip(self, server, request),
        fields(
            subsystem = "clone",
            component = "orchestrator",
            clone_id = tracing::field::Empty,
            source = %request.source_database,
            target = %request.target_database,
            mode = %request.mode,
        )
    )]
    async fn clone_database(
        &self,
        server: &ServerConfig,
        request: &CloneRequest,
    ) -> Result<CloneResult> {
        validate_request(request)?;
        self.config.validate()?;

        let clone_id = Uuid::now_v7();
        Span::current().record("clone_id", tracing::field::display(clone_id));
        let mut progress = Progress::new(clone_id);
        info!(table_options = request.table_options.len(), "Clone started");

        if let Err(e) = create_database(server, &self.config, &request.target_database).await {
            // The name may belong to someone else; never drop what we did not create.
            progress.fail(&e);
            return Err(e);
        }

        if let Err(e) = self.run_leased(server, request, &mut progress).await {
            progress.fail(&e);
            self.cleanup(server, request).await;
            return Err(e);
        }

        progress.enter(CloneState::Succeeded);
        let report = progress.finish();
        let connection_string = server.connection_string(&request.target_database);

        info!(
            connection = %redact_connection_string(&connection_string),
            row_count = report.total_rows_copied(),
            statement_count = report.statements.len(),
            skipped_count = report
                .statements
                .iter()
                .filter(|r| !r.outcome.is_applied())
                .count(),
            "Clone succeeded"
        );

        Ok(CloneResult {
            success: true,
            connection_string,
            report,
        })
    }
}

/// Report under construction plus phase timing.
struct Progress {
    report: CloneReport,
    started: Instant,
    phase_started: Instant,
}

impl Progress {
    fn new(clone_id: Uuid) -> Self {
        let now = Instant::now();
        Self {
            report: CloneReport::new(clone_id),
            started: now,
            phase_started: now,
        }
    }

    fn enter(&mut self, state: CloneState) {
        let previous = self.report.state;
        info!(
            subsystem = "clone",
            component = "orchestrator",
            from = %previous,
            to = %state,
            phase_ms = self.phase_started.elapsed().as_millis() as u64,
            duration_ms = self.started.elapsed().as_millis() as u64,
            "Clone state changed"
        );
        self.report.state = state;
        self.phase_started = Instant::now();
    }

    fn fail(&mut self, err: &Error) {
        error!(
            subsystem = "clone",
            component = "orchestrator",
            state = %self.report.state,
            duration_ms = self.started.elapsed().as_millis() as u64,
            error = %err,
            "Clone failed"
        );
        self.report.state = CloneState::Failed;
        self.report.finished_at = Some(Utc::now());
    }

    fn finish(mut self) -> CloneReport {
        self.report.finished_at = Some(Utc::now());
        self.report
    }
}
