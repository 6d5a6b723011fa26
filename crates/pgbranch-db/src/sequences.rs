//! Sequence resynchronization.
//!
//! After the data load, every source sequence that has been used is advanced
//! on the target to its source `last_value`, so the next generated value
//! follows the copied rows. Identity sequences are located through their
//! owning column because the target names them itself.

use sqlx::PgPool;
use tracing::{info, warn};

use pgbranch_core::{Result, StatementOutcome, StatementPhase, StatementRecord};

use crate::identifiers::{qualified_name, quote_literal};
use crate::introspect::SequenceInfo;
use crate::statements::classify_failure;

/// How to address a sequence on the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetvalTarget {
    /// A named sequence, `"schema"."name"`.
    Sequence(String),
    /// The identity sequence behind a column.
    IdentityColumn { table: String, column: String },
}

impl SetvalTarget {
    pub fn for_sequence(seq: &SequenceInfo) -> Self {
        match (&seq.owner, seq.identity) {
            (Some(owner), true) => SetvalTarget::IdentityColumn {
                table: qualified_name(&owner.schema, &owner.table),
                column: owner.column.clone(),
            },
            _ => SetvalTarget::Sequence(qualified_name(&seq.schema, &seq.name)),
        }
    }

    /// Statement text as recorded in the report.
    pub fn describe(&self, last_value: i64) -> String {
        match self {
            SetvalTarget::Sequence(name) => format!(
                "SELECT setval({}, {}, true)",
                quote_literal(name),
                last_value
            ),
            SetvalTarget::IdentityColumn { table, column } => format!(
                "SELECT setval(pg_get_serial_sequence({}, {}), {}, true)",
                quote_literal(table),
                quote_literal(column),
                last_value
            ),
        }
    }
}

async fn setval(
    pool: &PgPool,
    target: &SetvalTarget,
    last_value: i64,
) -> std::result::Result<(), sqlx::Error> {
    match target {
        SetvalTarget::Sequence(name) => {
            sqlx::query("SELECT setval($1::regclass, $2, true)")
                .bind(name)
                .bind(last_value)
                .execute(pool)
                .await?;
        }
        SetvalTarget::IdentityColumn { table, column } => {
            sqlx::query("SELECT setval(pg_get_serial_sequence($1, $2), $3, true)")
                .bind(table)
                .bind(column)
                .bind(last_value)
                .execute(pool)
                .await?;
        }
    }
    Ok(())
}

/// Advance target sequences to their source values.
///
/// Sequences never used on the source are left at their start value. A
/// failing sequence is recorded and skipped.
pub async fn resync_sequences(
    target: &PgPool,
    sequences: &[SequenceInfo],
) -> Result<Vec<StatementRecord>> {
    let mut records = Vec::new();

    for seq in sequences {
        let Some(last_value) = seq.last_value else {
            continue;
        };
        let setval_target = SetvalTarget::for_sequence(seq);
        let statement = setval_target.describe(last_value);

        let outcome = match setval(target, &setval_target, last_value).await {
            Ok(()) => StatementOutcome::Applied,
            Err(e) => {
                let reason = classify_failure(e)?;
                warn!(
                    subsystem = "clone",
                    component = "sequences",
                    sequence = %qualified_name(&seq.schema, &seq.name),
                    error = %reason,
                    "Skipped sequence resync"
                );
                StatementOutcome::Skipped { reason }
            }
        };

        records.push(StatementRecord {
            phase: StatementPhase::Sequence,
            statement,
            outcome,
        });
    }

    info!(
        subsystem = "clone",
        component = "sequences",
        op = "resync",
        statement_count = records.len(),
        skipped_count = records.iter().filter(|r| !r.outcome.is_applied()).count(),
        "Sequences resynchronized"
    );
    Ok(records)
}
