//! Deferred constraint application.
//!
//! Foreign keys are added only once every table holds its data, so their
//! validation runs against the final row set. Check constraints the source
//! never validated are re-added `NOT VALID` at the same point, so legacy rows
//! that violate them still load. Each constraint is applied on its own; one
//! that cannot be added (missing referenced rows, a table that failed to
//! create) is recorded and the rest still go in.

use sqlx::PgPool;
use tracing::info;

use pgbranch_core::{Result, StatementPhase, StatementRecord};

use crate::statements::apply_best_effort;

/// Apply `statements`, one `ALTER TABLE ... ADD CONSTRAINT` each.
pub async fn apply_foreign_keys(
    target: &PgPool,
    statements: &[String],
) -> Result<Vec<StatementRecord>> {
    let records = apply_best_effort(target, StatementPhase::ForeignKey, statements).await?;

    info!(
        subsystem = "clone",
        component = "foreign_keys",
        op = "apply",
        statement_count = records.len(),
        skipped_count = skipped(&records),
        "Foreign keys applied"
    );
    Ok(records)
}

/// Apply `NOT VALID` check constraints, one `ALTER TABLE` each.
pub async fn apply_unvalidated_checks(
    target: &PgPool,
    statements: &[String],
) -> Result<Vec<StatementRecord>> {
    let records = apply_best_effort(target, StatementPhase::Constraint, statements).await?;

    if !records.is_empty() {
        info!(
            subsystem = "clone",
            component = "foreign_keys",
            op = "apply_unvalidated_checks",
            statement_count = records.len(),
            skipped_count = skipped(&records),
            "Unvalidated check constraints applied"
        );
    }
    Ok(records)
}

fn skipped(records: &[StatementRecord]) -> usize {
    records.iter().filter(|r| !r.outcome.is_applied()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgbranch_core::StatementOutcome;

    #[test]
    fn test_skipped_counts_only_skips() {
        let records = vec![
            StatementRecord {
                phase: StatementPhase::ForeignKey,
                statement: "ALTER TABLE a".to_string(),
                outcome: StatementOutcome::Applied,
            },
            StatementRecord {
                phase: StatementPhase::ForeignKey,
                statement: "ALTER TABLE b".to_string(),
                outcome: StatementOutcome::Skipped {
                    reason: "violates foreign key constraint".to_string(),
                },
            },
        ];
        assert_eq!(skipped(&records), 1);
    }
}
