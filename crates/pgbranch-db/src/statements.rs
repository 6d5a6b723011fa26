//! Best-effort statement execution.
//!
//! DDL, sequence and foreign key statements are applied one at a time and a
//! failing statement is recorded as skipped instead of aborting the clone.
//! Losing the connection itself is never recoverable and is propagated.

use sqlx::PgPool;
use tracing::{debug, warn};

use pgbranch_core::{Error, Result, StatementOutcome, StatementPhase, StatementRecord};

/// Whether `err` means the session is gone rather than one statement failing.
///
/// Covers transport failures, closed or exhausted pools, and server-side
/// connection exceptions (SQLSTATE class 08) and shutdowns (57P01..57P03).
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code.starts_with("08") || matches!(&*code, "57P01" | "57P02" | "57P03"))
            .unwrap_or(false),
        _ => false,
    }
}

/// Classify a statement failure: connection loss is fatal, anything else
/// becomes a skip reason.
pub fn classify_failure(err: sqlx::Error) -> Result<String> {
    if is_connection_error(&err) {
        Err(Error::Database(err))
    } else {
        Ok(err.to_string())
    }
}

/// Execute one statement and describe what happened.
pub async fn apply_statement(
    pool: &PgPool,
    phase: StatementPhase,
    statement: &str,
) -> Result<StatementRecord> {
    let outcome = match sqlx::query(statement).persistent(false).execute(pool).await {
        Ok(_) => {
            debug!(
                subsystem = "clone",
                component = "statements",
                phase = ?phase,
                statement,
                "Applied statement"
            );
            StatementOutcome::Applied
        }
        Err(e) => {
            let reason = classify_failure(e)?;
            warn!(
                subsystem = "clone",
                component = "statements",
                phase = ?phase,
                statement,
                error = %reason,
                "Skipped statement"
            );
            StatementOutcome::Skipped { reason }
        }
    };

    Ok(StatementRecord {
        phase,
        statement: statement.to_string(),
        outcome,
    })
}

/// Execute statements in order, continuing past individual failures.
pub async fn apply_best_effort<I, S>(
    pool: &PgPool,
    phase: StatementPhase,
    statements: I,
) -> Result<Vec<StatementRecord>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records = Vec::new();
    for statement in statements {
        records.push(apply_statement(pool, phase, statement.as_ref()).await?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_are_connection_errors() {
        let io = sqlx::Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(is_connection_error(&io));
        assert!(is_connection_error(&sqlx::Error::PoolClosed));
        assert!(is_connection_error(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn test_row_errors_are_not_connection_errors() {
        assert!(!is_connection_error(&sqlx::Error::RowNotFound));
        assert!(!is_connection_error(&sqlx::Error::ColumnNotFound(
            "x".to_string()
        )));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure(sqlx::Error::PoolClosed),
            Err(Error::Database(sqlx::Error::PoolClosed))
        ));
        let reason = classify_failure(sqlx::Error::RowNotFound).unwrap();
        assert!(!reason.is_empty());
    }
}
