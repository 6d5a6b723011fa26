//! Data copy.
//!
//! Streams each selected table from the source and writes it to the target
//! in multi-row `INSERT ... ON CONFLICT DO NOTHING` batches. Values travel as
//! text and are cast back to the column's type expression on insert.
//!
//! All inserts run on one target session with `session_replication_role`
//! set to `replica`, so triggers (including foreign key triggers) do not
//! fire during the load. [`ReplicaSession`] restores the default role when
//! the copy finishes, and discards the connection if it is dropped early.
//!
//! Each table is copied inside its own transaction on that session. A table
//! either lands whole or, when a batch fails, not at all.

use std::time::Instant;

use futures::TryStreamExt;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgArguments;
use sqlx::{Arguments, Connection, PgConnection, PgPool, Postgres, Row};
use tracing::{debug, info, trace, warn};

use pgbranch_core::defaults::MAX_BIND_PARAMS;
use pgbranch_core::{
    CloneRequest, Error, Result, StatementOutcome, StatementPhase, StatementRecord,
    TableCopyStats, TableSelection,
};

use crate::identifiers::quote_ident;
use crate::introspect::{ColumnDescriptor, TableInfo};
use crate::statements::{classify_failure, is_connection_error};

const ENABLE_REPLICA_ROLE: &str = "SET session_replication_role = replica";
const RESTORE_DEFAULT_ROLE: &str = "SET session_replication_role = DEFAULT";

/// A target connection with referential enforcement switched off.
pub struct ReplicaSession {
    conn: PoolConnection<Postgres>,
    replica: bool,
    finished: bool,
}

impl ReplicaSession {
    /// Lease a target connection and switch it to replica mode.
    ///
    /// Switching requires superuser rights. Without them the session still
    /// works, triggers stay enabled, and the refusal is returned as a skipped
    /// record so the report shows it.
    pub async fn enter(pool: &PgPool) -> Result<(Self, StatementRecord)> {
        let mut conn = pool.acquire().await.map_err(Error::Database)?;

        let outcome = match sqlx::query(ENABLE_REPLICA_ROLE)
            .persistent(false)
            .execute(&mut *conn)
            .await
        {
            Ok(_) => StatementOutcome::Applied,
            Err(e) => {
                let reason = classify_failure(e)?;
                warn!(
                    subsystem = "clone",
                    component = "copy",
                    error = %reason,
                    "Could not disable triggers for bulk load, continuing with them enabled"
                );
                StatementOutcome::Skipped { reason }
            }
        };

        let replica = outcome.is_applied();
        Ok((
            Self {
                conn,
                replica,
                finished: false,
            },
            StatementRecord {
                phase: StatementPhase::Data,
                statement: ENABLE_REPLICA_ROLE.to_string(),
                outcome,
            },
        ))
    }

    pub fn is_replica(&self) -> bool {
        self.replica
    }

    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Restore default enforcement and hand the connection back to the pool.
    pub async fn exit(mut self) -> Result<()> {
        if self.replica {
            let restored = sqlx::query(RESTORE_DEFAULT_ROLE)
                .persistent(false)
                .execute(&mut *self.conn)
                .await;
            if let Err(e) = restored {
                // Keep the session out of the pool rather than leak replica mode.
                self.conn.close_on_drop();
                self.finished = true;
                return Err(Error::Database(e));
            }
        }
        self.finished = true;
        Ok(())
    }
}

impl Drop for ReplicaSession {
    fn drop(&mut self) {
        if !self.finished && self.replica {
            warn!(
                subsystem = "clone",
                component = "copy",
                "Replica session dropped without restore, discarding connection"
            );
            self.conn.close_on_drop();
        }
    }
}

/// Rows per INSERT for a table of `column_count` columns.
///
/// Caps `batch_size` so one statement stays within the bind parameter limit.
pub fn effective_batch_size(batch_size: usize, column_count: usize) -> usize {
    if column_count == 0 {
        return batch_size.max(1);
    }
    batch_size.min(MAX_BIND_PARAMS / column_count).max(1)
}

/// `SELECT "a"::text, ... FROM "s"."t" [LIMIT n]`
pub fn build_select(
    table: &TableInfo,
    columns: &[&ColumnDescriptor],
    row_limit: Option<i64>,
) -> String {
    let select_list: Vec<String> = columns
        .iter()
        .map(|c| format!("{}::text", quote_ident(&c.name)))
        .collect();

    let mut sql = format!(
        "SELECT {} FROM {}",
        select_list.join(", "),
        table.qualified_name()
    );
    if let Some(limit) = row_limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    sql
}

/// Multi-row INSERT with one typed placeholder per value.
pub fn build_insert(table: &TableInfo, columns: &[&ColumnDescriptor], rows: usize) -> String {
    let column_list: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();

    let mut values = Vec::with_capacity(rows);
    let mut param = 1;
    for _ in 0..rows {
        let row: Vec<String> = columns
            .iter()
            .map(|c| {
                let placeholder = format!("${}::{}", param, c.data_type);
                param += 1;
                placeholder
            })
            .collect();
        values.push(format!("({})", row.join(", ")));
    }

    let overriding = if table.has_always_identity() {
        " OVERRIDING SYSTEM VALUE"
    } else {
        ""
    };

    format!(
        "INSERT INTO {} ({}){} VALUES {} ON CONFLICT DO NOTHING",
        table.qualified_name(),
        column_list.join(", "),
        overriding,
        values.join(", ")
    )
}

async fn insert_batch(
    conn: &mut PgConnection,
    table: &TableInfo,
    columns: &[&ColumnDescriptor],
    batch: &[Vec<Option<String>>],
) -> std::result::Result<u64, sqlx::Error> {
    let sql = build_insert(table, columns, batch.len());

    let mut args = PgArguments::default();
    for row in batch {
        for value in row {
            args.add(value.as_deref()).map_err(sqlx::Error::Encode)?;
        }
    }

    let result = sqlx::query_with(&sql, args)
        .persistent(false)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Copy one table in a single transaction, returning the number of rows
/// inserted.
///
/// Rows already present on the target are skipped by `ON CONFLICT DO
/// NOTHING` and not counted. On error every batch of this table is rolled
/// back, so the target holds none of its rows.
pub async fn copy_table(
    source: &PgPool,
    target: &mut PgConnection,
    table: &TableInfo,
    row_limit: Option<i64>,
    batch_size: usize,
) -> std::result::Result<u64, sqlx::Error> {
    let mut tx = target.begin().await?;

    match stream_table(source, &mut *tx, table, row_limit, batch_size).await {
        Ok(inserted) => {
            tx.commit().await?;
            Ok(inserted)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                if is_connection_error(&rollback) {
                    return Err(rollback);
                }
                warn!(
                    subsystem = "clone",
                    component = "copy",
                    db_table = %table.qualified_name(),
                    error = %rollback,
                    "Rollback after failed copy did not complete"
                );
            }
            Err(e)
        }
    }
}

async fn stream_table(
    source: &PgPool,
    target: &mut PgConnection,
    table: &TableInfo,
    row_limit: Option<i64>,
    batch_size: usize,
) -> std::result::Result<u64, sqlx::Error> {
    let columns: Vec<&ColumnDescriptor> = table.insertable_columns().collect();
    if columns.is_empty() {
        return Ok(0);
    }

    let rows_per_batch = effective_batch_size(batch_size, columns.len());
    let select = build_select(table, &columns, row_limit);

    let mut stream = sqlx::query(&select).persistent(false).fetch(source);
    let mut batch: Vec<Vec<Option<String>>> = Vec::with_capacity(rows_per_batch);
    let mut inserted = 0u64;
    let mut batches = 0usize;

    while let Some(row) = stream.try_next().await? {
        let values = (0..columns.len())
            .map(|i| row.try_get::<Option<String>, _>(i))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        batch.push(values);

        if batch.len() == rows_per_batch {
            inserted += insert_batch(target, table, &columns, &batch).await?;
            batches += 1;
            trace!(
                subsystem = "clone",
                component = "copy",
                db_table = %table.qualified_name(),
                batch = batches,
                row_count = inserted,
                "Inserted batch"
            );
            batch.clear();
        }
    }

    if !batch.is_empty() {
        inserted += insert_batch(target, table, &columns, &batch).await?;
    }

    Ok(inserted)
}

/// Output of a data copy run.
#[derive(Debug, Default)]
pub struct CopyOutcome {
    pub tables: Vec<TableCopyStats>,
    pub records: Vec<StatementRecord>,
}

/// Copies the tables a request selects from source to target.
pub struct DataCopier<'a> {
    source: &'a PgPool,
    target: &'a PgPool,
    batch_size: usize,
}

impl<'a> DataCopier<'a> {
    pub fn new(source: &'a PgPool, target: &'a PgPool, batch_size: usize) -> Self {
        Self {
            source,
            target,
            batch_size,
        }
    }

    /// Copy every table `request` selects, in the order given.
    ///
    /// A table that fails is recorded and skipped; only losing a connection
    /// aborts the run.
    pub async fn copy_all(
        &self,
        tables: &[TableInfo],
        request: &CloneRequest,
    ) -> Result<CopyOutcome> {
        let start = Instant::now();
        let (mut session, role_record) = ReplicaSession::enter(self.target).await?;

        let mut outcome = CopyOutcome::default();
        outcome.records.push(role_record);

        let copied = self
            .copy_selected(&mut session, tables, request, &mut outcome)
            .await;
        let restored = session.exit().await;
        copied?;
        restored?;

        info!(
            subsystem = "clone",
            component = "copy",
            op = "copy_all",
            tables = outcome.tables.len(),
            row_count = outcome.tables.iter().map(|t| t.rows_copied).sum::<u64>(),
            skipped_count = outcome.tables.iter().filter(|t| t.skipped.is_some()).count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Data copy finished"
        );
        Ok(outcome)
    }

    async fn copy_selected(
        &self,
        session: &mut ReplicaSession,
        tables: &[TableInfo],
        request: &CloneRequest,
        outcome: &mut CopyOutcome,
    ) -> Result<()> {
        for table in tables {
            let row_limit = match request.selection_for(&table.schema, &table.name) {
                TableSelection::Copy { row_limit } => row_limit,
                TableSelection::Skip => {
                    debug!(
                        subsystem = "clone",
                        component = "copy",
                        db_table = %table.qualified_name(),
                        "Table not selected, leaving empty"
                    );
                    continue;
                }
            };

            let columns: Vec<&ColumnDescriptor> = table.insertable_columns().collect();
            let statement = build_select(table, &columns, row_limit);

            let copied = copy_table(
                self.source,
                session.conn(),
                table,
                row_limit,
                self.batch_size,
            )
            .await;
            match copied {
                Ok(rows) => {
                    debug!(
                        subsystem = "clone",
                        component = "copy",
                        db_table = %table.qualified_name(),
                        row_count = rows,
                        "Copied table"
                    );
                    outcome.tables.push(TableCopyStats {
                        schema: table.schema.clone(),
                        table: table.name.clone(),
                        rows_copied: rows,
                        skipped: None,
                    });
                    outcome.records.push(StatementRecord {
                        phase: StatementPhase::Data,
                        statement,
                        outcome: StatementOutcome::Applied,
                    });
                }
                Err(e) if is_connection_error(&e) => return Err(Error::Database(e)),
                Err(e) => {
                    let reason = e.to_string();
                    warn!(
                        subsystem = "clone",
                        component = "copy",
                        db_table = %table.qualified_name(),
                        error = %reason,
                        "Skipped table"
                    );
                    outcome.tables.push(TableCopyStats {
                        schema: table.schema.clone(),
                        table: table.name.clone(),
                        rows_copied: 0,
                        skipped: Some(reason.clone()),
                    });
                    outcome.records.push(StatementRecord {
                        phase: StatementPhase::Data,
                        statement,
                        outcome: StatementOutcome::Skipped { reason },
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::IdentityGeneration;

    fn column(name: &str, data_type: &str) -> ColumnDescriptor {
        ColumnDescriptor {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            default: None,
            identity: None,
            generated: None,
        }
    }

    fn users() -> TableInfo {
        TableInfo {
            schema: "public".to_string(),
            name: "users".to_string(),
            columns: vec![
                column("id", "integer"),
                column("mood", "\"public\".\"mood\""),
                ColumnDescriptor {
                    generated: Some("(id * 2)".to_string()),
                    ..column("double_id", "integer")
                },
            ],
        }
    }

    #[test]
    fn test_effective_batch_size() {
        assert_eq!(effective_batch_size(1000, 3), 1000);
        assert_eq!(effective_batch_size(1000, 100), 655);
        assert_eq!(effective_batch_size(1000, 1600), 40);
        assert_eq!(effective_batch_size(0, 3), 1);
        assert_eq!(effective_batch_size(10, 0), 10);
    }

    #[test]
    fn test_build_select_with_limit() {
        let table = users();
        let columns: Vec<&ColumnDescriptor> = table.insertable_columns().collect();
        assert_eq!(
            build_select(&table, &columns, Some(100)),
            "SELECT \"id\"::text, \"mood\"::text FROM \"public\".\"users\" LIMIT 100"
        );
        assert_eq!(
            build_select(&table, &columns, None),
            "SELECT \"id\"::text, \"mood\"::text FROM \"public\".\"users\""
        );
    }

    #[test]
    fn test_build_insert_multi_row() {
        let table = users();
        let columns: Vec<&ColumnDescriptor> = table.insertable_columns().collect();
        assert_eq!(
            build_insert(&table, &columns, 2),
            "INSERT INTO \"public\".\"users\" (\"id\", \"mood\") VALUES \
             ($1::integer, $2::\"public\".\"mood\"), ($3::integer, $4::\"public\".\"mood\") \
             ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn test_build_insert_overrides_always_identity() {
        let mut table = users();
        table.columns[0].identity = Some(IdentityGeneration::Always);
        let columns: Vec<&ColumnDescriptor> = table.insertable_columns().collect();
        assert!(build_insert(&table, &columns, 1)
            .contains("(\"id\", \"mood\") OVERRIDING SYSTEM VALUE VALUES"));

        table.columns[0].identity = Some(IdentityGeneration::ByDefault);
        let columns: Vec<&ColumnDescriptor> = table.insertable_columns().collect();
        assert!(!build_insert(&table, &columns, 1).contains("OVERRIDING"));
    }
}
