//! Schema introspection.
//!
//! Reads a source database's catalog into a [`SchemaSnapshot`]: user schemas,
//! enum types, sequences, tables with normalized column types, primary key /
//! unique / check constraints, foreign keys and plain indexes.
//!
//! Introspection only reads. Any catalog query failure is returned to the
//! caller unchanged.

use std::collections::HashMap;
use std::time::Instant;

use regex::Regex;
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use pgbranch_core::{Error, Result};

use crate::identifiers::qualified_name;

// =============================================================================
// SNAPSHOT TYPES
// =============================================================================

/// Structural snapshot of one source database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaSnapshot {
    /// Non-system schemas, sorted.
    pub schemas: Vec<String>,
    pub enums: Vec<EnumType>,
    pub sequences: Vec<SequenceInfo>,
    /// Base tables ordered by schema, then name.
    pub tables: Vec<TableInfo>,
    /// Primary key, unique and check constraints.
    pub constraints: Vec<ConstraintInfo>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// Indexes not backing a primary key or unique constraint.
    pub indexes: Vec<IndexInfo>,
}

impl SchemaSnapshot {
    pub fn table(&self, schema: &str, name: &str) -> Option<&TableInfo> {
        self.tables
            .iter()
            .find(|t| t.schema == schema && t.name == name)
    }

    pub fn enum_type(&self, schema: &str, name: &str) -> Option<&EnumType> {
        self.enums
            .iter()
            .find(|e| e.schema == schema && e.name == name)
    }

    pub fn constraints_for<'a>(
        &'a self,
        table: &'a TableInfo,
    ) -> impl Iterator<Item = &'a ConstraintInfo> + 'a {
        self.constraints
            .iter()
            .filter(move |c| c.schema == table.schema && c.table == table.name)
    }

    /// The identity sequence behind `schema.table.column`, if any.
    pub fn identity_sequence(
        &self,
        schema: &str,
        table: &str,
        column: &str,
    ) -> Option<&SequenceInfo> {
        self.sequences.iter().find(|s| {
            s.identity
                && s.owner.as_ref().is_some_and(|o| {
                    o.schema == schema && o.table == table && o.column == column
                })
        })
    }
}

/// An enum type with its labels in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
    pub schema: String,
    pub name: String,
    pub labels: Vec<String>,
}

/// Column that owns a sequence (serial or identity).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceOwner {
    pub schema: String,
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceInfo {
    pub schema: String,
    pub name: String,
    /// `smallint`, `integer` or `bigint`.
    pub data_type: String,
    pub start_value: i64,
    pub increment_by: i64,
    pub min_value: i64,
    pub max_value: i64,
    pub cache_size: i64,
    pub cycle: bool,
    /// `None` until the sequence has been used.
    pub last_value: Option<i64>,
    pub owner: Option<SequenceOwner>,
    /// Created implicitly by a `GENERATED ... AS IDENTITY` column.
    pub identity: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityGeneration {
    Always,
    ByDefault,
}

impl IdentityGeneration {
    pub fn as_sql(self) -> &'static str {
        match self {
            IdentityGeneration::Always => "GENERATED ALWAYS AS IDENTITY",
            IdentityGeneration::ByDefault => "GENERATED BY DEFAULT AS IDENTITY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Normalized type expression, usable both in DDL and as a cast target.
    pub data_type: String,
    pub nullable: bool,
    /// Default expression with enum casts schema-qualified.
    pub default: Option<String>,
    pub identity: Option<IdentityGeneration>,
    /// Expression of a stored generated column.
    pub generated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl TableInfo {
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.schema, &self.name)
    }

    /// Columns that accept inserted values (stored generated columns don't).
    pub fn insertable_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.generated.is_none())
    }

    pub fn has_always_identity(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.identity == Some(IdentityGeneration::Always))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    Check,
}

impl ConstraintKind {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "p" => Some(ConstraintKind::PrimaryKey),
            "u" => Some(ConstraintKind::Unique),
            "c" => Some(ConstraintKind::Check),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintInfo {
    pub schema: String,
    pub table: String,
    pub name: String,
    pub kind: ConstraintKind,
    /// As rendered by `pg_get_constraintdef`, e.g. `PRIMARY KEY (id)`.
    pub definition: String,
    /// False for a check added `NOT VALID` and never validated. Existing rows
    /// may violate it.
    pub validated: bool,
}

/// A foreign key with all of its columns, in key order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDescriptor {
    pub name: String,
    pub schema: String,
    pub table: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
    /// False for a key added `NOT VALID`.
    pub validated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub schema: String,
    pub table: String,
    pub name: String,
    /// As rendered by `pg_get_indexdef`.
    pub definition: String,
}

// =============================================================================
// CATALOG ROW SHAPES
// =============================================================================

/// One `information_schema.columns` row before normalization.
#[derive(Debug, Clone, Default)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub udt_schema: String,
    pub udt_name: String,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    pub identity_generation: Option<String>,
    pub generation_expression: Option<String>,
}

/// One row of the foreign key catalog join: a single column pair.
#[derive(Debug, Clone)]
pub struct ForeignKeyColumnRow {
    pub name: String,
    pub schema: String,
    pub table: String,
    pub column: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub update_action: String,
    pub delete_action: String,
    pub validated: bool,
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Schemas that belong to the server rather than the application.
pub fn is_system_schema(name: &str) -> bool {
    name == "pg_catalog" || name == "information_schema" || name.starts_with("pg_")
}

/// Render a column's type as a reusable type expression.
pub fn normalize_column_type(raw: &RawColumn) -> String {
    match raw.data_type.as_str() {
        "character varying" | "character" | "bit" | "bit varying" => {
            match raw.character_maximum_length {
                Some(len) => format!("{}({})", raw.data_type, len),
                None => raw.data_type.clone(),
            }
        }
        "numeric" => match (raw.numeric_precision, raw.numeric_scale) {
            (Some(p), Some(s)) => format!("numeric({},{})", p, s),
            (Some(p), None) => format!("numeric({})", p),
            _ => "numeric".to_string(),
        },
        "ARRAY" => {
            let element = raw.udt_name.strip_prefix('_').unwrap_or(&raw.udt_name);
            if raw.udt_schema == "pg_catalog" {
                format!("{}[]", element)
            } else {
                format!("{}[]", qualified_name(&raw.udt_schema, element))
            }
        }
        "USER-DEFINED" => qualified_name(&raw.udt_schema, &raw.udt_name),
        _ => raw.data_type.clone(),
    }
}

/// Map a `pg_constraint` referential action code to its SQL clause.
pub fn fk_action_sql(code: &str) -> &'static str {
    match code {
        "c" => "CASCADE",
        "n" => "SET NULL",
        "d" => "SET DEFAULT",
        "r" => "RESTRICT",
        _ => "NO ACTION",
    }
}

/// Schema-qualify casts to enum `schema.name` inside a default expression.
///
/// `'happy'::mood` becomes `'happy'::"public"."mood"`. Casts that are already
/// qualified are left alone.
pub fn qualify_enum_default(default: &str, schema: &str, name: &str) -> String {
    let escaped = regex::escape(name);
    let quoted = regex::escape(&format!("\"{}\"", name.replace('"', "\"\"")));
    let pattern = format!(r"::(?:{}|{}\b)", quoted, escaped);
    match Regex::new(&pattern) {
        Ok(re) => {
            let replacement = format!("::{}", qualified_name(schema, name));
            re.replace_all(default, regex::NoExpand(&replacement))
                .into_owned()
        }
        Err(_) => default.to_string(),
    }
}

/// Turn a catalog column row into a [`ColumnDescriptor`].
pub fn build_column(raw: &RawColumn, enums: &[EnumType]) -> ColumnDescriptor {
    let data_type = normalize_column_type(raw);

    let enum_ref = match raw.data_type.as_str() {
        "USER-DEFINED" => Some(raw.udt_name.as_str()),
        "ARRAY" => raw.udt_name.strip_prefix('_'),
        _ => None,
    }
    .filter(|name| {
        enums
            .iter()
            .any(|e| e.schema == raw.udt_schema && e.name == *name)
    });

    let default = raw.column_default.as_ref().map(|d| match enum_ref {
        Some(name) => qualify_enum_default(d, &raw.udt_schema, name),
        None => d.clone(),
    });

    let identity = match raw.identity_generation.as_deref() {
        Some("ALWAYS") => Some(IdentityGeneration::Always),
        Some("BY DEFAULT") => Some(IdentityGeneration::ByDefault),
        _ => None,
    };

    ColumnDescriptor {
        name: raw.name.clone(),
        data_type,
        nullable: raw.is_nullable,
        default,
        identity,
        generated: raw.generation_expression.clone(),
    }
}

/// Group flat per-column foreign key rows into one descriptor per constraint.
///
/// Rows must arrive in key-column order; constraints keep the order in which
/// they were first seen.
pub fn aggregate_foreign_keys(rows: Vec<ForeignKeyColumnRow>) -> Vec<ForeignKeyDescriptor> {
    let mut positions: HashMap<(String, String, String), usize> = HashMap::new();
    let mut descriptors: Vec<ForeignKeyDescriptor> = Vec::new();

    for row in rows {
        let key = (row.schema.clone(), row.table.clone(), row.name.clone());
        match positions.get(&key) {
            Some(&idx) => {
                let fk = &mut descriptors[idx];
                fk.columns.push(row.column);
                fk.referenced_columns.push(row.referenced_column);
            }
            None => {
                positions.insert(key, descriptors.len());
                descriptors.push(ForeignKeyDescriptor {
                    name: row.name,
                    schema: row.schema,
                    table: row.table,
                    columns: vec![row.column],
                    referenced_schema: row.referenced_schema,
                    referenced_table: row.referenced_table,
                    referenced_columns: vec![row.referenced_column],
                    on_update: fk_action_sql(&row.update_action).to_string(),
                    on_delete: fk_action_sql(&row.delete_action).to_string(),
                    validated: row.validated,
                });
            }
        }
    }

    descriptors
}

// =============================================================================
// INTROSPECTOR
// =============================================================================

/// Reads the catalog of one source database.
pub struct Introspector<'a> {
    pool: &'a PgPool,
}

impl<'a> Introspector<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Build the full snapshot.
    pub async fn snapshot(&self) -> Result<SchemaSnapshot> {
        let start = Instant::now();

        let schemas = self.schemas().await?;
        let enums = self.enums(&schemas).await?;
        let sequences = self.sequences(&schemas).await?;
        let tables = self.tables(&schemas, &enums).await?;
        let constraints = self.constraints(&schemas).await?;
        let foreign_keys = self.foreign_keys(&schemas).await?;
        let indexes = self.indexes(&schemas).await?;

        info!(
            subsystem = "clone",
            component = "introspect",
            op = "snapshot",
            schemas = schemas.len(),
            enums = enums.len(),
            sequences = sequences.len(),
            tables = tables.len(),
            constraints = constraints.len(),
            foreign_keys = foreign_keys.len(),
            indexes = indexes.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Introspected source schema"
        );

        Ok(SchemaSnapshot {
            schemas,
            enums,
            sequences,
            tables,
            constraints,
            foreign_keys,
            indexes,
        })
    }

    pub async fn schemas(&self) -> Result<Vec<String>> {
        let names: Vec<String> =
            sqlx::query_scalar("SELECT nspname::text FROM pg_namespace ORDER BY nspname")
                .fetch_all(self.pool)
                .await
                .map_err(Error::Database)?;

        Ok(names.into_iter().filter(|n| !is_system_schema(n)).collect())
    }

    pub async fn enums(&self, schemas: &[String]) -> Result<Vec<EnumType>> {
        let rows = sqlx::query(
            r#"
            SELECT
                n.nspname::text AS schema,
                t.typname::text AS name,
                array_agg(e.enumlabel::text ORDER BY e.enumsortorder) AS labels
            FROM pg_type t
            JOIN pg_namespace n ON n.oid = t.typnamespace
            JOIN pg_enum e ON e.enumtypid = t.oid
            WHERE n.nspname = ANY($1::text[])
            GROUP BY n.nspname, t.typname
            ORDER BY n.nspname, t.typname
            "#,
        )
        .bind(schemas)
        .fetch_all(self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(EnumType {
                    schema: row.try_get("schema")?,
                    name: row.try_get("name")?,
                    labels: row.try_get("labels")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::Database)
    }

    pub async fn sequences(&self, schemas: &[String]) -> Result<Vec<SequenceInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT
                s.schemaname::text AS schema,
                s.sequencename::text AS name,
                s.data_type::text AS data_type,
                s.start_value,
                s.increment_by,
                s.min_value,
                s.max_value,
                s.cache_size,
                s.cycle,
                s.last_value,
                d.deptype::text AS dep_type,
                tn.nspname::text AS owner_schema,
                tc.relname::text AS owner_table,
                a.attname::text AS owner_column
            FROM pg_sequences s
            JOIN pg_namespace n ON n.nspname = s.schemaname
            JOIN pg_class c
                ON c.relnamespace = n.oid
                AND c.relname = s.sequencename
                AND c.relkind = 'S'
            LEFT JOIN pg_depend d
                ON d.objid = c.oid
                AND d.classid = 'pg_class'::regclass
                AND d.refclassid = 'pg_class'::regclass
                AND d.deptype IN ('a', 'i')
            LEFT JOIN pg_class tc ON tc.oid = d.refobjid
            LEFT JOIN pg_namespace tn ON tn.oid = tc.relnamespace
            LEFT JOIN pg_attribute a
                ON a.attrelid = d.refobjid
                AND a.attnum = d.refobjsubid
            WHERE s.schemaname = ANY($1::text[])
            ORDER BY s.schemaname, s.sequencename
            "#,
        )
        .bind(schemas)
        .fetch_all(self.pool)
        .await
        .map_err(Error::Database)?;

        let mut sequences = Vec::with_capacity(rows.len());
        for row in &rows {
            let dep_type: Option<String> = row.try_get("dep_type")?;
            let owner_schema: Option<String> = row.try_get("owner_schema")?;
            let owner_table: Option<String> = row.try_get("owner_table")?;
            let owner_column: Option<String> = row.try_get("owner_column")?;

            let owner = match (owner_schema, owner_table, owner_column) {
                (Some(schema), Some(table), Some(column)) => Some(SequenceOwner {
                    schema,
                    table,
                    column,
                }),
                _ => None,
            };

            sequences.push(SequenceInfo {
                schema: row.try_get("schema")?,
                name: row.try_get("name")?,
                data_type: row.try_get("data_type")?,
                start_value: row.try_get("start_value")?,
                increment_by: row.try_get("increment_by")?,
                min_value: row.try_get("min_value")?,
                max_value: row.try_get("max_value")?,
                cache_size: row.try_get("cache_size")?,
                cycle: row.try_get("cycle")?,
                last_value: row.try_get("last_value")?,
                owner,
                identity: dep_type.as_deref() == Some("i"),
            });
        }

        debug!(
            subsystem = "clone",
            component = "introspect",
            op = "sequences",
            count = sequences.len(),
            "Read sequences"
        );
        Ok(sequences)
    }

    pub async fn tables(
        &self,
        schemas: &[String],
        enums: &[EnumType],
    ) -> Result<Vec<TableInfo>> {
        let table_rows = sqlx::query(
            r#"
            SELECT table_schema::text AS schema, table_name::text AS name
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
                AND table_schema = ANY($1::text[])
            ORDER BY table_schema, table_name
            "#,
        )
        .bind(schemas)
        .fetch_all(self.pool)
        .await
        .map_err(Error::Database)?;

        let mut tables = Vec::with_capacity(table_rows.len());
        let mut positions: HashMap<(String, String), usize> = HashMap::new();
        for row in &table_rows {
            let schema: String = row.try_get("schema")?;
            let name: String = row.try_get("name")?;
            positions.insert((schema.clone(), name.clone()), tables.len());
            tables.push(TableInfo {
                schema,
                name,
                columns: Vec::new(),
            });
        }

        let column_rows = sqlx::query(
            r#"
            SELECT
                table_schema::text AS schema,
                table_name::text AS table_name,
                column_name::text AS name,
                data_type::text AS data_type,
                udt_schema::text AS udt_schema,
                udt_name::text AS udt_name,
                character_maximum_length::int4 AS character_maximum_length,
                numeric_precision::int4 AS numeric_precision,
                numeric_scale::int4 AS numeric_scale,
                is_nullable::text AS is_nullable,
                column_default::text AS column_default,
                CASE WHEN is_identity = 'YES' THEN identity_generation::text END
                    AS identity_generation,
                CASE WHEN is_generated = 'ALWAYS' THEN generation_expression::text END
                    AS generation_expression
            FROM information_schema.columns
            WHERE table_schema = ANY($1::text[])
            ORDER BY table_schema, table_name, ordinal_position
            "#,
        )
        .bind(schemas)
        .fetch_all(self.pool)
        .await
        .map_err(Error::Database)?;

        for row in &column_rows {
            let schema: String = row.try_get("schema")?;
            let table_name: String = row.try_get("table_name")?;
            // Views and foreign tables also appear in information_schema.columns.
            let Some(&idx) = positions.get(&(schema, table_name)) else {
                continue;
            };

            let is_nullable: String = row.try_get("is_nullable")?;
            let raw = RawColumn {
                name: row.try_get("name")?,
                data_type: row.try_get("data_type")?,
                udt_schema: row.try_get("udt_schema")?,
                udt_name: row.try_get("udt_name")?,
                character_maximum_length: row.try_get("character_maximum_length")?,
                numeric_precision: row.try_get("numeric_precision")?,
                numeric_scale: row.try_get("numeric_scale")?,
                is_nullable: is_nullable == "YES",
                column_default: row.try_get("column_default")?,
                identity_generation: row.try_get("identity_generation")?,
                generation_expression: row.try_get("generation_expression")?,
            };
            tables[idx].columns.push(build_column(&raw, enums));
        }

        Ok(tables)
    }

    pub async fn constraints(&self, schemas: &[String]) -> Result<Vec<ConstraintInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT
                n.nspname::text AS schema,
                cl.relname::text AS table_name,
                con.conname::text AS name,
                con.contype::text AS kind,
                pg_get_constraintdef(con.oid) AS definition,
                con.convalidated AS validated
            FROM pg_constraint con
            JOIN pg_class cl ON cl.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = cl.relnamespace
            WHERE con.contype IN ('p', 'u', 'c')
                AND cl.relkind IN ('r', 'p')
                AND n.nspname = ANY($1::text[])
            ORDER BY
                n.nspname,
                cl.relname,
                CASE con.contype WHEN 'p' THEN 0 WHEN 'u' THEN 1 ELSE 2 END,
                con.conname
            "#,
        )
        .bind(schemas)
        .fetch_all(self.pool)
        .await
        .map_err(Error::Database)?;

        let mut constraints = Vec::with_capacity(rows.len());
        for row in &rows {
            let code: String = row.try_get("kind")?;
            let Some(kind) = ConstraintKind::from_code(&code) else {
                continue;
            };
            constraints.push(ConstraintInfo {
                schema: row.try_get("schema")?,
                table: row.try_get("table_name")?,
                name: row.try_get("name")?,
                kind,
                definition: row.try_get("definition")?,
                validated: row.try_get("validated")?,
            });
        }
        Ok(constraints)
    }

    pub async fn foreign_keys(&self, schemas: &[String]) -> Result<Vec<ForeignKeyDescriptor>> {
        let rows = sqlx::query(
            r#"
            SELECT
                con.conname::text AS name,
                n.nspname::text AS schema,
                cl.relname::text AS table_name,
                a.attname::text AS column_name,
                rn.nspname::text AS ref_schema,
                rcl.relname::text AS ref_table,
                ra.attname::text AS ref_column,
                con.confupdtype::text AS update_action,
                con.confdeltype::text AS delete_action,
                con.convalidated AS validated
            FROM pg_constraint con
            JOIN pg_class cl ON cl.oid = con.conrelid
            JOIN pg_namespace n ON n.oid = cl.relnamespace
            JOIN pg_class rcl ON rcl.oid = con.confrelid
            JOIN pg_namespace rn ON rn.oid = rcl.relnamespace
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey)
                WITH ORDINALITY AS k(attnum, ref_attnum, ord)
            JOIN pg_attribute a
                ON a.attrelid = con.conrelid AND a.attnum = k.attnum
            JOIN pg_attribute ra
                ON ra.attrelid = con.confrelid AND ra.attnum = k.ref_attnum
            WHERE con.contype = 'f'
                AND n.nspname = ANY($1::text[])
            ORDER BY n.nspname, cl.relname, con.conname, k.ord
            "#,
        )
        .bind(schemas)
        .fetch_all(self.pool)
        .await
        .map_err(Error::Database)?;

        let flat = rows
            .iter()
            .map(|row| {
                Ok(ForeignKeyColumnRow {
                    name: row.try_get("name")?,
                    schema: row.try_get("schema")?,
                    table: row.try_get("table_name")?,
                    column: row.try_get("column_name")?,
                    referenced_schema: row.try_get("ref_schema")?,
                    referenced_table: row.try_get("ref_table")?,
                    referenced_column: row.try_get("ref_column")?,
                    update_action: row.try_get("update_action")?,
                    delete_action: row.try_get("delete_action")?,
                    validated: row.try_get("validated")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::Database)?;

        Ok(aggregate_foreign_keys(flat))
    }

    pub async fn indexes(&self, schemas: &[String]) -> Result<Vec<IndexInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT
                n.nspname::text AS schema,
                t.relname::text AS table_name,
                i.relname::text AS name,
                pg_get_indexdef(ix.indexrelid) AS definition
            FROM pg_index ix
            JOIN pg_class i ON i.oid = ix.indexrelid
            JOIN pg_class t ON t.oid = ix.indrelid
            JOIN pg_namespace n ON n.oid = t.relnamespace
            WHERE n.nspname = ANY($1::text[])
                AND t.relkind IN ('r', 'p')
                AND NOT EXISTS (
                    SELECT 1 FROM pg_constraint c
                    WHERE c.conindid = ix.indexrelid
                        AND c.contype IN ('p', 'u')
                )
            ORDER BY n.nspname, t.relname, i.relname
            "#,
        )
        .bind(schemas)
        .fetch_all(self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter()
            .map(|row| {
                Ok(IndexInfo {
                    schema: row.try_get("schema")?,
                    table: row.try_get("table_name")?,
                    name: row.try_get("name")?,
                    definition: row.try_get("definition")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::Database)
    }
}
