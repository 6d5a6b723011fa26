//! DDL synthesis.
//!
//! Turns a [`SchemaSnapshot`] into ordered statement groups. Foreign keys and
//! check constraints the source never validated are kept out of table
//! definitions and returned as deferred groups, applied only after data has
//! been loaded. Synthesis performs no I/O.

use crate::identifiers::{qualified_name, quote_ident, quote_literal};
use crate::introspect::{
    ColumnDescriptor, ConstraintInfo, EnumType, ForeignKeyDescriptor, IndexInfo, SchemaSnapshot,
    SequenceInfo, TableInfo,
};

/// Statements for one clone, grouped in apply order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DdlPlan {
    /// `CREATE SCHEMA IF NOT EXISTS` for every schema but `public`.
    pub schemas: Vec<String>,
    /// `CREATE TYPE ... AS ENUM`, labels in source order.
    pub enums: Vec<String>,
    /// `CREATE SEQUENCE IF NOT EXISTS` for standalone and serial sequences.
    pub sequences: Vec<String>,
    /// `CREATE TABLE IF NOT EXISTS` with inline PK, unique and validated
    /// check constraints.
    pub tables: Vec<String>,
    /// Plain indexes and serial ownership, applied after every table exists.
    pub post_table: Vec<String>,
    /// Deferred `ALTER TABLE ... ADD CONSTRAINT ... CHECK ... NOT VALID`.
    pub unvalidated_checks: Vec<String>,
    /// Deferred `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY`.
    pub foreign_keys: Vec<String>,
}

impl DdlPlan {
    /// Every structural statement in apply order, foreign keys excluded.
    pub fn structure_statements(&self) -> impl Iterator<Item = &String> {
        self.schemas
            .iter()
            .chain(&self.enums)
            .chain(&self.sequences)
            .chain(&self.tables)
            .chain(&self.post_table)
    }

    pub fn structure_len(&self) -> usize {
        self.schemas.len()
            + self.enums.len()
            + self.sequences.len()
            + self.tables.len()
            + self.post_table.len()
    }
}

/// Build the full plan for `snapshot`.
pub fn synthesize(snapshot: &SchemaSnapshot) -> DdlPlan {
    let schemas = snapshot
        .schemas
        .iter()
        .filter(|s| s.as_str() != "public")
        .map(|s| format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(s)))
        .collect();

    let enums = snapshot.enums.iter().map(create_enum).collect();

    let sequences = snapshot
        .sequences
        .iter()
        .filter(|s| !s.identity)
        .map(create_sequence)
        .collect();

    let tables = snapshot
        .tables
        .iter()
        .map(|t| create_table(snapshot, t))
        .collect();

    let mut post_table: Vec<String> = snapshot.indexes.iter().map(create_index).collect();
    post_table.extend(
        snapshot
            .sequences
            .iter()
            .filter(|s| !s.identity)
            .filter_map(sequence_ownership),
    );

    let unvalidated_checks = snapshot
        .constraints
        .iter()
        .filter(|c| !c.validated)
        .map(add_unvalidated_constraint)
        .collect();

    let foreign_keys = snapshot.foreign_keys.iter().map(add_foreign_key).collect();

    DdlPlan {
        schemas,
        enums,
        sequences,
        tables,
        post_table,
        unvalidated_checks,
        foreign_keys,
    }
}

pub fn create_enum(e: &EnumType) -> String {
    let labels: Vec<String> = e.labels.iter().map(|l| quote_literal(l)).collect();
    format!(
        "CREATE TYPE {} AS ENUM ({})",
        qualified_name(&e.schema, &e.name),
        labels.join(", ")
    )
}

fn sequence_options(seq: &SequenceInfo) -> String {
    format!(
        "START WITH {} INCREMENT BY {} MINVALUE {} MAXVALUE {} CACHE {} {}",
        seq.start_value,
        seq.increment_by,
        seq.min_value,
        seq.max_value,
        seq.cache_size,
        if seq.cycle { "CYCLE" } else { "NO CYCLE" }
    )
}

pub fn create_sequence(seq: &SequenceInfo) -> String {
    format!(
        "CREATE SEQUENCE IF NOT EXISTS {} AS {} {}",
        qualified_name(&seq.schema, &seq.name),
        seq.data_type,
        sequence_options(seq)
    )
}

/// `ALTER SEQUENCE ... OWNED BY` for a serial column's sequence.
pub fn sequence_ownership(seq: &SequenceInfo) -> Option<String> {
    seq.owner.as_ref().map(|owner| {
        format!(
            "ALTER SEQUENCE {} OWNED BY {}.{}",
            qualified_name(&seq.schema, &seq.name),
            qualified_name(&owner.schema, &owner.table),
            quote_ident(&owner.column)
        )
    })
}

fn column_definition(
    snapshot: &SchemaSnapshot,
    table: &TableInfo,
    column: &ColumnDescriptor,
) -> String {
    let mut def = format!("{} {}", quote_ident(&column.name), column.data_type);

    if let Some(expr) = &column.generated {
        def.push_str(&format!(" GENERATED ALWAYS AS ({}) STORED", expr));
    } else if let Some(identity) = column.identity {
        def.push(' ');
        def.push_str(identity.as_sql());
        if let Some(seq) = snapshot.identity_sequence(&table.schema, &table.name, &column.name) {
            def.push_str(&format!(" ({})", sequence_options(seq)));
        }
    }

    if !column.nullable {
        def.push_str(" NOT NULL");
    }

    if column.generated.is_none() && column.identity.is_none() {
        if let Some(default) = &column.default {
            def.push_str(&format!(" DEFAULT {}", default));
        }
    }

    def
}

pub fn create_table(snapshot: &SchemaSnapshot, table: &TableInfo) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_definition(snapshot, table, c))
        .collect();

    // NOT VALID is ignored inside CREATE TABLE; those go in unvalidated_checks.
    parts.extend(
        snapshot
            .constraints_for(table)
            .filter(|c| c.validated)
            .map(|c| format!("CONSTRAINT {} {}", quote_ident(&c.name), c.definition)),
    );

    if parts.is_empty() {
        return format!("CREATE TABLE IF NOT EXISTS {} ()", table.qualified_name());
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        table.qualified_name(),
        parts.join(",\n    ")
    )
}

fn with_not_valid(definition: &str) -> String {
    if definition.ends_with(" NOT VALID") {
        definition.to_string()
    } else {
        format!("{} NOT VALID", definition)
    }
}

/// Re-add a constraint the source holds unvalidated, without checking
/// existing rows.
pub fn add_unvalidated_constraint(constraint: &ConstraintInfo) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} {}",
        qualified_name(&constraint.schema, &constraint.table),
        quote_ident(&constraint.name),
        with_not_valid(&constraint.definition)
    )
}

/// Rewrite an index definition to be idempotent.
pub fn create_index(index: &IndexInfo) -> String {
    rewrite_index_definition(&index.definition)
}

pub fn rewrite_index_definition(definition: &str) -> String {
    for prefix in ["CREATE UNIQUE INDEX ", "CREATE INDEX "] {
        if let Some(rest) = definition.strip_prefix(prefix) {
            if rest.starts_with("IF NOT EXISTS ") {
                return definition.to_string();
            }
            return format!("{}IF NOT EXISTS {}", prefix, rest);
        }
    }
    definition.to_string()
}

pub fn add_foreign_key(fk: &ForeignKeyDescriptor) -> String {
    let columns: Vec<String> = fk.columns.iter().map(|c| quote_ident(c)).collect();
    let referenced: Vec<String> = fk.referenced_columns.iter().map(|c| quote_ident(c)).collect();

    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        qualified_name(&fk.schema, &fk.table),
        quote_ident(&fk.name),
        columns.join(", "),
        qualified_name(&fk.referenced_schema, &fk.referenced_table),
        referenced.join(", ")
    );

    if fk.on_update != "NO ACTION" {
        sql.push_str(&format!(" ON UPDATE {}", fk.on_update));
    }
    if fk.on_delete != "NO ACTION" {
        sql.push_str(&format!(" ON DELETE {}", fk.on_delete));
    }
    if !fk.validated {
        sql.push_str(" NOT VALID");
    }
    sql
}
