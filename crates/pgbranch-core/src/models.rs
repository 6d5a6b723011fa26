//! Domain types exchanged between the clone engine and its caller.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::defaults;

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// What a clone reproduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneMode {
    /// Structure and row data, subject to per-table options.
    Full,
    /// Structure only; every table is left empty.
    #[serde(alias = "schema")]
    SchemaOnly,
}

impl CloneMode {
    pub fn copies_data(self) -> bool {
        matches!(self, CloneMode::Full)
    }
}

impl fmt::Display for CloneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloneMode::Full => write!(f, "full"),
            CloneMode::SchemaOnly => write!(f, "schema"),
        }
    }
}

/// Per-table copy option supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOption {
    pub schema: String,
    pub table: String,
    pub include: bool,
    /// Maximum rows to copy. Must be positive when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<i64>,
}

impl TableOption {
    pub fn include(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            include: true,
            row_limit: None,
        }
    }

    pub fn exclude(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            include: false,
            row_limit: None,
        }
    }

    pub fn with_row_limit(mut self, limit: i64) -> Self {
        self.row_limit = Some(limit);
        self
    }
}

/// How the data copy treats one source table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSelection {
    /// Copy rows, optionally capped.
    Copy { row_limit: Option<i64> },
    /// Leave the table empty.
    Skip,
}

/// A request to branch `source_database` into `target_database`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneRequest {
    pub source_database: String,
    pub target_database: String,
    pub mode: CloneMode,
    #[serde(default)]
    pub table_options: Vec<TableOption>,
}

impl CloneRequest {
    pub fn new(
        source_database: impl Into<String>,
        target_database: impl Into<String>,
        mode: CloneMode,
    ) -> Self {
        Self {
            source_database: source_database.into(),
            target_database: target_database.into(),
            mode,
            table_options: Vec::new(),
        }
    }

    pub fn with_table_options(mut self, options: Vec<TableOption>) -> Self {
        self.table_options = options;
        self
    }

    /// Resolve whether (and how much of) a table is copied.
    ///
    /// With no options every table is copied in full. Once any option is
    /// supplied, tables without an explicit option are skipped.
    pub fn selection_for(&self, schema: &str, table: &str) -> TableSelection {
        if !self.mode.copies_data() {
            return TableSelection::Skip;
        }
        if self.table_options.is_empty() {
            return TableSelection::Copy { row_limit: None };
        }
        match self
            .table_options
            .iter()
            .find(|o| o.schema == schema && o.table == table)
        {
            Some(option) if option.include => TableSelection::Copy {
                row_limit: option.row_limit,
            },
            _ => TableSelection::Skip,
        }
    }
}

/// Server-level connection parameters resolved by the caller.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub ssl: bool,
}

fn default_port() -> u16 {
    defaults::POSTGRES_PORT
}

impl ServerConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            ssl: false,
        }
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    /// `postgresql://<user>:<password>@<host>:<port>/<database>` with the
    /// login percent-encoded.
    pub fn connection_string(&self, database: &str) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            database
        )
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("ssl", &self.ssl)
            .finish()
    }
}

// =============================================================================
// REPORT TYPES
// =============================================================================

/// Orchestrator phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneState {
    Creating,
    Introspecting,
    ApplyingDdl,
    CopyingData,
    ResyncingSequences,
    ApplyingForeignKeys,
    Succeeded,
    Failed,
}

impl CloneState {
    pub fn as_str(self) -> &'static str {
        match self {
            CloneState::Creating => "creating",
            CloneState::Introspecting => "introspecting",
            CloneState::ApplyingDdl => "applying_ddl",
            CloneState::CopyingData => "copying_data",
            CloneState::ResyncingSequences => "resyncing_sequences",
            CloneState::ApplyingForeignKeys => "applying_foreign_keys",
            CloneState::Succeeded => "succeeded",
            CloneState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CloneState::Succeeded | CloneState::Failed)
    }
}

impl fmt::Display for CloneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Best-effort phase a statement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementPhase {
    Ddl,
    Data,
    Sequence,
    /// Check constraints re-added `NOT VALID` after the data copy.
    Constraint,
    ForeignKey,
}

/// Result of a single best-effort statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatementOutcome {
    Applied,
    Skipped { reason: String },
}

impl StatementOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StatementOutcome::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementRecord {
    pub phase: StatementPhase,
    pub statement: String,
    #[serde(flatten)]
    pub outcome: StatementOutcome,
}

/// Rows copied into one target table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCopyStats {
    pub schema: String,
    pub table: String,
    pub rows_copied: u64,
    /// Set when the table was aborted partway; holds the reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
}

/// Everything the best-effort phases did, statement by statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneReport {
    pub clone_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub state: CloneState,
    pub statements: Vec<StatementRecord>,
    pub tables: Vec<TableCopyStats>,
}

impl CloneReport {
    pub fn new(clone_id: Uuid) -> Self {
        Self {
            clone_id,
            started_at: Utc::now(),
            finished_at: None,
            state: CloneState::Creating,
            statements: Vec::new(),
            tables: Vec::new(),
        }
    }

    pub fn record(&mut self, phase: StatementPhase, statement: String, outcome: StatementOutcome) {
        self.statements.push(StatementRecord {
            phase,
            statement,
            outcome,
        });
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = StatementRecord>) {
        self.statements.extend(records);
    }

    /// Statements of `phase` that were skipped.
    pub fn skipped(&self, phase: StatementPhase) -> impl Iterator<Item = &StatementRecord> {
        self.statements
            .iter()
            .filter(move |r| r.phase == phase && !r.outcome.is_applied())
    }

    pub fn applied_count(&self, phase: StatementPhase) -> usize {
        self.statements
            .iter()
            .filter(|r| r.phase == phase && r.outcome.is_applied())
            .count()
    }

    pub fn skipped_count(&self, phase: StatementPhase) -> usize {
        self.skipped(phase).count()
    }

    pub fn table(&self, schema: &str, table: &str) -> Option<&TableCopyStats> {
        self.tables
            .iter()
            .find(|t| t.schema == schema && t.table == table)
    }

    pub fn total_rows_copied(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_copied).sum()
    }
}

/// The sole handoff to the caller on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneResult {
    pub success: bool,
    pub connection_string: String,
    pub report: CloneReport,
}
