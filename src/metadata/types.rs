//! Admin metadata entities.
//!
//! These are the rows of the admin metadata store: registered databases, the
//! tables and columns administrators annotate, and the relationships between
//! them. [`IncomingSchema`] is the shape the synchronizer reconciles against
//! the stored rows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConnectionConfig;

// ============================================================================
// Database targets
// ============================================================================

/// Connection fields stored for a database target.
///
/// The engine is kept separately on [`DatabaseTarget`] because it is stored as
/// an engine-type reference and only resolved when a connection is made.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetConnection {
    /// Server hostname (file path for SQLite).
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name (service name for Oracle).
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub trusted_connection: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Explicit connection string, used instead of the discrete fields.
    #[serde(default, skip_serializing)]
    pub connection_string: Option<String>,
}

impl From<ConnectionConfig> for TargetConnection {
    fn from(config: ConnectionConfig) -> Self {
        Self {
            host: config.host,
            port: config.port,
            database: config.database,
            trusted_connection: config.trusted_connection,
            username: config.username,
            password: config.password,
            connection_string: config.connection_string,
        }
    }
}

/// A registered, queryable database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseTarget {
    pub id: i64,
    pub name: String,
    /// Reference into the `engine_types` table.
    pub engine_type_id: i64,
    /// Engine kind name as stored (e.g. "SQL Server").
    pub engine_kind: String,
    pub connection: TargetConnection,
    pub is_active: bool,
}

/// Fields needed to register a new database target.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDatabaseTarget {
    pub name: String,
    pub engine_type_id: i64,
    pub connection: TargetConnection,
}

// ============================================================================
// Tables, columns, relationships
// ============================================================================

/// Admin annotations for one physical table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMetadata {
    pub id: i64,
    pub database_id: i64,
    /// Physical name; unique (case-insensitive) within the database.
    pub name: String,
    pub admin_name: Option<String>,
    pub description: Option<String>,
}

/// Admin annotations for one physical column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMetadata {
    pub id: i64,
    pub table_id: i64,
    /// Physical name; unique (case-insensitive) within the table.
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub is_lookup: bool,
    pub admin_name: Option<String>,
    pub description: Option<String>,
}

/// Kind of a relationship edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::OneToOne => "one-to-one",
            RelationshipKind::OneToMany => "one-to-many",
            RelationshipKind::ManyToOne => "many-to-one",
            RelationshipKind::ManyToMany => "many-to-many",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "one-to-one" => Ok(RelationshipKind::OneToOne),
            "one-to-many" => Ok(RelationshipKind::OneToMany),
            "many-to-one" => Ok(RelationshipKind::ManyToOne),
            "many-to-many" => Ok(RelationshipKind::ManyToMany),
            other => Err(format!("unknown relationship kind: {}", other)),
        }
    }
}

/// A stored, directed edge between two columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipMetadata {
    pub id: i64,
    pub database_id: i64,
    pub from_table_id: i64,
    pub from_column_id: i64,
    pub to_table_id: i64,
    pub to_column_id: i64,
    pub kind: RelationshipKind,
    /// True when the edge mirrors a real foreign-key constraint.
    pub is_enforced: bool,
}

/// A relationship row to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRelationship {
    pub from_table_id: i64,
    pub from_column_id: i64,
    pub to_table_id: i64,
    pub to_column_id: i64,
    pub kind: RelationshipKind,
    pub is_enforced: bool,
}

// ============================================================================
// Snapshots
// ============================================================================

/// A relationship with its endpoints resolved to physical names.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRelationship {
    pub kind: RelationshipKind,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub is_enforced: bool,
}

/// One table with its columns and outgoing relationships.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub table: TableMetadata,
    pub columns: Vec<ColumnMetadata>,
    pub relationships: Vec<ResolvedRelationship>,
}

/// Everything known about one database target, built fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    pub database: DatabaseTarget,
    pub tables: Vec<TableSnapshot>,
}

// ============================================================================
// Incoming schema (sync input)
// ============================================================================

/// A column as discovered by introspection or supplied by an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingColumn {
    pub name: String,
    pub data_type: String,
    #[serde(default = "default_true")]
    pub is_nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
    /// `None` keeps whatever the administrator already entered.
    #[serde(default)]
    pub admin_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl IncomingColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            is_primary_key: false,
            admin_name: None,
            description: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }
}

/// A table as discovered by introspection or supplied by an import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingTable {
    pub name: String,
    #[serde(default)]
    pub admin_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<IncomingColumn>,
}

impl IncomingTable {
    pub fn new(name: impl Into<String>, columns: Vec<IncomingColumn>) -> Self {
        Self {
            name: name.into(),
            admin_name: None,
            description: None,
            columns,
        }
    }

    pub fn with_admin(mut self, admin_name: impl Into<String>, description: impl Into<String>) -> Self {
        self.admin_name = Some(admin_name.into());
        self.description = Some(description.into());
        self
    }
}

/// A relationship expressed by physical names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRelationship {
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub kind: RelationshipKind,
    #[serde(default)]
    pub is_enforced: bool,
}

impl IncomingRelationship {
    /// An enforced many-to-one edge, as a foreign key produces.
    pub fn foreign_key(
        from_table: impl Into<String>,
        from_column: impl Into<String>,
        to_table: impl Into<String>,
        to_column: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            from_column: from_column.into(),
            to_table: to_table.into(),
            to_column: to_column.into(),
            kind: RelationshipKind::ManyToOne,
            is_enforced: true,
        }
    }

    /// Case-insensitive identity of the edge.
    pub fn key(&self) -> (String, String, String, String) {
        (
            self.from_table.to_lowercase(),
            self.from_column.to_lowercase(),
            self.to_table.to_lowercase(),
            self.to_column.to_lowercase(),
        )
    }
}

/// Full incoming schema for one database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingSchema {
    #[serde(default)]
    pub tables: Vec<IncomingTable>,
    #[serde(default)]
    pub relationships: Vec<IncomingRelationship>,
}

impl IncomingSchema {
    pub fn find_table(&self, name: &str) -> Option<&IncomingTable> {
        self.tables
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_relationship(&self, from_table: &str, from_column: &str) -> bool {
        self.relationships.iter().any(|r| {
            r.from_table.eq_ignore_ascii_case(from_table)
                && r.from_column.eq_ignore_ascii_case(from_column)
        })
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Sync report
// ============================================================================

/// Insert/update/delete counts for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ChangeCounts {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// What a schema sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub tables: ChangeCounts,
    pub columns: ChangeCounts,
    pub relationships: ChangeCounts,
}

impl SyncReport {
    /// True when the sync wrote nothing.
    pub fn is_noop(&self) -> bool {
        self.tables.total() + self.columns.total() + self.relationships.total() == 0
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tables +{} ~{} -{}, columns +{} ~{} -{}, relationships +{} ~{} -{}",
            self.tables.inserted,
            self.tables.updated,
            self.tables.deleted,
            self.columns.inserted,
            self.columns.updated,
            self.columns.deleted,
            self.relationships.inserted,
            self.relationships.updated,
            self.relationships.deleted,
        )
    }
}
