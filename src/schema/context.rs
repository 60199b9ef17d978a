//! Schema context for LLM prompts.
//!
//! Renders the admin metadata of one database into deterministic text and
//! collects the business vocabulary administrators attached to it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::metadata::{
    MetadataResult, MetadataStore, MetadataStoreExt, SchemaSnapshot, TableSnapshot,
};

/// Rendered in place of the schema when a database has no tables.
pub const NO_TABLES_SENTINEL: &str = "No tables found for this database.";

/// Physical name (or `table.column`) -> admin name / description.
pub type AdminTerms = BTreeMap<String, String>;

/// Everything a prompt needs to know about the target database.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaContext {
    pub database_name: String,
    /// Engine kind as stored, used to pick the SQL dialect.
    pub engine_kind: String,
    pub schema_text: String,
    pub admin_terms: AdminTerms,
}

/// Builds [`SchemaContext`]s from the metadata store.
#[derive(Clone)]
pub struct SchemaContextBuilder {
    store: Arc<dyn MetadataStore>,
}

impl SchemaContextBuilder {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Render the schema text for a database.
    pub async fn build_schema_text(&self, database_id: i64) -> MetadataResult<String> {
        let snapshot = self.store.load_snapshot(database_id).await?;
        Ok(render_schema_text(&snapshot.tables))
    }

    /// Load a fresh snapshot and derive text and admin terms from it.
    pub async fn build(&self, database_id: i64) -> MetadataResult<SchemaContext> {
        let snapshot = self.store.load_snapshot(database_id).await?;
        Ok(context_from_snapshot(&snapshot))
    }
}

pub fn context_from_snapshot(snapshot: &SchemaSnapshot) -> SchemaContext {
    SchemaContext {
        database_name: snapshot.database.name.clone(),
        engine_kind: snapshot.database.engine_kind.clone(),
        schema_text: render_schema_text(&snapshot.tables),
        admin_terms: extract_admin_terms(&snapshot.tables),
    }
}

/// Render tables, columns and relationships as indented text.
///
/// Order follows the input. Tables are separated by a blank line and the
/// result has no trailing newline. An empty list renders [`NO_TABLES_SENTINEL`].
pub fn render_schema_text(tables: &[TableSnapshot]) -> String {
    if tables.is_empty() {
        return NO_TABLES_SENTINEL.to_string();
    }

    let blocks: Vec<String> = tables.iter().map(render_table).collect();
    blocks.join("\n\n")
}

fn render_table(snapshot: &TableSnapshot) -> String {
    let table = &snapshot.table;
    let mut lines = vec![format!(
        "Table: {}{}",
        table.name,
        annotations(table.admin_name.as_deref(), table.description.as_deref())
    )];

    if !snapshot.columns.is_empty() {
        lines.push("  Columns:".to_string());
        for column in &snapshot.columns {
            let mut flags = Vec::new();
            if column.is_primary_key {
                flags.push("primary key");
            }
            if !column.is_nullable {
                flags.push("not null");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", flags.join(", "))
            };

            lines.push(format!(
                "    - {} ({}){}{}",
                column.name,
                column.data_type,
                flags,
                annotations(column.admin_name.as_deref(), column.description.as_deref())
            ));
        }
    }

    if !snapshot.relationships.is_empty() {
        lines.push("  Relationships:".to_string());
        for rel in &snapshot.relationships {
            lines.push(format!(
                "    - {}: {}.{} -> {}.{}",
                rel.kind, rel.from_table, rel.from_column, rel.to_table, rel.to_column
            ));
        }
    }

    lines.join("\n")
}

fn annotations(admin_name: Option<&str>, description: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(name) = non_empty(admin_name) {
        out.push_str(&format!(" (Admin name: {})", name));
    }
    if let Some(desc) = non_empty(description) {
        out.push_str(&format!(" - Description: {}", desc));
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Collect admin vocabulary.
///
/// One entry per non-empty admin name keyed by the physical name, one per
/// non-empty description keyed by `<name>_description`. Columns are keyed as
/// `table.column`.
pub fn extract_admin_terms(tables: &[TableSnapshot]) -> AdminTerms {
    let mut terms = AdminTerms::new();

    let mut add = |key: String, admin_name: Option<&str>, description: Option<&str>| {
        if let Some(name) = non_empty(admin_name) {
            terms.insert(key.clone(), name.to_string());
        }
        if let Some(desc) = non_empty(description) {
            terms.insert(format!("{}_description", key), desc.to_string());
        }
    };

    for snapshot in tables {
        let table = &snapshot.table;
        add(
            table.name.clone(),
            table.admin_name.as_deref(),
            table.description.as_deref(),
        );

        for column in &snapshot.columns {
            add(
                format!("{}.{}", table.name, column.name),
                column.admin_name.as_deref(),
                column.description.as_deref(),
            );
        }
    }

    terms
}

/// Render admin terms as prompt lines (`- key: value`).
pub fn render_admin_terms(terms: &AdminTerms) -> String {
    if terms.is_empty() {
        return "(none)".to_string();
    }

    terms
        .iter()
        .map(|(k, v)| format!("- {}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}
