//! Schema synchronizer.
//!
//! Reconciles an incoming schema (from introspection or an import) with the
//! stored admin metadata of one database:
//!
//! 1. Tables are matched by physical name, case-insensitively. Matched tables
//!    get their admin name/description updated when changed, new tables are
//!    inserted, missing tables are deleted together with their columns.
//! 2. Columns are diffed the same way inside each table.
//! 3. Relationships are diffed across the whole database using the name -> id
//!    maps built in the first two passes.
//!
//! All three passes run in one store transaction. Syncs of the same database
//! are serialized.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::connection::{ConnectionProvider, DbResult};
use crate::metadata::{
    ColumnMetadata, DatabaseTarget, IncomingColumn, IncomingSchema, MetadataError, MetadataResult,
    MetadataStore, MetadataStoreExt, NewRelationship, SchemaWriter, SyncReport,
};

use super::suggest::add_suggested_relationships;

/// Serializes and runs schema syncs against a metadata store.
pub struct SchemaSynchronizer {
    store: Arc<dyn MetadataStore>,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl SchemaSynchronizer {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, database_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(database_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Reconcile `incoming` with the stored metadata of `database_id`.
    ///
    /// All-or-nothing: on error nothing is written.
    pub async fn sync(&self, database_id: i64, incoming: &IncomingSchema) -> MetadataResult<SyncReport> {
        self.store.require_active_target(database_id).await?;

        let lock = self.lock_for(database_id);
        let _guard = lock.lock().await;

        let started = Instant::now();
        let report = self
            .store
            .apply_schema_changes(&|writer: &mut dyn SchemaWriter| {
                apply_schema(writer, database_id, incoming)
            })
            .await?;

        tracing::info!(
            database_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            %report,
            "schema sync committed"
        );
        Ok(report)
    }

    /// Introspect the live database, add naming-convention suggestions, and sync.
    pub async fn introspect_and_sync(
        &self,
        connections: &ConnectionProvider,
        target: &DatabaseTarget,
    ) -> Result<SyncReport, crate::error::QueryError> {
        let mut incoming = introspect(connections, target).await?;
        let suggested = add_suggested_relationships(&mut incoming);
        tracing::debug!(
            database_id = target.id,
            tables = incoming.tables.len(),
            suggested,
            "introspected schema"
        );

        Ok(self.sync(target.id, &incoming).await?)
    }
}

async fn introspect(connections: &ConnectionProvider, target: &DatabaseTarget) -> DbResult<IncomingSchema> {
    let connection = connections.open(target).await?;
    let schema = connections.run(connection.introspect()).await;
    connection.close().await;
    schema
}

/// Apply the three-pass diff through `writer`.
///
/// Exposed so callers can wrap the writer, e.g. to inject failures in tests.
pub fn apply_schema(
    writer: &mut dyn SchemaWriter,
    database_id: i64,
    incoming: &IncomingSchema,
) -> MetadataResult<SyncReport> {
    let mut report = SyncReport::default();

    let mut seen = HashSet::new();
    for table in &incoming.tables {
        if !seen.insert(table.name.to_lowercase()) {
            return Err(MetadataError::Invalid(format!(
                "table {} appears twice in the incoming schema",
                table.name
            )));
        }
    }

    // Pass 1: tables
    let stored_tables = writer.tables(database_id)?;
    let mut table_ids: HashMap<String, i64> = HashMap::new();

    for stored in &stored_tables {
        if !seen.contains(&stored.name.to_lowercase()) {
            report.columns.deleted += writer.columns(stored.id)?.len();
            writer.delete_table(stored.id)?;
            report.tables.deleted += 1;
        }
    }

    for table in &incoming.tables {
        let key = table.name.to_lowercase();
        let existing = stored_tables.iter().find(|t| t.name.to_lowercase() == key);

        let id = match existing {
            Some(stored) => {
                let admin_name = merge(stored.admin_name.as_deref(), table.admin_name.as_deref());
                let description = merge(stored.description.as_deref(), table.description.as_deref());
                if admin_name != stored.admin_name || description != stored.description {
                    writer.update_table(stored.id, admin_name.as_deref(), description.as_deref())?;
                    report.tables.updated += 1;
                }
                stored.id
            }
            None => {
                report.tables.inserted += 1;
                writer.insert_table(database_id, table)?
            }
        };
        table_ids.insert(key, id);
    }

    // Pass 2: columns
    let mut column_ids: HashMap<(String, String), i64> = HashMap::new();

    for table in &incoming.tables {
        let table_key = table.name.to_lowercase();
        let table_id = table_ids[&table_key];
        let stored_columns = writer.columns(table_id)?;

        let mut seen_columns = HashSet::new();
        for column in &table.columns {
            if !seen_columns.insert(column.name.to_lowercase()) {
                return Err(MetadataError::Invalid(format!(
                    "column {}.{} appears twice in the incoming schema",
                    table.name, column.name
                )));
            }
        }

        for stored in &stored_columns {
            if !seen_columns.contains(&stored.name.to_lowercase()) {
                writer.delete_column(stored.id)?;
                report.columns.deleted += 1;
            }
        }

        for column in &table.columns {
            let column_key = column.name.to_lowercase();
            let existing = stored_columns
                .iter()
                .find(|c| c.name.to_lowercase() == column_key);

            let id = match existing {
                Some(stored) => {
                    let updated = merged_column(stored, column);
                    if &updated != stored {
                        writer.update_column(&updated)?;
                        report.columns.updated += 1;
                    }
                    stored.id
                }
                None => {
                    report.columns.inserted += 1;
                    writer.insert_column(table_id, column)?
                }
            };
            column_ids.insert((table_key.clone(), column_key), id);
        }
    }

    // Pass 3: relationships
    let table_names: HashMap<i64, &String> = table_ids.iter().map(|(k, v)| (*v, k)).collect();
    let column_names: HashMap<i64, &(String, String)> =
        column_ids.iter().map(|(k, v)| (*v, k)).collect();

    let mut wanted = HashMap::new();
    for rel in &incoming.relationships {
        wanted.entry(rel.key()).or_insert(rel);
    }

    let mut stored_keys = HashSet::new();
    for stored in writer.relationships(database_id)? {
        let key = match (
            table_names.get(&stored.from_table_id),
            column_names.get(&stored.from_column_id),
            table_names.get(&stored.to_table_id),
            column_names.get(&stored.to_column_id),
        ) {
            (Some(ft), Some(fc), Some(tt), Some(tc)) => {
                Some(((*ft).clone(), fc.1.clone(), (*tt).clone(), tc.1.clone()))
            }
            _ => None,
        };

        match key.as_ref().and_then(|k| wanted.get(k).map(|rel| (k, rel))) {
            Some((key, rel)) if stored_keys.insert(key.clone()) => {
                if rel.kind != stored.kind || rel.is_enforced != stored.is_enforced {
                    writer.update_relationship(stored.id, rel.kind, rel.is_enforced)?;
                    report.relationships.updated += 1;
                }
            }
            // dangling endpoint, no longer wanted, or a duplicate row
            _ => {
                writer.delete_relationship(stored.id)?;
                report.relationships.deleted += 1;
            }
        }
    }

    for rel in &incoming.relationships {
        let key = rel.key();
        if stored_keys.contains(&key) {
            continue;
        }

        let ids = (
            table_ids.get(&key.0),
            column_ids.get(&(key.0.clone(), key.1.clone())),
            table_ids.get(&key.2),
            column_ids.get(&(key.2.clone(), key.3.clone())),
        );
        let (Some(&from_table_id), Some(&from_column_id), Some(&to_table_id), Some(&to_column_id)) = ids
        else {
            tracing::warn!(
                from = %format!("{}.{}", rel.from_table, rel.from_column),
                to = %format!("{}.{}", rel.to_table, rel.to_column),
                "skipping relationship with unknown endpoint"
            );
            continue;
        };

        writer.insert_relationship(
            database_id,
            &NewRelationship {
                from_table_id,
                from_column_id,
                to_table_id,
                to_column_id,
                kind: rel.kind,
                is_enforced: rel.is_enforced,
            },
        )?;
        stored_keys.insert(key);
        report.relationships.inserted += 1;
    }

    Ok(report)
}

/// `None` keeps the stored value; `Some("")` clears it.
fn merge(stored: Option<&str>, incoming: Option<&str>) -> Option<String> {
    match incoming {
        Some(value) => {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        }
        None => stored.map(String::from),
    }
}

fn merged_column(stored: &ColumnMetadata, incoming: &IncomingColumn) -> ColumnMetadata {
    ColumnMetadata {
        data_type: incoming.data_type.clone(),
        is_nullable: incoming.is_nullable,
        is_primary_key: incoming.is_primary_key,
        admin_name: merge(stored.admin_name.as_deref(), incoming.admin_name.as_deref()),
        description: merge(stored.description.as_deref(), incoming.description.as_deref()),
        ..stored.clone()
    }
}
