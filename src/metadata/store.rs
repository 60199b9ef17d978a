//! MetadataStore trait definition.
//!
//! The MetadataStore trait abstracts over the admin metadata store: registered
//! databases and the table, column and relationship annotations layered on top
//! of them. The primary implementation is [`SqliteMetadataStore`](super::SqliteMetadataStore).

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::{MetadataError, MetadataResult};
use super::types::*;

/// Keyed access to the admin metadata store.
///
/// Reads are simple keyed lookups with no transaction. Schema writes only happen
/// through [`MetadataStore::apply_schema_changes`], which runs the supplied
/// closure inside one transaction.
///
/// # Example
///
/// ```ignore
/// use askdb::metadata::{MetadataStore, MetadataStoreExt};
///
/// async fn example(store: &dyn MetadataStore) -> MetadataResult<()> {
///     let tables = store.get_tables(1).await?;
///     let snapshot = store.load_snapshot(1).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait MetadataStore: Send + Sync {
    // =========================================================================
    // Database targets
    // =========================================================================

    /// Get a database target by id, active or not.
    async fn get_database_target(&self, database_id: i64) -> MetadataResult<Option<DatabaseTarget>>;

    /// List database targets, optionally including soft-deleted ones.
    async fn list_database_targets(&self, include_inactive: bool) -> MetadataResult<Vec<DatabaseTarget>>;

    /// Register a new database target and return its id.
    async fn add_database_target(&self, target: NewDatabaseTarget) -> MetadataResult<i64>;

    /// Update name, engine and connection fields of an existing target.
    async fn update_database_target(&self, target: &DatabaseTarget) -> MetadataResult<()>;

    /// Soft-delete a target. Returns false if no active target had that id.
    async fn deactivate_database_target(&self, database_id: i64) -> MetadataResult<bool>;

    /// Display name for an engine-type id.
    async fn engine_type_name(&self, engine_type_id: i64) -> MetadataResult<Option<String>>;

    /// Look up the engine-type id registered under a name (case-insensitive).
    async fn engine_type_id(&self, name: &str) -> MetadataResult<Option<i64>>;

    // =========================================================================
    // Tables, columns, relationships
    // =========================================================================

    /// Tables of a database, in storage order.
    async fn get_tables(&self, database_id: i64) -> MetadataResult<Vec<TableMetadata>>;

    /// Columns of a table, in storage order.
    async fn get_columns(&self, table_id: i64) -> MetadataResult<Vec<ColumnMetadata>>;

    /// Relationships whose source is the given table.
    async fn get_relationships(&self, table_id: i64) -> MetadataResult<Vec<RelationshipMetadata>>;

    /// Run `apply` inside a single transaction.
    ///
    /// Commits if `apply` returns `Ok`, rolls back every write otherwise.
    async fn apply_schema_changes(
        &self,
        apply: &(dyn for<'w> Fn(&'w mut (dyn SchemaWriter + 'w)) -> MetadataResult<SyncReport> + Sync),
    ) -> MetadataResult<SyncReport>;
}

/// Composite reads built on top of [`MetadataStore`].
#[async_trait]
pub trait MetadataStoreExt: MetadataStore {
    /// Get an active database target or fail with `NotFound`.
    async fn require_active_target(&self, database_id: i64) -> MetadataResult<DatabaseTarget> {
        match self.get_database_target(database_id).await? {
            Some(target) if target.is_active => Ok(target),
            Some(_) => Err(MetadataError::NotFound(format!(
                "database {} has been removed",
                database_id
            ))),
            None => Err(MetadataError::NotFound(format!(
                "database {} is not registered",
                database_id
            ))),
        }
    }

    /// Load a fresh snapshot of everything known about a database.
    ///
    /// Tables and columns keep storage order. Relationships are resolved to
    /// physical names; edges pointing at unknown ids are skipped.
    async fn load_snapshot(&self, database_id: i64) -> MetadataResult<SchemaSnapshot> {
        let database = self.require_active_target(database_id).await?;
        let tables = self.get_tables(database_id).await?;

        let mut columns_by_table = Vec::with_capacity(tables.len());
        let mut table_names: HashMap<i64, String> = HashMap::new();
        let mut column_names: HashMap<i64, String> = HashMap::new();

        for table in &tables {
            let columns = self.get_columns(table.id).await?;
            table_names.insert(table.id, table.name.clone());
            for column in &columns {
                column_names.insert(column.id, column.name.clone());
            }
            columns_by_table.push(columns);
        }

        let mut snapshots = Vec::with_capacity(tables.len());
        for (table, columns) in tables.into_iter().zip(columns_by_table) {
            let relationships = self
                .get_relationships(table.id)
                .await?
                .into_iter()
                .filter_map(|rel| {
                    Some(ResolvedRelationship {
                        kind: rel.kind,
                        from_table: table_names.get(&rel.from_table_id)?.clone(),
                        from_column: column_names.get(&rel.from_column_id)?.clone(),
                        to_table: table_names.get(&rel.to_table_id)?.clone(),
                        to_column: column_names.get(&rel.to_column_id)?.clone(),
                        is_enforced: rel.is_enforced,
                    })
                })
                .collect();

            snapshots.push(TableSnapshot {
                table,
                columns,
                relationships,
            });
        }

        Ok(SchemaSnapshot {
            database,
            tables: snapshots,
        })
    }
}

impl<T: MetadataStore + ?Sized> MetadataStoreExt for T {}

/// Synchronous writer handed to the closure of [`MetadataStore::apply_schema_changes`].
///
/// Every call runs inside the surrounding transaction.
pub trait SchemaWriter {
    fn tables(&mut self, database_id: i64) -> MetadataResult<Vec<TableMetadata>>;
    fn columns(&mut self, table_id: i64) -> MetadataResult<Vec<ColumnMetadata>>;
    fn relationships(&mut self, database_id: i64) -> MetadataResult<Vec<RelationshipMetadata>>;

    fn insert_table(&mut self, database_id: i64, table: &IncomingTable) -> MetadataResult<i64>;
    fn update_table(
        &mut self,
        table_id: i64,
        admin_name: Option<&str>,
        description: Option<&str>,
    ) -> MetadataResult<()>;
    /// Deletes the table and, through the cascade, its columns.
    fn delete_table(&mut self, table_id: i64) -> MetadataResult<()>;

    fn insert_column(&mut self, table_id: i64, column: &IncomingColumn) -> MetadataResult<i64>;
    fn update_column(&mut self, column: &ColumnMetadata) -> MetadataResult<()>;
    fn delete_column(&mut self, column_id: i64) -> MetadataResult<()>;

    fn insert_relationship(&mut self, database_id: i64, rel: &NewRelationship) -> MetadataResult<i64>;
    fn update_relationship(
        &mut self,
        relationship_id: i64,
        kind: RelationshipKind,
        is_enforced: bool,
    ) -> MetadataResult<()>;
    fn delete_relationship(&mut self, relationship_id: i64) -> MetadataResult<()>;
}
