use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use askdb::metadata::{
    ColumnMetadata, DatabaseTarget, IncomingColumn, IncomingRelationship, IncomingSchema, IncomingTable,
    MetadataError, MetadataResult, MetadataStore, NewDatabaseTarget, NewRelationship, RelationshipKind,
    RelationshipMetadata, SchemaWriter, SqliteMetadataStore, SyncReport, TableMetadata, TargetConnection,
};
use askdb::schema::{apply_schema, SchemaSynchronizer};

async fn store_with_database() -> (Arc<SqliteMetadataStore>, i64) {
    let store = Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
    let id = store
        .add_database_target(NewDatabaseTarget {
            name: "shop".to_string(),
            engine_type_id: 4,
            connection: TargetConnection {
                host: ":memory:".to_string(),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    (store, id)
}

/// customers <- orders <- legacy_notes
fn shop_schema() -> IncomingSchema {
    IncomingSchema {
        tables: vec![
            IncomingTable::new(
                "customers",
                vec![
                    IncomingColumn::new("id", "INTEGER").primary_key(),
                    IncomingColumn::new("name", "TEXT").not_null(),
                ],
            ),
            IncomingTable::new(
                "orders",
                vec![
                    IncomingColumn::new("id", "INTEGER").primary_key(),
                    IncomingColumn::new("customer_id", "INTEGER"),
                    IncomingColumn::new("total", "DECIMAL(10,2)"),
                ],
            ),
            IncomingTable::new(
                "legacy_notes",
                vec![
                    IncomingColumn::new("id", "INTEGER").primary_key(),
                    IncomingColumn::new("order_id", "INTEGER"),
                    IncomingColumn::new("body", "TEXT"),
                ],
            ),
        ],
        relationships: vec![
            IncomingRelationship::foreign_key("orders", "customer_id", "customers", "id"),
            IncomingRelationship::foreign_key("legacy_notes", "order_id", "orders", "id"),
        ],
    }
}

fn without_legacy_notes() -> IncomingSchema {
    let mut schema = shop_schema();
    schema.tables.retain(|t| t.name != "legacy_notes");
    schema.relationships.retain(|r| r.from_table != "legacy_notes");
    schema
}

async fn table_named(store: &SqliteMetadataStore, db: i64, name: &str) -> Option<TableMetadata> {
    store
        .get_tables(db)
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.name == name)
}

#[tokio::test]
async fn test_first_sync_inserts_everything() {
    let (store, db) = store_with_database().await;
    let sync = SchemaSynchronizer::new(store.clone());

    let report = sync.sync(db, &shop_schema()).await.unwrap();

    assert_eq!(report.tables.inserted, 3);
    assert_eq!(report.columns.inserted, 8);
    assert_eq!(report.relationships.inserted, 2);
    assert_eq!(report.tables.deleted + report.columns.deleted + report.relationships.deleted, 0);

    let orders = table_named(&store, db, "orders").await.unwrap();
    let rels = store.get_relationships(orders.id).await.unwrap();
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].kind, RelationshipKind::ManyToOne);
    assert!(rels[0].is_enforced);
}

#[tokio::test]
async fn test_second_sync_is_a_noop() {
    let (store, db) = store_with_database().await;
    let sync = SchemaSynchronizer::new(store.clone());

    sync.sync(db, &shop_schema()).await.unwrap();
    let second = sync.sync(db, &shop_schema()).await.unwrap();

    assert!(second.is_noop(), "unexpected changes: {}", second);
}

#[tokio::test]
async fn test_names_match_case_insensitively() {
    let (store, db) = store_with_database().await;
    let sync = SchemaSynchronizer::new(store.clone());
    sync.sync(db, &shop_schema()).await.unwrap();

    let mut shouting = shop_schema();
    for table in &mut shouting.tables {
        table.name = table.name.to_uppercase();
        for column in &mut table.columns {
            column.name = column.name.to_uppercase();
        }
    }
    for rel in &mut shouting.relationships {
        rel.from_table = rel.from_table.to_uppercase();
        rel.to_column = rel.to_column.to_uppercase();
    }

    let report = sync.sync(db, &shouting).await.unwrap();
    assert!(report.is_noop(), "unexpected changes: {}", report);
}

#[tokio::test]
async fn test_admin_annotations_survive_resync() {
    let (store, db) = store_with_database().await;
    let sync = SchemaSynchronizer::new(store.clone());

    let mut annotated = shop_schema();
    annotated.tables[1] = annotated.tables[1]
        .clone()
        .with_admin("Customer Orders", "One row per order");
    annotated.tables[1].columns[2].admin_name = Some("Order Total".to_string());
    sync.sync(db, &annotated).await.unwrap();

    // Introspection carries no annotations; they must be kept.
    let report = sync.sync(db, &shop_schema()).await.unwrap();
    assert!(report.is_noop());

    let orders = table_named(&store, db, "orders").await.unwrap();
    assert_eq!(orders.admin_name.as_deref(), Some("Customer Orders"));
    let columns = store.get_columns(orders.id).await.unwrap();
    assert_eq!(columns[2].admin_name.as_deref(), Some("Order Total"));

    // An explicit empty value clears the annotation.
    let mut cleared = shop_schema();
    cleared.tables[1].admin_name = Some(String::new());
    let report = sync.sync(db, &cleared).await.unwrap();
    assert_eq!(report.tables.updated, 1);
    let orders = table_named(&store, db, "orders").await.unwrap();
    assert_eq!(orders.admin_name, None);
}

#[tokio::test]
async fn test_column_changes_are_diffed() {
    let (store, db) = store_with_database().await;
    let sync = SchemaSynchronizer::new(store.clone());
    sync.sync(db, &shop_schema()).await.unwrap();

    let mut changed = shop_schema();
    let orders = &mut changed.tables[1];
    orders.columns[2].data_type = "MONEY".to_string();
    orders.columns.push(IncomingColumn::new("placed_at", "DATETIME"));
    changed.tables[0].columns.retain(|c| c.name != "name");

    let report = sync.sync(db, &changed).await.unwrap();
    assert_eq!(report.columns.updated, 1);
    assert_eq!(report.columns.inserted, 1);
    assert_eq!(report.columns.deleted, 1);
    assert_eq!(report.tables.total(), 0);
}

#[tokio::test]
async fn test_dropped_table_takes_columns_and_relationships() {
    let (store, db) = store_with_database().await;
    let sync = SchemaSynchronizer::new(store.clone());
    sync.sync(db, &shop_schema()).await.unwrap();
    let legacy = table_named(&store, db, "legacy_notes").await.unwrap();

    let report = sync.sync(db, &without_legacy_notes()).await.unwrap();

    assert_eq!(report.tables.deleted, 1);
    assert_eq!(report.columns.deleted, 3);
    assert_eq!(report.relationships.deleted, 1);
    assert!(table_named(&store, db, "legacy_notes").await.is_none());
    assert!(store.get_columns(legacy.id).await.unwrap().is_empty());
    assert!(store.get_relationships(legacy.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_table_names_are_rejected() {
    let (store, db) = store_with_database().await;
    let sync = SchemaSynchronizer::new(store.clone());

    let mut schema = shop_schema();
    schema.tables.push(IncomingTable::new("Orders", vec![]));

    let err = sync.sync(db, &schema).await.unwrap_err();
    assert!(matches!(err, MetadataError::Invalid(_)));
    assert!(store.get_tables(db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_or_inactive_database() {
    let (store, db) = store_with_database().await;
    let sync = SchemaSynchronizer::new(store.clone());

    let err = sync.sync(db + 100, &shop_schema()).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));

    store.deactivate_database_target(db).await.unwrap();
    let err = sync.sync(db, &shop_schema()).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

/// Delegates to the real writer but fails on the first relationship delete.
struct FailOnRelationshipDelete<'a> {
    inner: &'a mut dyn SchemaWriter,
}

impl SchemaWriter for FailOnRelationshipDelete<'_> {
    fn tables(&mut self, database_id: i64) -> MetadataResult<Vec<TableMetadata>> {
        self.inner.tables(database_id)
    }

    fn columns(&mut self, table_id: i64) -> MetadataResult<Vec<ColumnMetadata>> {
        self.inner.columns(table_id)
    }

    fn relationships(&mut self, database_id: i64) -> MetadataResult<Vec<RelationshipMetadata>> {
        self.inner.relationships(database_id)
    }

    fn insert_table(&mut self, database_id: i64, table: &IncomingTable) -> MetadataResult<i64> {
        self.inner.insert_table(database_id, table)
    }

    fn update_table(&mut self, table_id: i64, admin_name: Option<&str>, description: Option<&str>) -> MetadataResult<()> {
        self.inner.update_table(table_id, admin_name, description)
    }

    fn delete_table(&mut self, table_id: i64) -> MetadataResult<()> {
        self.inner.delete_table(table_id)
    }

    fn insert_column(&mut self, table_id: i64, column: &IncomingColumn) -> MetadataResult<i64> {
        self.inner.insert_column(table_id, column)
    }

    fn update_column(&mut self, column: &ColumnMetadata) -> MetadataResult<()> {
        self.inner.update_column(column)
    }

    fn delete_column(&mut self, column_id: i64) -> MetadataResult<()> {
        self.inner.delete_column(column_id)
    }

    fn insert_relationship(&mut self, database_id: i64, rel: &NewRelationship) -> MetadataResult<i64> {
        self.inner.insert_relationship(database_id, rel)
    }

    fn update_relationship(&mut self, relationship_id: i64, kind: RelationshipKind, is_enforced: bool) -> MetadataResult<()> {
        self.inner.update_relationship(relationship_id, kind, is_enforced)
    }

    fn delete_relationship(&mut self, _relationship_id: i64) -> MetadataResult<()> {
        Err(MetadataError::Invalid("injected failure".to_string()))
    }
}

#[tokio::test]
async fn test_failure_after_table_delete_rolls_everything_back() {
    let (store, db) = store_with_database().await;
    let sync = SchemaSynchronizer::new(store.clone());
    sync.sync(db, &shop_schema()).await.unwrap();
    let legacy = table_named(&store, db, "legacy_notes").await.unwrap();

    let incoming = without_legacy_notes();
    let result = store
        .apply_schema_changes(&|writer: &mut dyn SchemaWriter| {
            let mut failing = FailOnRelationshipDelete { inner: writer };
            apply_schema(&mut failing, db, &incoming)
        })
        .await;

    assert!(matches!(result, Err(MetadataError::Invalid(msg)) if msg == "injected failure"));

    let tables = store.get_tables(db).await.unwrap();
    assert_eq!(tables.len(), 3);
    assert_eq!(store.get_columns(legacy.id).await.unwrap().len(), 3);
    assert_eq!(store.get_relationships(legacy.id).await.unwrap().len(), 1);

    // The real sync still sees the untouched state.
    let report = sync.sync(db, &shop_schema()).await.unwrap();
    assert!(report.is_noop());
}

#[tokio::test]
async fn test_concurrent_syncs_insert_each_table_once() {
    let (store, db) = store_with_database().await;
    let sync = Arc::new(SchemaSynchronizer::new(store.clone()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sync = sync.clone();
            tokio::spawn(async move { sync.sync(db, &shop_schema()).await.unwrap() })
        })
        .collect();

    let mut inserted = 0;
    for handle in handles {
        inserted += handle.await.unwrap().tables.inserted;
    }

    assert_eq!(inserted, 3);
    assert_eq!(store.get_tables(db).await.unwrap().len(), 3);
}

/// Delegates to SQLite but keeps every transaction open across an await point,
/// recording how many were in flight at once.
struct SlowStore {
    inner: Arc<SqliteMetadataStore>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SlowStore {
    fn new(inner: Arc<SqliteMetadataStore>) -> Self {
        Self {
            inner,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MetadataStore for SlowStore {
    async fn get_database_target(&self, database_id: i64) -> MetadataResult<Option<DatabaseTarget>> {
        self.inner.get_database_target(database_id).await
    }

    async fn list_database_targets(&self, include_inactive: bool) -> MetadataResult<Vec<DatabaseTarget>> {
        self.inner.list_database_targets(include_inactive).await
    }

    async fn add_database_target(&self, target: NewDatabaseTarget) -> MetadataResult<i64> {
        self.inner.add_database_target(target).await
    }

    async fn update_database_target(&self, target: &DatabaseTarget) -> MetadataResult<()> {
        self.inner.update_database_target(target).await
    }

    async fn deactivate_database_target(&self, database_id: i64) -> MetadataResult<bool> {
        self.inner.deactivate_database_target(database_id).await
    }

    async fn engine_type_name(&self, engine_type_id: i64) -> MetadataResult<Option<String>> {
        self.inner.engine_type_name(engine_type_id).await
    }

    async fn engine_type_id(&self, name: &str) -> MetadataResult<Option<i64>> {
        self.inner.engine_type_id(name).await
    }

    async fn get_tables(&self, database_id: i64) -> MetadataResult<Vec<TableMetadata>> {
        self.inner.get_tables(database_id).await
    }

    async fn get_columns(&self, table_id: i64) -> MetadataResult<Vec<ColumnMetadata>> {
        self.inner.get_columns(table_id).await
    }

    async fn get_relationships(&self, table_id: i64) -> MetadataResult<Vec<RelationshipMetadata>> {
        self.inner.get_relationships(table_id).await
    }

    async fn apply_schema_changes(
        &self,
        apply: &(dyn for<'w> Fn(&'w mut (dyn SchemaWriter + 'w)) -> MetadataResult<SyncReport> + Sync),
    ) -> MetadataResult<SyncReport> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(25)).await;
        let result = self.inner.apply_schema_changes(apply).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[tokio::test]
async fn test_syncs_of_one_database_never_overlap() {
    let (inner, db) = store_with_database().await;
    let store = Arc::new(SlowStore::new(inner));
    let sync = SchemaSynchronizer::new(store.clone());

    let (schema_a, schema_b) = (shop_schema(), shop_schema());
    let (first, second) = tokio::join!(sync.sync(db, &schema_a), sync.sync(db, &schema_b));

    assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(first.unwrap().tables.inserted + second.unwrap().tables.inserted, 3);
}

#[tokio::test]
async fn test_syncs_of_different_databases_run_together() {
    let (inner, db) = store_with_database().await;
    let other = inner
        .add_database_target(NewDatabaseTarget {
            name: "warehouse".to_string(),
            engine_type_id: 4,
            connection: TargetConnection {
                host: ":memory:".to_string(),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    let store = Arc::new(SlowStore::new(inner));
    let sync = SchemaSynchronizer::new(store.clone());

    let (schema_a, schema_b) = (shop_schema(), shop_schema());
    let (first, second) = tokio::join!(sync.sync(db, &schema_a), sync.sync(other, &schema_b));

    assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 2);
    assert_eq!(first.unwrap().tables.inserted, 3);
    assert_eq!(second.unwrap().tables.inserted, 3);
}
