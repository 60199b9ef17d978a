use askdb::metadata::{
    IncomingColumn, IncomingRelationship, IncomingSchema, IncomingTable, MetadataError, MetadataStore,
    MetadataStoreExt, NewDatabaseTarget, NewRelationship, RelationshipKind, SchemaWriter,
    SqliteMetadataStore, SyncReport, TargetConnection,
};

fn target(name: &str, engine_type_id: i64) -> NewDatabaseTarget {
    NewDatabaseTarget {
        name: name.to_string(),
        engine_type_id,
        connection: TargetConnection {
            host: "db01".to_string(),
            database: name.to_lowercase(),
            username: Some("reader".to_string()),
            password: Some("pw".to_string()),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_targets_round_trip_through_the_store() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();

    let sales = store.add_database_target(target("Sales", 1)).await.unwrap();
    let hr = store.add_database_target(target("HR", 2)).await.unwrap();
    assert_ne!(sales, hr);

    let loaded = store.get_database_target(sales).await.unwrap().unwrap();
    assert_eq!(loaded.name, "Sales");
    assert_eq!(loaded.engine_kind, "SQL Server");
    assert_eq!(loaded.connection.database, "sales");
    assert_eq!(loaded.connection.password.as_deref(), Some("pw"));

    let names: Vec<_> = store
        .list_database_targets(false)
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["Sales", "HR"]);

    assert!(store.get_database_target(999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_update_target() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    let id = store.add_database_target(target("Sales", 1)).await.unwrap();

    let mut loaded = store.get_database_target(id).await.unwrap().unwrap();
    loaded.name = "Sales (EU)".to_string();
    loaded.engine_type_id = 3;
    loaded.connection.port = Some(1522);
    store.update_database_target(&loaded).await.unwrap();

    let reloaded = store.get_database_target(id).await.unwrap().unwrap();
    assert_eq!(reloaded.name, "Sales (EU)");
    assert_eq!(reloaded.engine_kind, "Oracle");
    assert_eq!(reloaded.connection.port, Some(1522));

    loaded.id = 404;
    let err = store.update_database_target(&loaded).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

#[tokio::test]
async fn test_require_active_target() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    let id = store.add_database_target(target("Sales", 1)).await.unwrap();

    assert_eq!(store.require_active_target(id).await.unwrap().id, id);

    let err = store.require_active_target(id + 1).await.unwrap_err();
    assert!(matches!(&err, MetadataError::NotFound(msg) if msg.contains("not registered")));

    store.deactivate_database_target(id).await.unwrap();
    let err = store.require_active_target(id).await.unwrap_err();
    assert!(matches!(&err, MetadataError::NotFound(msg) if msg.contains("removed")));

    // Soft-deleted rows are still readable directly.
    let row = store.get_database_target(id).await.unwrap().unwrap();
    assert!(!row.is_active);
}

#[tokio::test]
async fn test_registered_engine_type_resolves_by_name() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    let id = store.register_engine_type("PostgreSQL").unwrap();

    assert_eq!(store.engine_type_id("postgresql").await.unwrap(), Some(id));
    assert_eq!(store.engine_type_name(id).await.unwrap().as_deref(), Some("PostgreSQL"));

    // Registering twice returns the same id.
    assert_eq!(store.register_engine_type("PostgreSQL").unwrap(), id);
}

#[tokio::test]
async fn test_load_snapshot_resolves_relationship_names() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    let db = store.add_database_target(target("Shop", 4)).await.unwrap();

    let incoming = IncomingSchema {
        tables: vec![
            IncomingTable::new("customers", vec![IncomingColumn::new("id", "INTEGER").primary_key()])
                .with_admin("Customers", "People who buy things"),
            IncomingTable::new(
                "orders",
                vec![
                    IncomingColumn::new("id", "INTEGER").primary_key(),
                    IncomingColumn::new("customer_id", "INTEGER"),
                ],
            ),
        ],
        relationships: vec![IncomingRelationship::foreign_key("orders", "customer_id", "customers", "id")],
    };

    store
        .apply_schema_changes(&|writer: &mut dyn SchemaWriter| {
            let mut ids = Vec::new();
            for table in &incoming.tables {
                let table_id = writer.insert_table(db, table)?;
                let mut column_ids = Vec::new();
                for column in &table.columns {
                    column_ids.push(writer.insert_column(table_id, column)?);
                }
                ids.push((table_id, column_ids));
            }
            writer.insert_relationship(
                db,
                &NewRelationship {
                    from_table_id: ids[1].0,
                    from_column_id: ids[1].1[1],
                    to_table_id: ids[0].0,
                    to_column_id: ids[0].1[0],
                    kind: RelationshipKind::ManyToOne,
                    is_enforced: false,
                },
            )?;
            Ok(SyncReport::default())
        })
        .await
        .unwrap();

    let snapshot = store.load_snapshot(db).await.unwrap();
    assert_eq!(snapshot.database.name, "Shop");
    assert_eq!(snapshot.tables.len(), 2);

    let customers = &snapshot.tables[0];
    assert_eq!(customers.table.admin_name.as_deref(), Some("Customers"));
    assert!(customers.relationships.is_empty());

    let orders = &snapshot.tables[1];
    assert_eq!(orders.columns.len(), 2);
    assert_eq!(orders.relationships.len(), 1);
    let rel = &orders.relationships[0];
    assert_eq!(
        (rel.from_table.as_str(), rel.from_column.as_str(), rel.to_table.as_str(), rel.to_column.as_str()),
        ("orders", "customer_id", "customers", "id")
    );
    assert!(!rel.is_enforced);
}

#[tokio::test]
async fn test_load_snapshot_of_removed_database() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    let db = store.add_database_target(target("Shop", 4)).await.unwrap();
    store.deactivate_database_target(db).await.unwrap();

    let err = store.load_snapshot(db).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}

#[tokio::test]
async fn test_table_names_unique_per_database() {
    let store = SqliteMetadataStore::open_in_memory().unwrap();
    let db = store.add_database_target(target("Shop", 4)).await.unwrap();
    let other = store.add_database_target(target("Other", 4)).await.unwrap();

    let result = store
        .apply_schema_changes(&|writer: &mut dyn SchemaWriter| {
            writer.insert_table(db, &IncomingTable::new("orders", vec![]))?;
            writer.insert_table(other, &IncomingTable::new("orders", vec![]))?;
            writer.insert_table(db, &IncomingTable::new("ORDERS", vec![]))?;
            Ok(SyncReport::default())
        })
        .await;

    assert!(matches!(result, Err(MetadataError::Sqlite(_))));
    assert!(store.get_tables(db).await.unwrap().is_empty());
    assert!(store.get_tables(other).await.unwrap().is_empty());
}

#[test]
fn test_newer_store_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metadata.db");
    drop(SqliteMetadataStore::open(&path).unwrap());

    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute("UPDATE meta SET value = '99' WHERE key = 'version'", [])
        .unwrap();
    drop(conn);

    let err = SqliteMetadataStore::open(&path).err().unwrap();
    assert!(matches!(err, MetadataError::Invalid(msg) if msg.contains("99")));
}
