use std::sync::Arc;

use askdb::metadata::{
    IncomingColumn, IncomingRelationship, IncomingSchema, IncomingTable, MetadataError, MetadataStore,
    NewDatabaseTarget, SqliteMetadataStore, TargetConnection,
};
use askdb::schema::{render_admin_terms, SchemaContextBuilder, SchemaSynchronizer, NO_TABLES_SENTINEL};

async fn setup() -> (Arc<SqliteMetadataStore>, i64) {
    let store = Arc::new(SqliteMetadataStore::open_in_memory().unwrap());
    let db = store
        .add_database_target(NewDatabaseTarget {
            name: "Shop".to_string(),
            engine_type_id: 4,
            connection: TargetConnection {
                host: ":memory:".to_string(),
                ..Default::default()
            },
        })
        .await
        .unwrap();
    (store, db)
}

fn annotated_shop() -> IncomingSchema {
    let mut name = IncomingColumn::new("name", "TEXT").not_null();
    name.admin_name = Some("Customer Name".to_string());

    let mut total = IncomingColumn::new("total", "DECIMAL(10,2)");
    total.admin_name = Some("Order Total".to_string());
    total.description = Some("Including tax".to_string());

    IncomingSchema {
        tables: vec![
            IncomingTable::new("customers", vec![IncomingColumn::new("id", "INTEGER").primary_key(), name])
                .with_admin("Customers", "People who buy things"),
            IncomingTable::new(
                "orders",
                vec![
                    IncomingColumn::new("id", "INTEGER").primary_key(),
                    IncomingColumn::new("customer_id", "INTEGER"),
                    total,
                ],
            ),
        ],
        relationships: vec![IncomingRelationship::foreign_key("orders", "customer_id", "customers", "id")],
    }
}

#[tokio::test]
async fn test_schema_text_from_store() {
    let (store, db) = setup().await;
    SchemaSynchronizer::new(store.clone())
        .sync(db, &annotated_shop())
        .await
        .unwrap();

    let text = SchemaContextBuilder::new(store.clone())
        .build_schema_text(db)
        .await
        .unwrap();

    insta::assert_snapshot!(text, @r"
    Table: customers (Admin name: Customers) - Description: People who buy things
      Columns:
        - id (INTEGER) [primary key, not null]
        - name (TEXT) [not null] (Admin name: Customer Name)

    Table: orders
      Columns:
        - id (INTEGER) [primary key, not null]
        - customer_id (INTEGER)
        - total (DECIMAL(10,2)) (Admin name: Order Total) - Description: Including tax
      Relationships:
        - many-to-one: orders.customer_id -> customers.id
    ");
}

#[tokio::test]
async fn test_context_carries_admin_terms() {
    let (store, db) = setup().await;
    SchemaSynchronizer::new(store.clone())
        .sync(db, &annotated_shop())
        .await
        .unwrap();

    let context = SchemaContextBuilder::new(store.clone()).build(db).await.unwrap();

    assert_eq!(context.database_name, "Shop");
    assert_eq!(context.engine_kind, "SQLite");
    assert_eq!(context.admin_terms.len(), 5);
    assert_eq!(context.admin_terms["customers"], "Customers");
    assert_eq!(context.admin_terms["customers_description"], "People who buy things");
    assert_eq!(context.admin_terms["customers.name"], "Customer Name");
    assert_eq!(context.admin_terms["orders.total"], "Order Total");
    assert_eq!(context.admin_terms["orders.total_description"], "Including tax");

    assert_eq!(
        render_admin_terms(&context.admin_terms).lines().next(),
        Some("- customers: Customers")
    );
}

#[tokio::test]
async fn test_rendering_is_deterministic() {
    let (store, db) = setup().await;
    SchemaSynchronizer::new(store.clone())
        .sync(db, &annotated_shop())
        .await
        .unwrap();
    let builder = SchemaContextBuilder::new(store.clone());

    let first = builder.build_schema_text(db).await.unwrap();
    let second = builder.build_schema_text(db).await.unwrap();
    assert_eq!(first, second);
    assert!(!first.ends_with('\n'));
}

#[tokio::test]
async fn test_empty_database_renders_sentinel() {
    let (store, db) = setup().await;

    let context = SchemaContextBuilder::new(store.clone()).build(db).await.unwrap();

    assert_eq!(context.schema_text, NO_TABLES_SENTINEL);
    assert!(context.admin_terms.is_empty());
}

#[tokio::test]
async fn test_unknown_database() {
    let (store, db) = setup().await;

    let err = SchemaContextBuilder::new(store.clone())
        .build_schema_text(db + 1)
        .await
        .unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
}
