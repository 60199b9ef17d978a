//! Driver-bridge backend for SQL Server, MySQL and Oracle.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::{DbError, DbResult};
use super::value::{QueryResult, SqlValue};
use super::DbConnection;
use crate::bridge::protocol::ConnectionParams;
use crate::bridge::BridgeClient;
use crate::config::Engine;
use crate::metadata::{IncomingColumn, IncomingRelationship, IncomingSchema, IncomingTable};

/// A logical connection served by the shared bridge process.
///
/// The bridge pools physical connections per connection string, so this type
/// only carries the parameters sent with every request.
pub struct BridgeConnection {
    client: Arc<BridgeClient>,
    engine: Engine,
    params: ConnectionParams,
}

impl BridgeConnection {
    /// Open by pinging the database through the bridge.
    pub async fn open(client: Arc<BridgeClient>, engine: Engine, connection_string: &str) -> DbResult<Self> {
        let params = ConnectionParams {
            driver: engine.bridge_driver().to_string(),
            connection_string: connection_string.to_string(),
        };

        let info = client
            .database_info(params.clone())
            .await
            .map_err(DbError::from_bridge_open)?;

        tracing::debug!(
            product = %info.database.product_name,
            version = %info.database.product_version,
            database = %info.database.database_name,
            "bridge connection open"
        );

        Ok(Self {
            client,
            engine,
            params,
        })
    }
}

#[async_trait]
impl DbConnection for BridgeConnection {
    fn engine(&self) -> Engine {
        self.engine
    }

    async fn execute(&self, sql: &str) -> DbResult<QueryResult> {
        let response = self
            .client
            .execute_query(self.params.clone(), sql)
            .await
            .map_err(DbError::from_bridge_query)?;

        let columns: Vec<String> = response.columns.iter().map(|c| c.name.clone()).collect();
        let rows = response
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&response.columns)
                    .map(|(value, column)| SqlValue::from_json(value, &column.data_type))
                    .collect()
            })
            .collect();

        Ok(QueryResult::new(columns, rows))
    }

    async fn introspect(&self) -> DbResult<IncomingSchema> {
        let listing = self
            .client
            .list_tables(self.params.clone())
            .await
            .map_err(DbError::from_bridge_query)?;

        let mut schema = IncomingSchema::default();
        for info in listing.tables.iter().filter(|t| t.table_type == "TABLE") {
            let detail = self
                .client
                .get_table(self.params.clone(), &info.schema, &info.name)
                .await
                .map_err(DbError::from_bridge_query)?
                .table;

            let pk_columns = detail
                .primary_key
                .as_ref()
                .map(|pk| pk.columns.clone())
                .unwrap_or_default();

            let mut columns = detail.columns;
            columns.sort_by_key(|c| c.position);

            schema.tables.push(IncomingTable::new(
                detail.name.clone(),
                columns
                    .into_iter()
                    .map(|c| IncomingColumn {
                        is_primary_key: pk_columns.iter().any(|pk| pk.eq_ignore_ascii_case(&c.name)),
                        name: c.name,
                        data_type: c.data_type,
                        is_nullable: c.is_nullable,
                        admin_name: None,
                        description: None,
                    })
                    .collect(),
            ));

            // Composite keys are recorded by their first column pair.
            for fk in &detail.foreign_keys {
                if let (Some(from), Some(to)) = (fk.columns.first(), fk.referenced_columns.first()) {
                    schema.relationships.push(IncomingRelationship::foreign_key(
                        detail.name.clone(),
                        from.clone(),
                        fk.referenced_table.clone(),
                        to.clone(),
                    ));
                }
            }
        }

        Ok(schema)
    }

    /// The bridge pools physical connections per connection string (see
    /// `[bridge.pool]`), so there is no per-handle state to release here.
    async fn close(&self) -> DbResult<()> {
        Ok(())
    }
}
