//! Wire types for the driver bridge.
//!
//! One JSON object per line in each direction. Requests carry a UUID `id` that the
//! bridge echoes back, so responses can arrive out of order.

use serde::{Deserialize, Serialize};

// ============================================================================
// Envelope
// ============================================================================

/// Request envelope sent to the bridge.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    pub id: String,
    pub method: String,
    pub params: serde_json::Value,
}

/// Response envelope received from the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    pub id: String,
    pub success: bool,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

/// Error information in a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Requests
// ============================================================================

/// Connection parameters included in every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Bridge driver name (mssql, mysql, oracle).
    pub driver: String,
    pub connection_string: String,
}

/// Parameters for methods that only need a connection.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionOnlyParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
}

/// Parameters for `metadata.get_table`.
#[derive(Debug, Clone, Serialize)]
pub struct GetTableParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub schema: String,
    pub table: String,
}

/// Parameters for `query.execute`.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteQueryParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub sql: String,
}

// ============================================================================
// Responses
// ============================================================================

/// Database information returned by `metadata.get_database_info`.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseInfo {
    pub product_name: String,
    pub product_version: String,
    pub database_name: String,
    #[serde(default)]
    pub default_schema: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetDatabaseInfoResponse {
    pub database: DatabaseInfo,
}

/// Basic table information.
#[derive(Debug, Clone, Deserialize)]
pub struct TableInfo {
    pub schema: String,
    pub name: String,
    /// "TABLE" or "VIEW".
    #[serde(rename = "type")]
    pub table_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListTablesResponse {
    pub tables: Vec<TableInfo>,
}

/// Column information.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Ordinal position (1-based).
    pub position: i32,
    pub data_type: String,
    pub is_nullable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrimaryKeyInfo {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForeignKeyInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

/// Detailed table information.
#[derive(Debug, Clone, Deserialize)]
pub struct TableDetailInfo {
    pub schema: String,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    #[serde(default)]
    pub primary_key: Option<PrimaryKeyInfo>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetTableResponse {
    pub table: TableDetailInfo,
}

/// Column description in query results.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResultColumn {
    pub name: String,
    pub data_type: String,
}

/// Response from `query.execute`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteQueryResponse {
    pub columns: Vec<QueryResultColumn>,
    pub rows: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub rows_affected: Option<i64>,
}

/// Bridge method names.
pub mod methods {
    pub const GET_DATABASE_INFO: &str = "metadata.get_database_info";
    pub const LIST_TABLES: &str = "metadata.list_tables";
    pub const GET_TABLE: &str = "metadata.get_table";
    pub const EXECUTE_QUERY: &str = "query.execute";
}
