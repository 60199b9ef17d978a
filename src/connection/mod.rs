//! Connection provider.
//!
//! Resolves a registered database (or explicit connection fields) to an open
//! connection for one of the supported engines.
//!
//! ```text
//! DatabaseTarget ──resolve──▶ ConnectionHandle ──ConnectionFactory::connect──▶ OpenConnection
//!                                                      │
//!                                   ┌──────────────────┴──────────────────┐
//!                                   ▼                                     ▼
//!                          SqliteConnection                       BridgeConnection
//!                          (rusqlite, in-process)                 (askdb-bridge: mssql/mysql/oracle)
//! ```
//!
//! An [`OpenConnection`] owns its backend connection. It is released when the
//! guard is closed or dropped, whichever comes first, so early returns and
//! errors never leak a connection.

mod bridge;
mod error;
mod provider;
mod sqlite;
mod value;

use std::ops::Deref;

use async_trait::async_trait;

pub use bridge::BridgeConnection;
pub use error::{DbError, DbResult};
pub use provider::{
    fingerprint, ConnectionFactory, ConnectionHandle, ConnectionProvider, ConnectionTestResult,
    DriverConnectionFactory,
};
pub use sqlite::SqliteConnection;
pub use value::{parse_datetime, QueryResult, RowMaps, SqlValue};

use crate::config::Engine;
use crate::metadata::IncomingSchema;

/// An open connection to a target database.
#[async_trait]
pub trait DbConnection: Send + Sync {
    fn engine(&self) -> Engine;

    /// Run one statement and collect its rows.
    async fn execute(&self, sql: &str) -> DbResult<QueryResult>;

    /// Read tables, columns and declared foreign keys.
    async fn introspect(&self) -> DbResult<IncomingSchema>;

    /// Release the backend handle. Later calls on this connection fail.
    async fn close(&self) -> DbResult<()>;
}

/// Scoped connection guard.
///
/// Dropping the guard drops the backend handle without the async close, which
/// is enough for SQLite (the file closes with its last reference) and for the
/// bridge (pooled on the bridge side).
pub struct OpenConnection {
    inner: Box<dyn DbConnection>,
    fingerprint: String,
    closed: bool,
}

impl OpenConnection {
    pub fn new(inner: Box<dyn DbConnection>, fingerprint: String) -> Self {
        Self {
            inner,
            fingerprint,
            closed: false,
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Close explicitly. Close errors are logged, not returned.
    pub async fn close(mut self) {
        if let Err(e) = self.inner.close().await {
            tracing::warn!(fingerprint = %self.fingerprint, error = %e, "error closing connection");
        }
        self.closed = true;
    }
}

impl Deref for OpenConnection {
    type Target = dyn DbConnection;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!(fingerprint = %self.fingerprint, "connection released on drop");
        }
    }
}
