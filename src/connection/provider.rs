//! Connection resolution, opening and testing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;

use super::bridge::BridgeConnection;
use super::error::{DbError, DbResult};
use super::sqlite::SqliteConnection;
use super::{DbConnection, OpenConnection};
use crate::bridge::BridgeClient;
use crate::config::{ConnectionConfig, Engine, Settings};
use crate::metadata::{DatabaseTarget, TargetConnection};

/// A resolved, not yet opened connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub engine: Engine,
    pub connection_string: String,
    /// Short SHA-256 fingerprint, safe to log.
    pub fingerprint: String,
    /// Human-readable name of the target.
    pub label: String,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("engine", &self.engine)
            .field("fingerprint", &self.fingerprint)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Fingerprint of engine + connection string.
///
/// Identifies a connection in logs without exposing credentials.
pub fn fingerprint(engine: Engine, connection_string: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(engine.as_str().as_bytes());
    hasher.update(b"\0");
    hasher.update(connection_string.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..12].to_string()
}

/// Opens backend connections for resolved handles.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open the connection, failing fast when the database is unreachable.
    async fn connect(&self, handle: &ConnectionHandle) -> DbResult<Box<dyn DbConnection>>;
}

/// Production factory: SQLite in-process, everything else through the bridge.
///
/// The bridge process is spawned on first use and shared afterwards.
pub struct DriverConnectionFactory {
    settings: Settings,
    bridge: OnceCell<Arc<BridgeClient>>,
}

impl DriverConnectionFactory {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            bridge: OnceCell::new(),
        }
    }

    async fn bridge(&self) -> DbResult<Arc<BridgeClient>> {
        self.bridge
            .get_or_try_init(|| async {
                BridgeClient::spawn_with_settings(&self.settings)
                    .await
                    .map(Arc::new)
                    .map_err(DbError::from_bridge_open)
            })
            .await
            .cloned()
    }
}

#[async_trait]
impl ConnectionFactory for DriverConnectionFactory {
    async fn connect(&self, handle: &ConnectionHandle) -> DbResult<Box<dyn DbConnection>> {
        if handle.engine.is_embedded() {
            let conn = SqliteConnection::open(&handle.connection_string).await?;
            return Ok(Box::new(conn));
        }

        let client = self.bridge().await?;
        let conn = BridgeConnection::open(client, handle.engine, &handle.connection_string).await?;
        Ok(Box::new(conn))
    }
}

/// Outcome of a connection test. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    pub message: String,
    pub detail: Option<String>,
}

/// Resolves database targets to connections and opens them under a deadline.
#[derive(Clone)]
pub struct ConnectionProvider {
    factory: Arc<dyn ConnectionFactory>,
    timeout: Duration,
}

impl ConnectionProvider {
    pub fn new(factory: Arc<dyn ConnectionFactory>, timeout: Duration) -> Self {
        Self { factory, timeout }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Arc::new(DriverConnectionFactory::new(settings.clone())),
            settings.query.timeout(),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Resolve an engine kind name and stored connection fields to a handle.
    ///
    /// Unknown engine kinds fail with `UnsupportedEngine`.
    pub fn resolve(engine_kind: &str, params: &TargetConnection) -> DbResult<ConnectionHandle> {
        let engine: Engine = engine_kind.parse()?;
        let config = ConnectionConfig {
            engine,
            host: params.host.clone(),
            database: params.database.clone(),
            port: params.port,
            trusted_connection: params.trusted_connection,
            username: params.username.clone(),
            password: params.password.clone(),
            connection_string: params.connection_string.clone(),
        };
        let connection_string = config.to_connection_string()?;

        Ok(ConnectionHandle {
            engine,
            fingerprint: fingerprint(engine, &connection_string),
            connection_string,
            label: if params.database.is_empty() {
                params.host.clone()
            } else {
                params.database.clone()
            },
        })
    }

    /// Resolve a registered target.
    pub fn resolve_target(target: &DatabaseTarget) -> DbResult<ConnectionHandle> {
        let mut handle = Self::resolve(&target.engine_kind, &target.connection)?;
        handle.label = target.name.clone();
        Ok(handle)
    }

    /// Open a connection to a registered target.
    pub async fn open(&self, target: &DatabaseTarget) -> DbResult<OpenConnection> {
        let handle = Self::resolve_target(target)?;
        self.open_handle(&handle).await
    }

    /// Open a resolved handle within the deadline.
    pub async fn open_handle(&self, handle: &ConnectionHandle) -> DbResult<OpenConnection> {
        let started = Instant::now();
        let inner = self.run(self.factory.connect(handle)).await?;

        tracing::info!(
            engine = %handle.engine,
            fingerprint = %handle.fingerprint,
            target = %handle.label,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "connection opened"
        );
        Ok(OpenConnection::new(inner, handle.fingerprint.clone()))
    }

    /// Run a database future under the deadline.
    pub async fn run<T, F>(&self, fut: F) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(DbError::Timeout(self.timeout.as_secs())),
        }
    }

    /// Try to open and close a target, reporting the outcome instead of failing.
    pub async fn test_connection(&self, target: &DatabaseTarget) -> ConnectionTestResult {
        match self.open(target).await {
            Ok(connection) => {
                connection.close().await;
                ConnectionTestResult {
                    success: true,
                    message: format!("Connected to {} ({})", target.name, target.engine_kind),
                    detail: None,
                }
            }
            Err(err) => {
                tracing::warn!(database_id = target.id, error = %err, "connection test failed");
                ConnectionTestResult {
                    success: false,
                    message: format!("Could not connect to {}", target.name),
                    detail: Some(err.to_string()),
                }
            }
        }
    }
}
