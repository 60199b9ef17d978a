//! Async client for the driver bridge process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};

use super::error::{BridgeError, BridgeResult};
use super::protocol::{
    methods, ConnectionOnlyParams, ConnectionParams, ErrorInfo, ExecuteQueryParams,
    ExecuteQueryResponse, GetDatabaseInfoResponse, GetTableParams, GetTableResponse,
    ListTablesResponse, RequestEnvelope, ResponseEnvelope,
};
use crate::config::Settings;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>>;

/// Client for the driver bridge.
///
/// The bridge is a long-running child process that owns the native drivers for
/// SQL Server, MySQL and Oracle. Requests go over stdin, responses come back on
/// stdout, one JSON object per line. Every request has its own id so concurrent
/// callers can share the process.
pub struct BridgeClient {
    stdin: Arc<Mutex<BufWriter<ChildStdin>>>,
    pending: PendingMap,
    _child: Child,
    reader_task: tokio::task::JoinHandle<()>,
    timeout: Duration,
}

impl BridgeClient {
    /// Spawn the bridge described by `settings`, passing pool flags.
    pub async fn spawn_with_settings(settings: &Settings) -> BridgeResult<Self> {
        let path = settings.bridge_path().ok_or_else(|| {
            BridgeError::NotFound("set bridge.path in askdb.toml".to_string())
        })?;
        let args = settings.bridge.pool.to_bridge_args();
        let timeout = Duration::from_secs(settings.bridge.timeout_seconds.max(1));

        Self::spawn(&path, &args, timeout).await
    }

    /// Spawn a bridge binary with arguments and a per-request timeout.
    pub async fn spawn<P: AsRef<Path>>(
        bridge_path: P,
        args: &[String],
        timeout: Duration,
    ) -> BridgeResult<Self> {
        let mut child = Command::new(bridge_path.as_ref())
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(BridgeError::SpawnFailed)?;

        let stdin = child.stdin.take().ok_or(BridgeError::Exited)?;
        let stdout = child.stdout.take().ok_or(BridgeError::Exited)?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_task = Self::spawn_reader_task(stdout, pending.clone());

        tracing::info!(path = %bridge_path.as_ref().display(), "driver bridge started");

        Ok(Self {
            stdin: Arc::new(Mutex::new(BufWriter::new(stdin))),
            pending,
            _child: child,
            reader_task,
            timeout,
        })
    }

    fn spawn_reader_task(stdout: ChildStdout, pending: PendingMap) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => match serde_json::from_str::<ResponseEnvelope>(&line) {
                        Ok(resp) => {
                            if let Some(tx) = pending.lock().await.remove(&resp.id) {
                                let _ = tx.send(resp);
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "unparseable bridge response"),
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "bridge read error");
                        break;
                    }
                }
            }

            // Fail everything still waiting.
            let mut pending = pending.lock().await;
            for (id, tx) in pending.drain() {
                let _ = tx.send(ResponseEnvelope {
                    id,
                    success: false,
                    result: None,
                    error: Some(ErrorInfo {
                        code: "BRIDGE_EXITED".to_string(),
                        message: "driver bridge exited".to_string(),
                    }),
                });
            }
        })
    }

    /// Send a request and wait for its response.
    pub async fn request<P, R>(&self, method: &str, params: P) -> BridgeResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = uuid::Uuid::new_v4().to_string();
        let request = RequestEnvelope {
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params).map_err(BridgeError::SerializeFailed)?,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        {
            let line = serde_json::to_string(&request).map_err(BridgeError::SerializeFailed)? + "\n";
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().await.remove(&id);
                return Err(BridgeError::WriteFailed(e));
            }
            stdin.flush().await.map_err(BridgeError::WriteFailed)?;
        }

        tracing::debug!(method, %id, "bridge request sent");

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(received) => received?,
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(BridgeError::Timeout(self.timeout.as_secs()));
            }
        };

        if response.success {
            let result = response.result.unwrap_or(serde_json::Value::Null);
            serde_json::from_value(result).map_err(BridgeError::DeserializeFailed)
        } else {
            let error = response.error.unwrap_or_else(|| ErrorInfo {
                code: "UNKNOWN".to_string(),
                message: "unknown bridge error".to_string(),
            });
            Err(BridgeError::classify(&error.code, &error.message))
        }
    }

    /// True until the bridge closes its stdout.
    pub fn is_alive(&self) -> bool {
        !self.reader_task.is_finished()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

// Convenience methods for the calls askdb makes.
impl BridgeClient {
    /// Open-and-ping: fails if the database is unreachable.
    pub async fn database_info(
        &self,
        connection: ConnectionParams,
    ) -> BridgeResult<GetDatabaseInfoResponse> {
        self.request(methods::GET_DATABASE_INFO, ConnectionOnlyParams { connection })
            .await
    }

    pub async fn list_tables(&self, connection: ConnectionParams) -> BridgeResult<ListTablesResponse> {
        self.request(methods::LIST_TABLES, ConnectionOnlyParams { connection })
            .await
    }

    pub async fn get_table(
        &self,
        connection: ConnectionParams,
        schema: &str,
        table: &str,
    ) -> BridgeResult<GetTableResponse> {
        self.request(
            methods::GET_TABLE,
            GetTableParams {
                connection,
                schema: schema.to_string(),
                table: table.to_string(),
            },
        )
        .await
    }

    pub async fn execute_query(
        &self,
        connection: ConnectionParams,
        sql: &str,
    ) -> BridgeResult<ExecuteQueryResponse> {
        self.request(
            methods::EXECUTE_QUERY,
            ExecuteQueryParams {
                connection,
                sql: sql.to_string(),
            },
        )
        .await
    }
}
