//! In-process SQLite backend.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use super::error::{DbError, DbResult};
use super::value::{QueryResult, SqlValue};
use super::DbConnection;
use crate::config::Engine;
use crate::metadata::{IncomingColumn, IncomingRelationship, IncomingSchema, IncomingTable};

/// A SQLite database opened through rusqlite.
///
/// rusqlite is blocking, so every call runs on the blocking pool. The handle is
/// released by [`DbConnection::close`] or when the last reference drops.
pub struct SqliteConnection {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteConnection {
    /// Open an existing file (or `:memory:`). Never creates a missing file.
    pub async fn open(path: &str) -> DbResult<Self> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || {
            if path == ":memory:" {
                return Connection::open_in_memory();
            }
            Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        })
        .await
        .map_err(|e| DbError::Internal(e.to_string()))?
        .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> DbResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> DbResult<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| DbError::Internal("sqlite connection lock poisoned".to_string()))?;
            let conn = guard
                .as_ref()
                .ok_or_else(|| DbError::ConnectionFailed("connection is closed".to_string()))?;
            f(conn)
        })
        .await
        .map_err(|e| DbError::Internal(e.to_string()))?
    }
}

#[async_trait]
impl DbConnection for SqliteConnection {
    fn engine(&self) -> Engine {
        Engine::Sqlite
    }

    async fn execute(&self, sql: &str) -> DbResult<QueryResult> {
        let sql = sql.to_string();
        self.with_conn(move |conn| run_statement(conn, &sql)).await
    }

    async fn introspect(&self) -> DbResult<IncomingSchema> {
        self.with_conn(introspect_schema).await
    }

    async fn close(&self) -> DbResult<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let taken = conn
                .lock()
                .map_err(|_| DbError::Internal("sqlite connection lock poisoned".to_string()))?
                .take();
            match taken {
                Some(conn) => conn.close().map_err(|(_, e)| DbError::Internal(e.to_string())),
                None => Ok(()),
            }
        })
        .await
        .map_err(|e| DbError::Internal(e.to_string()))?
    }
}

fn query_err(e: rusqlite::Error) -> DbError {
    DbError::QueryFailed(e.to_string())
}

fn run_statement(conn: &Connection, sql: &str) -> DbResult<QueryResult> {
    let mut stmt = conn.prepare(sql).map_err(query_err)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    if columns.is_empty() {
        stmt.execute([]).map_err(query_err)?;
        return Ok(QueryResult::new(columns, Vec::new()));
    }

    let mut rows = stmt.query([]).map_err(query_err)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(query_err)? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(convert(row.get_ref(i).map_err(query_err)?));
        }
        out.push(values);
    }

    Ok(QueryResult::new(columns, out))
}

fn convert(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Int(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Text(format!("<{} bytes>", b.len())),
    }
}

fn introspect_schema(conn: &Connection) -> DbResult<IncomingSchema> {
    let table_names: Vec<String> = {
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<_, _>>().map_err(query_err)?
    };

    let mut schema = IncomingSchema::default();

    for name in &table_names {
        let mut stmt = conn
            .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")
            .map_err(query_err)?;
        let columns = stmt
            .query_map([name], |row| {
                let data_type: String = row.get(1)?;
                let not_null: bool = row.get(2)?;
                let pk: i64 = row.get(3)?;
                Ok(IncomingColumn {
                    name: row.get(0)?,
                    data_type: if data_type.is_empty() {
                        "ANY".to_string()
                    } else {
                        data_type
                    },
                    is_nullable: !not_null && pk == 0,
                    is_primary_key: pk > 0,
                    admin_name: None,
                    description: None,
                })
            })
            .map_err(query_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_err)?;

        schema.tables.push(IncomingTable::new(name.clone(), columns));
    }

    for name in &table_names {
        let mut stmt = conn
            .prepare("SELECT \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq")
            .map_err(query_err)?;
        let keys = stmt
            .query_map([name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(query_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_err)?;

        for (to_table, from_column, to_column) in keys {
            // `REFERENCES t` without a column points at t's primary key.
            let to_column = to_column.or_else(|| {
                schema
                    .find_table(&to_table)
                    .and_then(|t| t.columns.iter().find(|c| c.is_primary_key))
                    .map(|c| c.name.clone())
            });
            let Some(to_column) = to_column else {
                continue;
            };

            schema.relationships.push(IncomingRelationship::foreign_key(
                name.clone(),
                from_column,
                to_table,
                to_column,
            ));
        }
    }

    Ok(schema)
}
