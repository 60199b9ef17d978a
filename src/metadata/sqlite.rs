//! SQLite-backed admin metadata store.
//!
//! Default location is `~/.askdb/metadata.db`.
//!
//! # Tables
//!
//! ```text
//! meta                  key/value (schema version)
//! engine_types          id -> display name ("SQL Server", "MySQL", ...)
//! databases             registered targets, soft-deleted via is_active
//! schema_tables         per-database table annotations
//! schema_columns        per-table column annotations (cascade on table delete)
//! schema_relationships  column -> column edges
//! ```

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use super::error::{MetadataError, MetadataResult};
use super::store::{MetadataStore, SchemaWriter};
use super::type_cache::TypeNameCache;
use super::types::*;
use crate::config::Engine;

/// Current store schema version. Bump this when the table layout changes.
const STORE_VERSION: i32 = 1;

/// SQLite implementation of [`MetadataStore`].
pub struct SqliteMetadataStore {
    conn: Mutex<Connection>,
    type_names: TypeNameCache,
}

impl SqliteMetadataStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> MetadataResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Self::init(Connection::open(path)?)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> MetadataResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> MetadataResult<Self> {
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS engine_types (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE COLLATE NOCASE
            );

            CREATE TABLE IF NOT EXISTS databases (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                engine_type_id INTEGER NOT NULL REFERENCES engine_types(id),
                host TEXT NOT NULL DEFAULT '',
                port INTEGER,
                database_name TEXT NOT NULL DEFAULT '',
                trusted_connection INTEGER NOT NULL DEFAULT 0,
                username TEXT,
                password TEXT,
                connection_string TEXT,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE IF NOT EXISTS schema_tables (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                database_id INTEGER NOT NULL REFERENCES databases(id),
                name TEXT NOT NULL COLLATE NOCASE,
                admin_name TEXT,
                description TEXT,
                UNIQUE (database_id, name)
            );

            CREATE TABLE IF NOT EXISTS schema_columns (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_id INTEGER NOT NULL REFERENCES schema_tables(id) ON DELETE CASCADE,
                name TEXT NOT NULL COLLATE NOCASE,
                data_type TEXT NOT NULL,
                is_nullable INTEGER NOT NULL DEFAULT 1,
                is_primary_key INTEGER NOT NULL DEFAULT 0,
                is_lookup INTEGER NOT NULL DEFAULT 0,
                admin_name TEXT,
                description TEXT,
                UNIQUE (table_id, name)
            );

            CREATE TABLE IF NOT EXISTS schema_relationships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                database_id INTEGER NOT NULL,
                from_table_id INTEGER NOT NULL,
                from_column_id INTEGER NOT NULL,
                to_table_id INTEGER NOT NULL,
                to_column_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                is_enforced INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_relationships_from
                ON schema_relationships (from_table_id);
            ",
        )?;

        let version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                row.get::<_, String>(0)
            })
            .optional()?
            .and_then(|v| v.parse().ok());

        match version {
            Some(v) if v > STORE_VERSION => {
                return Err(MetadataError::Invalid(format!(
                    "metadata store version {} is newer than supported version {}",
                    v, STORE_VERSION
                )));
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?1)",
                    params![STORE_VERSION.to_string()],
                )?;
            }
        }

        for (i, engine) in Engine::ALL.iter().enumerate() {
            conn.execute(
                "INSERT OR IGNORE INTO engine_types (id, name) VALUES (?1, ?2)",
                params![i as i64 + 1, engine.display_name()],
            )?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            type_names: TypeNameCache::new(),
        })
    }

    fn lock(&self) -> MetadataResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| MetadataError::Poisoned)
    }

    /// Register an additional engine type name and return its id.
    pub fn register_engine_type(&self, name: &str) -> MetadataResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO engine_types (name) VALUES (?1)",
            params![name],
        )?;
        Ok(conn.query_row(
            "SELECT id FROM engine_types WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?)
    }

    fn engine_name(&self, conn: &Connection, engine_type_id: i64) -> MetadataResult<Option<String>> {
        self.type_names.get_or_load(engine_type_id, || {
            Ok(conn
                .query_row(
                    "SELECT name FROM engine_types WHERE id = ?1",
                    params![engine_type_id],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    fn target_from_row(&self, conn: &Connection, row: RawTarget) -> MetadataResult<DatabaseTarget> {
        let engine_kind = self
            .engine_name(conn, row.engine_type_id)?
            .unwrap_or_else(|| format!("engine type {}", row.engine_type_id));

        Ok(DatabaseTarget {
            id: row.id,
            name: row.name,
            engine_type_id: row.engine_type_id,
            engine_kind,
            connection: row.connection,
            is_active: row.is_active,
        })
    }
}

const TARGET_COLUMNS: &str = "id, name, engine_type_id, host, port, database_name, \
     trusted_connection, username, password, connection_string, is_active";

struct RawTarget {
    id: i64,
    name: String,
    engine_type_id: i64,
    connection: TargetConnection,
    is_active: bool,
}

fn raw_target(row: &Row<'_>) -> rusqlite::Result<RawTarget> {
    Ok(RawTarget {
        id: row.get(0)?,
        name: row.get(1)?,
        engine_type_id: row.get(2)?,
        connection: TargetConnection {
            host: row.get(3)?,
            port: row.get(4)?,
            database: row.get(5)?,
            trusted_connection: row.get(6)?,
            username: row.get(7)?,
            password: row.get(8)?,
            connection_string: row.get(9)?,
        },
        is_active: row.get(10)?,
    })
}

fn table_from_row(row: &Row<'_>) -> rusqlite::Result<TableMetadata> {
    Ok(TableMetadata {
        id: row.get(0)?,
        database_id: row.get(1)?,
        name: row.get(2)?,
        admin_name: row.get(3)?,
        description: row.get(4)?,
    })
}

fn column_from_row(row: &Row<'_>) -> rusqlite::Result<ColumnMetadata> {
    Ok(ColumnMetadata {
        id: row.get(0)?,
        table_id: row.get(1)?,
        name: row.get(2)?,
        data_type: row.get(3)?,
        is_nullable: row.get(4)?,
        is_primary_key: row.get(5)?,
        is_lookup: row.get(6)?,
        admin_name: row.get(7)?,
        description: row.get(8)?,
    })
}

fn relationship_from_row(row: &Row<'_>) -> rusqlite::Result<RelationshipMetadata> {
    Ok(RelationshipMetadata {
        id: row.get(0)?,
        database_id: row.get(1)?,
        from_table_id: row.get(2)?,
        from_column_id: row.get(3)?,
        to_table_id: row.get(4)?,
        to_column_id: row.get(5)?,
        kind: row.get(6)?,
        is_enforced: row.get(7)?,
    })
}

impl FromSql for RelationshipKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

impl ToSql for RelationshipKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// Empty strings are stored as NULL.
fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn query_tables(conn: &Connection, database_id: i64) -> MetadataResult<Vec<TableMetadata>> {
    let mut stmt = conn.prepare(
        "SELECT id, database_id, name, admin_name, description
         FROM schema_tables WHERE database_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![database_id], table_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn query_columns(conn: &Connection, table_id: i64) -> MetadataResult<Vec<ColumnMetadata>> {
    let mut stmt = conn.prepare(
        "SELECT id, table_id, name, data_type, is_nullable, is_primary_key, is_lookup,
                admin_name, description
         FROM schema_columns WHERE table_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![table_id], column_from_row)?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

const RELATIONSHIP_COLUMNS: &str = "id, database_id, from_table_id, from_column_id, \
     to_table_id, to_column_id, kind, is_enforced";

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn get_database_target(&self, database_id: i64) -> MetadataResult<Option<DatabaseTarget>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                &format!("SELECT {} FROM databases WHERE id = ?1", TARGET_COLUMNS),
                params![database_id],
                raw_target,
            )
            .optional()?;

        raw.map(|r| self.target_from_row(&conn, r)).transpose()
    }

    async fn list_database_targets(&self, include_inactive: bool) -> MetadataResult<Vec<DatabaseTarget>> {
        let conn = self.lock()?;
        let sql = if include_inactive {
            format!("SELECT {} FROM databases ORDER BY id", TARGET_COLUMNS)
        } else {
            format!(
                "SELECT {} FROM databases WHERE is_active = 1 ORDER BY id",
                TARGET_COLUMNS
            )
        };

        let raws = {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], raw_target)?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        raws.into_iter()
            .map(|r| self.target_from_row(&conn, r))
            .collect()
    }

    async fn add_database_target(&self, target: NewDatabaseTarget) -> MetadataResult<i64> {
        let conn = self.lock()?;
        if self.engine_name(&conn, target.engine_type_id)?.is_none() {
            return Err(MetadataError::NotFound(format!(
                "engine type {} is not registered",
                target.engine_type_id
            )));
        }

        let c = &target.connection;
        conn.execute(
            "INSERT INTO databases (name, engine_type_id, host, port, database_name,
                 trusted_connection, username, password, connection_string, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 1)",
            params![
                target.name,
                target.engine_type_id,
                c.host,
                c.port,
                c.database,
                c.trusted_connection,
                c.username,
                c.password,
                c.connection_string,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    async fn update_database_target(&self, target: &DatabaseTarget) -> MetadataResult<()> {
        let conn = self.lock()?;
        let c = &target.connection;
        let changed = conn.execute(
            "UPDATE databases SET name = ?2, engine_type_id = ?3, host = ?4, port = ?5,
                 database_name = ?6, trusted_connection = ?7, username = ?8, password = ?9,
                 connection_string = ?10
             WHERE id = ?1",
            params![
                target.id,
                target.name,
                target.engine_type_id,
                c.host,
                c.port,
                c.database,
                c.trusted_connection,
                c.username,
                c.password,
                c.connection_string,
            ],
        )?;

        if changed == 0 {
            return Err(MetadataError::NotFound(format!(
                "database {} is not registered",
                target.id
            )));
        }
        Ok(())
    }

    async fn deactivate_database_target(&self, database_id: i64) -> MetadataResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE databases SET is_active = 0 WHERE id = ?1 AND is_active = 1",
            params![database_id],
        )?;
        Ok(changed > 0)
    }

    async fn engine_type_name(&self, engine_type_id: i64) -> MetadataResult<Option<String>> {
        let conn = self.lock()?;
        self.engine_name(&conn, engine_type_id)
    }

    async fn engine_type_id(&self, name: &str) -> MetadataResult<Option<i64>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT id FROM engine_types WHERE name = ?1",
                params![name.trim()],
                |row| row.get(0),
            )
            .optional()?)
    }

    async fn get_tables(&self, database_id: i64) -> MetadataResult<Vec<TableMetadata>> {
        let conn = self.lock()?;
        query_tables(&conn, database_id)
    }

    async fn get_columns(&self, table_id: i64) -> MetadataResult<Vec<ColumnMetadata>> {
        let conn = self.lock()?;
        query_columns(&conn, table_id)
    }

    async fn get_relationships(&self, table_id: i64) -> MetadataResult<Vec<RelationshipMetadata>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM schema_relationships WHERE from_table_id = ?1 ORDER BY id",
            RELATIONSHIP_COLUMNS
        ))?;
        let rows = stmt.query_map(params![table_id], relationship_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn apply_schema_changes(
        &self,
        apply: &(dyn for<'w> Fn(&'w mut (dyn SchemaWriter + 'w)) -> MetadataResult<SyncReport> + Sync),
    ) -> MetadataResult<SyncReport> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let report = {
            let mut writer = TxWriter { tx: &tx };
            apply(&mut writer)?
        };

        tx.commit()?;
        Ok(report)
    }
}

/// [`SchemaWriter`] over an open transaction. Dropping the transaction without
/// committing rolls everything back.
struct TxWriter<'a> {
    tx: &'a Transaction<'a>,
}

impl SchemaWriter for TxWriter<'_> {
    fn tables(&mut self, database_id: i64) -> MetadataResult<Vec<TableMetadata>> {
        query_tables(self.tx, database_id)
    }

    fn columns(&mut self, table_id: i64) -> MetadataResult<Vec<ColumnMetadata>> {
        query_columns(self.tx, table_id)
    }

    fn relationships(&mut self, database_id: i64) -> MetadataResult<Vec<RelationshipMetadata>> {
        let mut stmt = self.tx.prepare(&format!(
            "SELECT {} FROM schema_relationships WHERE database_id = ?1 ORDER BY id",
            RELATIONSHIP_COLUMNS
        ))?;
        let rows = stmt.query_map(params![database_id], relationship_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn insert_table(&mut self, database_id: i64, table: &IncomingTable) -> MetadataResult<i64> {
        self.tx.execute(
            "INSERT INTO schema_tables (database_id, name, admin_name, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                database_id,
                table.name,
                non_empty(table.admin_name.as_deref()),
                non_empty(table.description.as_deref()),
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn update_table(
        &mut self,
        table_id: i64,
        admin_name: Option<&str>,
        description: Option<&str>,
    ) -> MetadataResult<()> {
        self.tx.execute(
            "UPDATE schema_tables SET admin_name = ?2, description = ?3 WHERE id = ?1",
            params![table_id, non_empty(admin_name), non_empty(description)],
        )?;
        Ok(())
    }

    fn delete_table(&mut self, table_id: i64) -> MetadataResult<()> {
        self.tx
            .execute("DELETE FROM schema_tables WHERE id = ?1", params![table_id])?;
        Ok(())
    }

    fn insert_column(&mut self, table_id: i64, column: &IncomingColumn) -> MetadataResult<i64> {
        self.tx.execute(
            "INSERT INTO schema_columns (table_id, name, data_type, is_nullable, is_primary_key,
                 admin_name, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                table_id,
                column.name,
                column.data_type,
                column.is_nullable,
                column.is_primary_key,
                non_empty(column.admin_name.as_deref()),
                non_empty(column.description.as_deref()),
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn update_column(&mut self, column: &ColumnMetadata) -> MetadataResult<()> {
        self.tx.execute(
            "UPDATE schema_columns SET data_type = ?2, is_nullable = ?3, is_primary_key = ?4,
                 admin_name = ?5, description = ?6
             WHERE id = ?1",
            params![
                column.id,
                column.data_type,
                column.is_nullable,
                column.is_primary_key,
                non_empty(column.admin_name.as_deref()),
                non_empty(column.description.as_deref()),
            ],
        )?;
        Ok(())
    }

    fn delete_column(&mut self, column_id: i64) -> MetadataResult<()> {
        self.tx
            .execute("DELETE FROM schema_columns WHERE id = ?1", params![column_id])?;
        Ok(())
    }

    fn insert_relationship(&mut self, database_id: i64, rel: &NewRelationship) -> MetadataResult<i64> {
        self.tx.execute(
            "INSERT INTO schema_relationships (database_id, from_table_id, from_column_id,
                 to_table_id, to_column_id, kind, is_enforced)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                database_id,
                rel.from_table_id,
                rel.from_column_id,
                rel.to_table_id,
                rel.to_column_id,
                rel.kind,
                rel.is_enforced,
            ],
        )?;
        Ok(self.tx.last_insert_rowid())
    }

    fn update_relationship(
        &mut self,
        relationship_id: i64,
        kind: RelationshipKind,
        is_enforced: bool,
    ) -> MetadataResult<()> {
        self.tx.execute(
            "UPDATE schema_relationships SET kind = ?2, is_enforced = ?3 WHERE id = ?1",
            params![relationship_id, kind, is_enforced],
        )?;
        Ok(())
    }

    fn delete_relationship(&mut self, relationship_id: i64) -> MetadataResult<()> {
        self.tx.execute(
            "DELETE FROM schema_relationships WHERE id = ?1",
            params![relationship_id],
        )?;
        Ok(())
    }
}
