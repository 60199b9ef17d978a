//! Engine kinds and connection configuration.
//!
//! Ad-hoc connections can be described with environment variables:
//! - `ASKDB_DB_ENGINE`: Engine kind (sqlserver, mysql, oracle, sqlite)
//! - `ASKDB_DB_HOST`: Server hostname (file path for SQLite)
//! - `ASKDB_DB_NAME`: Database or service name
//! - `ASKDB_DB_PORT`: Port (optional, uses engine default)
//! - `ASKDB_DB_USER` / `ASKDB_DB_PASSWORD`: Credentials (optional)

use std::env;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use url::Url;

/// Error type for connection configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unsupported engine: {0}. Supported: sqlserver, mysql, oracle, sqlite")]
    UnsupportedEngine(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Engine {
    /// Microsoft SQL Server
    SqlServer,
    /// MySQL / MariaDB
    MySql,
    /// Oracle Database
    Oracle,
    /// SQLite file (served in-process)
    Sqlite,
}

impl Engine {
    /// All engine kinds, in registration order.
    pub const ALL: [Engine; 4] = [Engine::SqlServer, Engine::MySql, Engine::Oracle, Engine::Sqlite];

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::SqlServer => "sqlserver",
            Engine::MySql => "mysql",
            Engine::Oracle => "oracle",
            Engine::Sqlite => "sqlite",
        }
    }

    /// Display name shown to administrators.
    pub fn display_name(&self) -> &'static str {
        match self {
            Engine::SqlServer => "SQL Server",
            Engine::MySql => "MySQL",
            Engine::Oracle => "Oracle",
            Engine::Sqlite => "SQLite",
        }
    }

    /// Driver name understood by the driver bridge.
    pub fn bridge_driver(&self) -> &'static str {
        match self {
            Engine::SqlServer => "mssql",
            Engine::MySql => "mysql",
            Engine::Oracle => "oracle",
            Engine::Sqlite => "sqlite",
        }
    }

    /// Get the default port for this engine.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Engine::SqlServer => Some(1433),
            Engine::MySql => Some(3306),
            Engine::Oracle => Some(1521),
            Engine::Sqlite => None,
        }
    }

    /// Whether queries run in-process rather than through the driver bridge.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Engine::Sqlite)
    }
}

impl FromStr for Engine {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(' ', "");
        match normalized.as_str() {
            "sqlserver" | "mssql" | "sql_server" => Ok(Engine::SqlServer),
            "mysql" | "mariadb" => Ok(Engine::MySql),
            "oracle" => Ok(Engine::Oracle),
            "sqlite" | "sqlite3" => Ok(Engine::Sqlite),
            _ => Err(ConnectionError::UnsupportedEngine(s.to_string())),
        }
    }
}

impl TryFrom<String> for Engine {
    type Error = ConnectionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Engine> for String {
    fn from(engine: Engine) -> Self {
        engine.as_str().to_string()
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database engine.
    pub engine: Engine,
    /// Server hostname (file path for SQLite).
    pub host: String,
    /// Database name (service name for Oracle).
    #[serde(default)]
    pub database: String,
    /// Port (optional).
    #[serde(default)]
    pub port: Option<u16>,
    /// Use Windows trusted connection (SQL Server).
    #[serde(default)]
    pub trusted_connection: bool,
    /// Username (if not using trusted connection).
    #[serde(default)]
    pub username: Option<String>,
    /// Password (if not using trusted connection).
    #[serde(default)]
    pub password: Option<String>,
    /// Explicit connection string; wins over the discrete fields when non-empty.
    #[serde(default)]
    pub connection_string: Option<String>,
}

impl ConnectionConfig {
    /// Create an empty config for an engine.
    pub fn new(engine: Engine, host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            engine,
            host: host.into(),
            database: database.into(),
            port: None,
            trusted_connection: false,
            username: None,
            password: None,
            connection_string: None,
        }
    }

    /// SQL Server with trusted connection.
    pub fn sqlserver_trusted(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            trusted_connection: true,
            ..Self::new(Engine::SqlServer, host, database)
        }
    }

    /// SQLite file (or `:memory:`).
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new(Engine::Sqlite, path, "")
    }

    /// Set credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self.trusted_connection = false;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `ASKDB_DB_ENGINE`
    /// - `ASKDB_DB_HOST`
    /// - `ASKDB_DB_NAME` (not required for SQLite)
    pub fn from_env() -> Result<Self, ConnectionError> {
        let engine_str = env::var("ASKDB_DB_ENGINE")
            .map_err(|_| ConnectionError::MissingEnvVar("ASKDB_DB_ENGINE".to_string()))?;
        let engine: Engine = engine_str.parse()?;

        let host = env::var("ASKDB_DB_HOST")
            .map_err(|_| ConnectionError::MissingEnvVar("ASKDB_DB_HOST".to_string()))?;

        let database = if engine.is_embedded() {
            env::var("ASKDB_DB_NAME").unwrap_or_default()
        } else {
            env::var("ASKDB_DB_NAME")
                .map_err(|_| ConnectionError::MissingEnvVar("ASKDB_DB_NAME".to_string()))?
        };

        let port = match env::var("ASKDB_DB_PORT") {
            Ok(p) => Some(p.parse().map_err(|_| {
                ConnectionError::InvalidConfig(format!("ASKDB_DB_PORT is not a port number: {}", p))
            })?),
            Err(_) => None,
        };

        let username = env::var("ASKDB_DB_USER").ok();
        let password = env::var("ASKDB_DB_PASSWORD").ok();
        let trusted_connection = engine == Engine::SqlServer && username.is_none();

        Ok(Self {
            engine,
            host,
            database,
            port,
            trusted_connection,
            username,
            password,
            connection_string: None,
        })
    }

    /// Build the connection string, preferring an explicit one.
    pub fn to_connection_string(&self) -> Result<String, ConnectionError> {
        if let Some(explicit) = self.connection_string.as_deref() {
            if !explicit.trim().is_empty() {
                return Ok(explicit.trim().to_string());
            }
        }

        if self.host.trim().is_empty() && !self.engine.is_embedded() {
            return Err(ConnectionError::InvalidConfig(format!(
                "{} connection needs a server host or an explicit connection string",
                self.engine
            )));
        }

        match self.engine {
            Engine::SqlServer => Ok(self.build_sqlserver_connection_string()),
            Engine::MySql => self.build_mysql_connection_string(),
            Engine::Oracle => self.build_oracle_connection_string(),
            Engine::Sqlite => Ok(self.build_sqlite_connection_string()),
        }
    }

    fn host_port(&self) -> String {
        match self.port.or(self.engine.default_port()) {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// Query values are form-encoded; with no credentials at all the
    /// connection falls back to Windows authentication.
    fn build_sqlserver_connection_string(&self) -> String {
        let base = match self.port {
            Some(port) => format!("sqlserver://{}:{}", self.host, port),
            None => format!("sqlserver://{}", self.host),
        };

        let mut params = vec![format!("database={}", query_value(&self.database))];
        if self.trusted_connection || (self.username.is_none() && self.password.is_none()) {
            params.push("trusted_connection=true".to_string());
        } else {
            if let Some(user) = &self.username {
                params.push(format!("user id={}", query_value(user)));
            }
            if let Some(pass) = &self.password {
                params.push(format!("password={}", query_value(pass)));
            }
        }

        format!("{}?{}", base, params.join("&"))
    }

    /// The Go DSN has no escape syntax: it splits credentials at the last `@`
    /// and the first `:`, so any password survives verbatim while the user
    /// and database name must stay free of separators.
    fn build_mysql_connection_string(&self) -> Result<String, ConnectionError> {
        if let Some(user) = &self.username {
            if user.contains([':', '@', '/']) {
                return Err(ConnectionError::InvalidConfig(format!(
                    "MySQL user name cannot contain ':', '@' or '/': {}",
                    user
                )));
            }
        }
        if self.database.contains(['/', '?']) {
            return Err(ConnectionError::InvalidConfig(format!(
                "MySQL database name cannot contain '/' or '?': {}",
                self.database
            )));
        }

        let credentials = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (Some(user), None) => format!("{}@", user),
            _ => String::new(),
        };
        Ok(format!(
            "{}tcp({})/{}?parseTime=true",
            credentials,
            self.host_port(),
            self.database
        ))
    }

    /// Credentials go through URL userinfo encoding.
    fn build_oracle_connection_string(&self) -> Result<String, ConnectionError> {
        let mut url = Url::parse(&format!("oracle://{}/{}", self.host_port(), self.database))
            .map_err(|e| ConnectionError::InvalidConfig(format!("Oracle connection URL: {}", e)))?;
        if let Some(user) = &self.username {
            let no_credentials =
                || ConnectionError::InvalidConfig(format!("Oracle host cannot carry credentials: {}", self.host));
            url.set_username(user).map_err(|_| no_credentials())?;
            if let Some(pass) = &self.password {
                url.set_password(Some(pass.as_str())).map_err(|_| no_credentials())?;
            }
        }
        Ok(url.to_string())
    }

    fn build_sqlite_connection_string(&self) -> String {
        if self.host.is_empty() || self.host == ":memory:" {
            ":memory:".to_string()
        } else {
            self.host.clone()
        }
    }
}

fn query_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
