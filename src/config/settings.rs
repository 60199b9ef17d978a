//! TOML-based configuration for askdb.
//!
//! Supports a config file (askdb.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [llm]
//! provider = "claude"
//! timeout_seconds = 60
//!
//! [llm.providers.claude]
//! api_key = "${ANTHROPIC_API_KEY}"
//! model = "claude-sonnet-4-20250514"
//!
//! [llm.providers.deepseek]
//! api_key = "${DEEPSEEK_API_KEY}"
//!
//! [metadata]
//! path = "./askdb-metadata.db"
//!
//! [bridge]
//! path = "/usr/local/bin/askdb-bridge"
//!
//! [bridge.pool]
//! max_open_conns = 10
//!
//! [query]
//! timeout_seconds = 30
//! explain_results = true
//!
//! [format]
//! locale = "en-US"
//!
//! [server]
//! port = 8080
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Failed to determine a home directory for the metadata store")]
    NoHomeDir,
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// LLM provider selection and credentials.
    pub llm: LlmSettings,

    /// Admin metadata store.
    pub metadata: MetadataSettings,

    /// Driver bridge process.
    pub bridge: BridgeSettings,

    /// Query execution.
    pub query: QuerySettings,

    /// Result formatting.
    pub format: FormatSettings,

    /// HTTP server.
    pub server: ServerSettings,
}

/// LLM configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Name of the active provider (claude, deepseek, openai).
    pub provider: String,

    /// HTTP timeout for a single provider call.
    pub timeout_seconds: u64,

    /// Per-provider settings, keyed by provider name.
    pub providers: HashMap<String, ProviderSettings>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "claude".to_string(),
            timeout_seconds: 60,
            providers: HashMap::new(),
        }
    }
}

impl LlmSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    /// Settings for the active provider, if configured.
    pub fn active(&self) -> Option<&ProviderSettings> {
        self.providers.get(&self.provider.to_lowercase())
    }
}

/// Settings for one LLM provider.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProviderSettings {
    /// API key (supports ${ENV_VAR} expansion).
    #[serde(default)]
    pub api_key: String,

    /// Override for the provider endpoint URL.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Model name; each provider has its own default.
    #[serde(default)]
    pub model: Option<String>,

    /// Completion token limit.
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl ProviderSettings {
    /// Get the API key with environment variables expanded.
    pub fn resolved_api_key(&self) -> Result<String, SettingsError> {
        expand_env_vars(&self.api_key)
    }
}

/// Admin metadata store configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// Path to the SQLite metadata database.
    pub path: Option<String>,
}

impl MetadataSettings {
    /// Resolved path, defaulting to `~/.askdb/metadata.db`.
    pub fn resolved_path(&self) -> Result<PathBuf, SettingsError> {
        match &self.path {
            Some(path) => Ok(PathBuf::from(expand_env_vars(path)?)),
            None => {
                let home = dirs::home_dir().ok_or(SettingsError::NoHomeDir)?;
                Ok(home.join(".askdb").join("metadata.db"))
            }
        }
    }
}

/// Driver bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Path to the bridge binary.
    pub path: Option<String>,

    /// Timeout for a single bridge request.
    pub timeout_seconds: u64,

    /// Connection pool settings.
    pub pool: PoolSettings,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            path: None,
            timeout_seconds: 30,
            pool: PoolSettings::default(),
        }
    }
}

/// Connection pool settings forwarded to the bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of idle connections per pool.
    pub max_idle_conns: u32,

    /// Maximum number of open connections per pool.
    pub max_open_conns: u32,

    /// Maximum connection lifetime (e.g., "5m", "1h").
    pub conn_max_lifetime: String,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle_conns: 5,
            max_open_conns: 10,
            conn_max_lifetime: "5m".to_string(),
        }
    }
}

impl PoolSettings {
    /// Convert to bridge command-line arguments.
    pub fn to_bridge_args(&self) -> Vec<String> {
        vec![
            "-pool".to_string(),
            format!("-pool-max-idle={}", self.max_idle_conns),
            format!("-pool-max-open={}", self.max_open_conns),
            format!("-pool-conn-lifetime={}", self.conn_max_lifetime),
        ]
    }
}

/// Query execution settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuerySettings {
    /// Deadline for each database open/execute.
    pub timeout_seconds: u64,

    /// Ask the LLM to explain result rows when the original question is known.
    pub explain_results: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            explain_results: true,
        }
    }
}

impl QuerySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

/// Result formatting settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FormatSettings {
    /// Number locale: en-US, de-DE, fr-FR or invariant.
    pub locale: String,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `ASKDB_CONFIG`
    /// 2. `./askdb.toml`
    /// 3. `~/.config/askdb/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("ASKDB_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("askdb.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("askdb").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Bridge binary path, if one is configured or found next to the binary.
    pub fn bridge_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.bridge.path {
            let expanded = expand_env_vars(path).ok()?;
            return Some(PathBuf::from(expanded));
        }

        ["askdb-bridge", "./askdb-bridge", "./bridge/askdb-bridge"]
            .into_iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }

        let mut var_name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            for ch in chars.by_ref() {
                if ch == '}' {
                    break;
                }
                var_name.push(ch);
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_alphanumeric() || ch == '_' {
                    var_name.push(ch);
                    chars.next();
                } else {
                    break;
                }
            }
            if var_name.is_empty() {
                // lone $
                result.push('$');
                continue;
            }
        }

        let value = env::var(&var_name).map_err(|_| SettingsError::MissingEnvVar(var_name))?;
        result.push_str(&value);
    }

    Ok(result)
}
