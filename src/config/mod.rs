//! Configuration module for askdb.
//!
//! Handles engine kinds, connection configuration, environment variables, and settings.

mod connection;
mod settings;

pub use connection::{ConnectionConfig, ConnectionError, Engine};
pub use settings::{
    expand_env_vars, BridgeSettings, FormatSettings, LlmSettings, MetadataSettings, PoolSettings,
    ProviderSettings, QuerySettings, ServerSettings, Settings, SettingsError,
};
