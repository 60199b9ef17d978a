//! # askdb
//!
//! Natural-language query backend: users ask questions about a registered
//! relational database and get an explanation, a SQL query and formatted
//! results.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           QueryService (analyze / generate / execute)    │
//! └─────────────────────────────────────────────────────────┘
//!        │                    │                     │
//!        ▼                    ▼                     ▼
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────────┐
//! │ SchemaContext│   │   LlmProvider   │   │ConnectionProvider│
//! │   Builder    │   │ (Claude, ...)   │   │ (SQLite, bridge) │
//! └──────────────┘   └─────────────────┘   └──────────────────┘
//!        │                                          │
//!        ▼                                          ▼
//! ┌──────────────┐                         ┌──────────────────┐
//! │MetadataStore │◀──── SchemaSynchronizer ◀┤  introspection   │
//! └──────────────┘                         └──────────────────┘
//! ```
//!
//! The workflow is stateless on the server: callers carry a
//! [`query::QueryWorkflowState`] between the analyze, generate and execute
//! calls, or use the one-shot `process` path.

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod llm;
pub mod metadata;
pub mod query;
pub mod schema;

#[cfg(feature = "server")]
pub mod web;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{ConnectionConfig, Engine, Settings};
    pub use crate::connection::{ConnectionProvider, DbConnection, OpenConnection, QueryResult, SqlValue};
    pub use crate::error::{ErrorKind, QueryError};
    pub use crate::llm::{LlmProvider, ParseOutcome, ProviderRegistry};
    pub use crate::metadata::{
        DatabaseTarget, IncomingSchema, MetadataStore, MetadataStoreExt, SqliteMetadataStore, SyncReport,
    };
    pub use crate::query::{
        AnalysisResult, AnalyzeRequest, ExecuteRequest, GenerateRequest, QueryService, QueryWorkflowState,
        ViewingType,
    };
    pub use crate::schema::{SchemaContextBuilder, SchemaSynchronizer};
}

pub use error::{ErrorKind, QueryError};
pub use query::QueryService;
