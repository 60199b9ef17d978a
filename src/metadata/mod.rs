//! Admin metadata store.
//!
//! Registered databases plus the table, column and relationship annotations
//! administrators layer over them. The schema context builder reads from it;
//! the schema synchronizer writes to it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        MetadataStore                            │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │  Keyed reads (async)         │  Transactional writes       │  │
//! │  │  - get_database_target()     │  - apply_schema_changes()   │  │
//! │  │  - get_tables()              │    (SchemaWriter inside one │  │
//! │  │  - get_columns()             │     transaction)            │  │
//! │  │  - get_relationships()       │                             │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │          MetadataStoreExt: require_active_target, load_snapshot │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           SqliteMetadataStore (rusqlite) + TypeNameCache        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod error;
mod sqlite;
mod store;
mod type_cache;
mod types;

pub use error::{MetadataError, MetadataResult};
pub use sqlite::SqliteMetadataStore;
pub use store::{MetadataStore, MetadataStoreExt, SchemaWriter};
pub use type_cache::TypeNameCache;
pub use types::*;
