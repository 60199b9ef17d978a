//! Schema context and schema synchronization.
//!
//! ```text
//! live database ──introspect──▶ IncomingSchema ──suggest──▶ SchemaSynchronizer ──▶ metadata store
//!                                                                                     │
//!                      LLM prompt ◀── SchemaContext ◀── SchemaContextBuilder ◀────────┘
//! ```

mod context;
mod suggest;
mod sync;

pub use context::{
    context_from_snapshot, extract_admin_terms, render_admin_terms, render_schema_text, AdminTerms,
    SchemaContext, SchemaContextBuilder, NO_TABLES_SENTINEL,
};
pub use suggest::{add_suggested_relationships, pluralize, singularize, suggest_relationships};
pub use sync::{apply_schema, SchemaSynchronizer};
