//! HTTP surface for the query workflow and database registry.
//!
//! Enabled by the `server` feature.

mod handlers;
mod server;

pub use handlers::{ApiError, HealthResponse};
pub use server::{router, serve, AppState};
