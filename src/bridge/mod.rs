//! Driver bridge communication.
//!
//! SQL Server, MySQL and Oracle are reached through a separate bridge process that
//! owns the native drivers. askdb itself never speaks TDS or the MySQL/Oracle wire
//! protocols.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    askdb (Rust + Tokio)                  │
//! │   ┌──────────────────────────────────────────────────┐   │
//! │   │                BridgeClient (async)              │   │
//! │   │  - spawned once, shared by all connections       │   │
//! │   │  - NDJSON over stdin/stdout                      │   │
//! │   │  - UUID request ids for concurrent correlation   │   │
//! │   └──────────────────────────────────────────────────┘   │
//! │                stdin (NDJSON) │ stdout (NDJSON)          │
//! └───────────────────────────────┼──────────────────────────┘
//!                                 ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │          askdb-bridge (long-running child process)       │
//! │          mssql / mysql / oracle drivers + pools          │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod client;
mod error;
pub mod protocol;

pub use client::BridgeClient;
pub use error::{BridgeError, BridgeResult};
