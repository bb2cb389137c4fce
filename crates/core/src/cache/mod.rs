//! SQLite-backed response store partitioned into named generations.
//!
//! This module provides a persistent request/response cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named generations (static app shell, runtime API responses)
//! - A persisted record of the active worker version
//! - Request keys derived from method and canonical URL via SHA-256
//! - Vary-aware matching across an ordered list of generations
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod active;
pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use active::ActiveVersion;
pub use connection::CacheDb;
pub use entries::StoredEntry;
pub use generations::{Generation, GenerationKind, GenerationSummary};
