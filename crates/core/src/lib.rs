//! Core types and shared functionality for fxcache.
//!
//! This crate provides:
//! - Generation-scoped response store with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{ActiveVersion, CacheDb, Generation, GenerationKind, GenerationSummary, StoredEntry};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
