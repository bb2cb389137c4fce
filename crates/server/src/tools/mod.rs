//! MCP tool implementations.
//!
//! Each tool drives one entry point of the active worker.

pub mod control;
pub mod intercept;
pub mod status;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use control::{ControlMessageParams, control_impl};
pub use intercept::{InterceptParams, intercept_impl};
pub use status::{CacheStatusParams, status_impl};
pub use sync::{BackgroundSyncParams, sync_impl};
