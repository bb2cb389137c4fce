//! Offline cache layer for the currency converter.
//!
//! Classifies intercepted requests, answers them from the network or the
//! generation store, seeds and rotates generations across versions, and
//! handles the page control channel.

pub mod classify;
pub mod clients;
pub mod control;
pub mod fetch;
pub mod lifecycle;
pub mod request;
pub mod response;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use classify::{Classifier, RequestClass, UrlPattern};
pub use clients::{ClientHandle, ClientId, Clients, Notification};
pub use control::Command;
pub use fetch::{FetchConfig, HttpNetwork, Network};
pub use lifecycle::{ActivationReport, InstallReport, Lifecycle, LifecycleState, Manifest};
pub use request::{Destination, Request, RequestMode};
pub use response::{BasicResponse, OpaqueResponse, Response};
pub use strategy::StrategyEngine;
pub use worker::{Intercept, Registration, Worker};
