//! Shared fixtures for tool tests.

use std::sync::Arc;

use async_trait::async_trait;
use fxcache_client::{Clients, Network, Registration, Request, Response, Worker};
use fxcache_core::{AppConfig, CacheDb, Error};
use rmcp::model::CallToolResult;

/// A network with no connectivity.
pub(crate) struct OfflineNetwork;

#[async_trait]
impl Network for OfflineNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        Err(Error::Network(format!("offline: {}", request.url)))
    }
}

pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        static_generation: "fxcache-static-test".into(),
        runtime_generation: "fxcache-runtime-test".into(),
        core_assets: vec![],
        optional_assets: vec![],
        ..Default::default()
    }
}

/// A registration whose worker installed with an empty manifest and is active.
pub(crate) async fn active_registration() -> (Registration, CacheDb) {
    let network: Arc<dyn Network> = Arc::new(OfflineNetwork);
    let cache = CacheDb::open_in_memory().await.unwrap();
    let worker = Worker::new(&test_config(), cache.clone(), network.clone(), Arc::new(Clients::new(4))).unwrap();

    let registration = Registration::new(network);
    registration.update(Arc::new(worker)).await.unwrap();
    (registration, cache)
}

/// Parse the JSON text content of a tool result.
pub(crate) fn output_json(result: &CallToolResult) -> serde_json::Value {
    let text = result.content[0].as_text().unwrap();
    serde_json::from_str(&text.text).unwrap()
}
