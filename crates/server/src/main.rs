//! fxcache server entry point.
//!
//! Boots the offline cache layer and serves it as an MCP server on stdio.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::{Context, Result};
use fxcache_client::{Clients, FetchConfig, HttpNetwork, Network, Registration, Worker};
use fxcache_core::{AppConfig, CacheDb};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    tracing::info!(version = %config.static_generation, db = %config.db_path.display(), "Starting fxcache server on stdio transport");

    let cache = CacheDb::open(&config.db_path).await.context("opening cache database")?;
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(FetchConfig::from_app_config(&config)?)?);
    let clients = Arc::new(Clients::new(config.notification_capacity));

    let worker = Worker::new(&config, cache.clone(), network.clone(), clients.clone())?;
    let registration = Arc::new(Registration::new(network));

    match registration.update(Arc::new(worker)).await {
        Ok(report) => {
            tracing::info!(deleted = ?report.deleted, claimed = report.claimed, restored = report.restored, "worker active")
        }
        Err(e) => match registration.active().await {
            Some(worker) => tracing::error!(error = %e, serving = worker.version(), "worker did not install; serving the recorded version"),
            None => tracing::error!(error = %e, "worker did not install; requests go straight to the network"),
        },
    }

    let handler = handler::FxCacheServer::new(registration, cache.clone(), clients);
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;
    cache.close().await.context("closing cache database")?;

    Ok(())
}
