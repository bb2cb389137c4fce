//! Cache first for the app shell and allow-listed CDN assets.

use super::{StrategyEngine, request_key};
use crate::request::{Destination, Request};
use crate::response::Response;
use fxcache_core::Error;

impl StrategyEngine {
    /// Serve from any current generation without touching the network; on a
    /// miss, fetch and keep storable responses in the static generation.
    ///
    /// Fetch failures become a 404 placeholder for images and the offline
    /// navigation answer for page loads. Anything else propagates.
    pub async fn cache_first(&self, request: &Request) -> Result<Response, Error> {
        let key = request_key(request);

        if let Some(cached) = self.lookup(request, &key).await {
            tracing::debug!(url = %request.url, "static cache hit");
            return Ok(cached);
        }

        match self.fetch(request).await {
            Ok(response) => {
                if response.is_storable() {
                    self.store_asset(request, key, &response).await;
                }
                Ok(response)
            }
            Err(e) if request.destination == Destination::Image => {
                tracing::debug!(url = %request.url, error = %e, "image unavailable; serving placeholder");
                Ok(Response::image_placeholder())
            }
            Err(e) if request.is_navigation() => {
                tracing::debug!(url = %request.url, error = %e, "page unavailable; serving offline navigation");
                Ok(self.offline_navigation().await)
            }
            Err(e) => Err(e),
        }
    }

    async fn lookup(&self, request: &Request, key: &str) -> Option<Response> {
        let entry = match self
            .cache()
            .match_entry(&self.current_generations(), key, &request.header_pairs())
            .await
        {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "static cache read failed");
                return None;
            }
        };

        Response::from_entry(entry)
            .inspect_err(|e| tracing::warn!(url = %request.url, error = %e, "unreadable static entry"))
            .ok()
    }

    async fn store_asset(&self, request: &Request, key: String, response: &Response) {
        let entry = match response.to_entry(request, key) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(url = %request.url, error = %e, "asset not storable");
                return;
            }
        };

        if let Err(e) = self.cache().put_entry(self.static_generation(), &entry).await {
            tracing::warn!(url = %request.url, error = %e, "failed to store asset");
        }
    }
}
