//! Network first for page loads, with the cached root document or an inline
//! offline page as fallbacks.

use super::StrategyEngine;
use crate::fetch::canonical_key;
use crate::request::Request;
use crate::response::Response;
use fxcache_core::cache::hash::compute_cache_key;

impl StrategyEngine {
    pub async fn navigation(&self, request: &Request) -> Response {
        match self.fetch(request).await {
            Ok(response) if response.is_ok() => return response,
            Ok(_) => tracing::debug!(url = %request.url, "navigation upstream not OK"),
            Err(e) => tracing::debug!(url = %request.url, error = %e, "navigation fetch failed"),
        }

        self.offline_navigation().await
    }

    /// Cached root document if present, else the synthetic offline page.
    pub(crate) async fn offline_navigation(&self) -> Response {
        let key = compute_cache_key("GET", &canonical_key(&self.root_document));

        match self.cache().match_entry(&self.current_generations(), &key, &[]).await {
            Ok(Some(entry)) => match Response::from_entry(entry) {
                Ok(root) => return root,
                Err(e) => tracing::warn!(error = %e, "unreadable root document entry"),
            },
            Ok(None) => tracing::debug!(root = %self.root_document, "root document not cached"),
            Err(e) => tracing::warn!(error = %e, "root document lookup failed"),
        }

        Response::offline_page()
    }
}
