//! Per-class response strategies.
//!
//! | Class      | Strategy                                   |
//! |------------|--------------------------------------------|
//! | API        | network first, expiring cache fallback, 503 |
//! | Static     | cache first, network fill                  |
//! | Navigation | network, cached root document, offline page |
//! | Other      | network only                               |
//!
//! Cache-store failures inside a strategy are logged and treated as misses.
//! Sequences of store calls are not isolated: concurrent requests for the
//! same key may interleave and the last write wins.

mod api;
mod assets;
mod navigation;

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::classify::{Classifier, RequestClass};
use crate::fetch::{Network, canonical_key, fetch_bounded, resolve};
use crate::request::Request;
use crate::response::Response;
use fxcache_core::cache::hash::compute_cache_key;
use fxcache_core::{AppConfig, CacheDb, Error, Generation, GenerationKind};

/// Store key for a request: method plus canonical URL.
pub fn request_key(request: &Request) -> String {
    compute_cache_key(request.method.as_str(), &canonical_key(&request.url))
}

/// Chooses and runs the strategy for each intercepted request.
pub struct StrategyEngine {
    cache: CacheDb,
    network: Arc<dyn Network>,
    classifier: Classifier,
    static_generation: Generation,
    runtime_generation: Generation,
    expiry: chrono::Duration,
    fetch_timeout: Duration,
    root_document: Url,
}

impl StrategyEngine {
    pub fn new(config: &AppConfig, cache: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let classifier = Classifier::from_config(config)?;
        let root_document =
            resolve(classifier.origin(), &config.root_document).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        Ok(Self {
            cache,
            network,
            classifier,
            static_generation: Generation::new(&config.static_generation, GenerationKind::Static),
            runtime_generation: Generation::new(&config.runtime_generation, GenerationKind::Runtime),
            expiry: config.expiry_window(),
            fetch_timeout: config.timeout(),
            root_document,
        })
    }

    /// Answer a GET request according to its class.
    ///
    /// Only Static (non-image, non-navigation) and Other requests can
    /// return an error; every other path ends in a real, cached or
    /// synthetic response.
    pub async fn handle(&self, request: &Request) -> Result<Response, Error> {
        let class = self.classifier.classify(request);
        tracing::debug!(url = %request.url, ?class, "intercepted");

        match class {
            RequestClass::Api => Ok(self.network_first(request).await),
            RequestClass::Static => self.cache_first(request).await,
            RequestClass::Navigation => Ok(self.navigation(request).await),
            RequestClass::Other => self.network_only(request).await,
        }
    }

    /// Fetch and return verbatim; failures propagate unchanged and nothing is stored.
    pub async fn network_only(&self, request: &Request) -> Result<Response, Error> {
        self.network.fetch(request).await
    }

    pub(crate) async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        fetch_bounded(self.network.as_ref(), request, self.fetch_timeout).await
    }

    /// Names of the generations this engine reads, static first.
    pub fn current_generations(&self) -> Vec<String> {
        vec![self.static_generation.name.clone(), self.runtime_generation.name.clone()]
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn cache(&self) -> &CacheDb {
        &self.cache
    }

    pub fn network(&self) -> &Arc<dyn Network> {
        &self.network
    }

    pub fn static_generation(&self) -> &Generation {
        &self.static_generation
    }

    pub fn runtime_generation(&self) -> &Generation {
        &self.runtime_generation
    }

    pub fn fetch_timeout(&self) -> Duration {
        self.fetch_timeout
    }
}
