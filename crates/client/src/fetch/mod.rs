//! Network seam and the reqwest-backed upstream fetcher.
//!
//! ### Semantics
//! - Any HTTP status is a successful fetch; strategies decide what non-OK means.
//! - Connectivity failures map to `Error::Network`, client-side timeouts to
//!   `Error::FetchTimeout`.
//! - Cross-origin `NoCors` requests yield `Response::Opaque`.
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Every strategy fetch is additionally bounded by [`fetch_bounded`].

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonical_key, canonicalize, resolve, same_origin};

use crate::request::{Request, RequestMode};
use crate::response::{BasicResponse, OpaqueResponse, Response};
use fxcache_core::{AppConfig, Error};

/// Anything that can answer a request from the network.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Fetch through `network`, giving up after `timeout`.
///
/// Dropping the inner future on expiry cancels the in-flight request.
pub async fn fetch_bounded(network: &dyn Network, request: &Request, timeout: Duration) -> Result<Response, Error> {
    match tokio::time::timeout(timeout, network.fetch(request)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(url = %request.url, timeout_ms = timeout.as_millis() as u64, "fetch aborted");
            Err(Error::FetchTimeout(format!("{} after {}ms", request.url, timeout.as_millis())))
        }
    }
}

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "fxcache/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 10s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Page origin; cross-origin no-cors responses are sealed as opaque.
    pub origin: Option<Url>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "fxcache/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(10_000),
            max_redirects: 5,
            origin: None,
        }
    }
}

impl FetchConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = canonicalize(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            origin: Some(origin),
            ..Default::default()
        })
    }

    fn is_cross_origin(&self, target: &Url) -> bool {
        self.origin.as_ref().is_some_and(|origin| !same_origin(origin, target))
    }
}

/// Upstream fetcher backed by reqwest.
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    /// Create a new network client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }
}

fn map_send_error(url: &Url, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(format!("{url}: {err}"))
    } else {
        Error::Network(format!("{url}: {err}"))
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();

        let response = self
            .http
            .request(request.method.clone(), request.url.as_str())
            .headers(request.headers.clone())
            .send()
            .await
            .map_err(|e| map_send_error(&request.url, e))?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{len} bytes exceeds {}", self.config.max_bytes)));
        }

        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| map_send_error(&request.url, e))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            url = %request.url,
            status = status.as_u16(),
            bytes = body.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched upstream"
        );

        if request.mode == RequestMode::NoCors && self.config.is_cross_origin(&request.url) {
            return Ok(Response::Opaque(OpaqueResponse::seal(headers, body)));
        }

        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        Ok(Response::Basic(BasicResponse { status, status_text, headers, body }))
    }
}
