//! Request classification.
//!
//! Checks run in priority order: API pattern, static origin, navigation,
//! then the `Other` default. Callers filter out non-GET requests first.

use regex::Regex;
use url::Url;

use crate::fetch::{canonicalize, same_origin};
use crate::request::Request;
use fxcache_core::{AppConfig, Error};

/// Which strategy answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Api,
    Static,
    Navigation,
    Other,
}

/// URL matcher with `*` wildcards, e.g. `https://open.er-api.com/v6/*`.
#[derive(Debug, Clone)]
pub struct UrlPattern {
    source: String,
    regex: Regex,
}

impl UrlPattern {
    pub fn new(pattern: &str) -> Result<Self, Error> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(Error::InvalidInput("empty URL pattern".into()));
        }
        let body = pattern.split('*').map(regex::escape).collect::<Vec<_>>().join(".*");
        let regex = Regex::new(&format!("^{body}$")).map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self { source: pattern.to_string(), regex })
    }

    pub fn matches(&self, url: &Url) -> bool {
        self.regex.is_match(url.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Maps requests to classes. Pure; built once from configuration.
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Url,
    api: UrlPattern,
    static_origins: Vec<Url>,
}

impl Classifier {
    pub fn new(origin: Url, api: UrlPattern, static_origins: Vec<Url>) -> Self {
        Self { origin, api, static_origins }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = canonicalize(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let api = UrlPattern::new(&config.api_pattern)?;
        let static_origins = config
            .static_origins
            .iter()
            .map(|o| canonicalize(o).map_err(|e| Error::InvalidUrl(format!("{o}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(origin, api, static_origins))
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        if self.api.matches(&request.url) {
            RequestClass::Api
        } else if self.is_static_origin(&request.url) {
            RequestClass::Static
        } else if request.is_navigation() {
            RequestClass::Navigation
        } else {
            RequestClass::Other
        }
    }

    fn is_static_origin(&self, url: &Url) -> bool {
        same_origin(&self.origin, url) || self.static_origins.iter().any(|o| same_origin(o, url))
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }
}
