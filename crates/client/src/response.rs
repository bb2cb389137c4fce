//! Response model, stale markers and the synthetic offline responses.
//!
//! A response is either fully readable (`Basic`) or `Opaque`. Opaque
//! responses come from cross-origin no-cors fetches: they can be stored and
//! replayed, but nothing outside this module can read their status, headers
//! or body.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};

use crate::request::Request;
use fxcache_core::{Error, StoredEntry};

/// Header recording when an API entry was written. Its value is the only
/// input to staleness checks.
pub const STALE_MARKER_HEADER: &str = "sw-cached-date";

/// Body of the 503 returned when neither network nor cache can answer.
pub const OFFLINE_ERROR_BODY: &str =
    r#"{"error":"Offline","message":"No internet connection and no cached data available"}"#;

const OFFLINE_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline - Currency Converter</title>
<style>
body{font-family:system-ui,sans-serif;display:flex;min-height:100vh;margin:0;align-items:center;justify-content:center;background:#f4f6fb;color:#1f2937}
main{text-align:center;padding:2rem}
button{margin-top:1rem;padding:.6rem 1.4rem;border:0;border-radius:.4rem;background:#2563eb;color:#fff;font-size:1rem;cursor:pointer}
</style>
</head>
<body>
<main>
<h1>You're offline</h1>
<p>The converter could not reach the network and has no saved copy of this page.</p>
<button type="button" onclick="location.reload()">Try again</button>
</main>
</body>
</html>
"#;

/// A readable response.
#[derive(Debug, Clone)]
pub struct BasicResponse {
    pub status: StatusCode,
    pub status_text: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl BasicResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }

    /// Copy of this response carrying a stale marker for `at`.
    pub fn stamped(&self, at: DateTime<Utc>) -> Self {
        let mut copy = self.clone();
        let value = at.to_rfc3339_opts(SecondsFormat::Millis, true);
        if let Ok(value) = HeaderValue::from_str(&value) {
            copy.headers.insert(HeaderName::from_static(STALE_MARKER_HEADER), value);
        }
        copy
    }

    /// When this response was written, if it carries a readable marker.
    pub fn stale_marker(&self) -> Option<DateTime<Utc>> {
        let raw = self.headers.get(STALE_MARKER_HEADER)?.to_str().ok()?;
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|at| at.with_timezone(&Utc))
    }
}

/// A storable response whose contents stay sealed.
#[derive(Clone)]
pub struct OpaqueResponse {
    headers: HeaderMap,
    body: Bytes,
}

impl OpaqueResponse {
    pub fn seal(headers: HeaderMap, body: Bytes) -> Self {
        Self { headers, body }
    }
}

impl fmt::Debug for OpaqueResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpaqueResponse").finish_non_exhaustive()
    }
}

/// What the worker hands back to the page.
#[derive(Debug, Clone)]
pub enum Response {
    Basic(BasicResponse),
    Opaque(OpaqueResponse),
}

impl Response {
    /// The 503 JSON returned when an API request has no network and no
    /// usable cached copy.
    pub fn offline_error() -> Self {
        Response::Basic(
            BasicResponse::new(StatusCode::SERVICE_UNAVAILABLE, OFFLINE_ERROR_BODY)
                .with_header(header::CONTENT_TYPE, "application/json")
                .with_header(header::CACHE_CONTROL, "no-cache"),
        )
    }

    /// Self-contained offline page with a retry button.
    pub fn offline_page() -> Self {
        Response::Basic(
            BasicResponse::new(StatusCode::OK, OFFLINE_PAGE).with_header(header::CONTENT_TYPE, "text/html; charset=utf-8"),
        )
    }

    /// Empty 404 served for images that are neither cached nor reachable.
    pub fn image_placeholder() -> Self {
        Response::Basic(BasicResponse::new(StatusCode::NOT_FOUND, Bytes::new()))
    }

    /// OK status. Always false for opaque responses.
    pub fn is_ok(&self) -> bool {
        match self {
            Response::Basic(basic) => basic.is_ok(),
            Response::Opaque(_) => false,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, Response::Opaque(_))
    }

    /// Whether the static strategy may keep this response.
    pub fn is_storable(&self) -> bool {
        match self {
            Response::Basic(basic) => basic.is_ok(),
            Response::Opaque(_) => true,
        }
    }

    pub fn as_basic(&self) -> Option<&BasicResponse> {
        match self {
            Response::Basic(basic) => Some(basic),
            Response::Opaque(_) => None,
        }
    }

    pub fn into_basic(self) -> Option<BasicResponse> {
        match self {
            Response::Basic(basic) => Some(basic),
            Response::Opaque(_) => None,
        }
    }

    fn parts(&self) -> (&HeaderMap, &Bytes) {
        match self {
            Response::Basic(basic) => (&basic.headers, &basic.body),
            Response::Opaque(opaque) => (&opaque.headers, &opaque.body),
        }
    }

    /// Build the store row for this response as an answer to `request`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` for `Vary: *`, which can never match a
    /// later request.
    pub fn to_entry(&self, request: &Request, cache_key: String) -> Result<StoredEntry, Error> {
        let (headers, body) = self.parts();

        let mut vary = Vec::new();
        for value in headers.get_all(header::VARY) {
            let value = value.to_str().unwrap_or_default();
            for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                if name == "*" {
                    return Err(Error::InvalidInput(format!("{} varies on *", request.url)));
                }
                let name = name.to_ascii_lowercase();
                let current = request
                    .headers
                    .get(name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                vary.push((name, current));
            }
        }

        let (status_code, status_text) = match self {
            Response::Basic(basic) => (basic.status.as_u16(), basic.status_text.clone()),
            Response::Opaque(_) => (0, String::new()),
        };

        Ok(StoredEntry {
            cache_key,
            url: request.url.to_string(),
            method: request.method.as_str().to_string(),
            status_code,
            status_text,
            headers: headers
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect(),
            vary,
            body: body.to_vec(),
            opaque: self.is_opaque(),
            written_at: Utc::now().to_rfc3339(),
        })
    }

    /// Rebuild a response from a store row.
    pub fn from_entry(entry: StoredEntry) -> Result<Self, Error> {
        let mut headers = HeaderMap::with_capacity(entry.headers.len());
        for (name, value) in &entry.headers {
            let name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| Error::CorruptEntry(format!("{name}: {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| Error::CorruptEntry(e.to_string()))?;
            headers.append(name, value);
        }
        let body = Bytes::from(entry.body);

        if entry.opaque {
            return Ok(Response::Opaque(OpaqueResponse::seal(headers, body)));
        }

        let status = StatusCode::from_u16(entry.status_code)
            .map_err(|e| Error::CorruptEntry(format!("status {}: {e}", entry.status_code)))?;
        Ok(Response::Basic(BasicResponse { status, status_text: entry.status_text, headers, body }))
    }
}
