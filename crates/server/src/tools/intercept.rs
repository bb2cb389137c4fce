//! intercept tool implementation.
//!
//! Offers one page request to the active worker and reports the response the
//! page would receive.

use std::collections::BTreeMap;

use fxcache_client::{Destination, Registration, Request, RequestMode, Response};
use fxcache_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the intercept tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InterceptParams {
    /// Absolute URL of the request.
    pub url: String,

    /// HTTP method (default "GET"). Non-GET requests bypass the cache.
    #[serde(default = "default_method")]
    pub method: String,

    /// Request mode: "navigate", "same-origin", "cors" (default) or "no-cors".
    #[serde(default)]
    pub mode: Option<String>,

    /// Request destination, e.g. "document", "image", "style".
    #[serde(default)]
    pub destination: Option<String>,

    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_method() -> String {
    "GET".into()
}

/// The response as the page sees it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InterceptOutput {
    /// "basic" or "opaque". Opaque responses expose nothing else.
    pub kind: String,
    pub status: Option<u16>,
    pub status_text: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Body decoded as UTF-8 (lossy).
    pub body: Option<String>,
    /// When the cached copy was written, for responses served from the rates cache.
    pub cached_at: Option<String>,
    /// Version of the worker that handled the request, if any.
    pub served_by: Option<String>,
}

impl InterceptOutput {
    fn from_response(response: Response, served_by: Option<String>) -> Self {
        match response {
            Response::Basic(basic) => {
                let headers = basic
                    .headers
                    .iter()
                    .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string())))
                    .collect();
                Self {
                    kind: "basic".into(),
                    status: Some(basic.status.as_u16()),
                    status_text: Some(basic.status_text.clone()),
                    cached_at: basic.stale_marker().map(|at| at.to_rfc3339()),
                    body: Some(String::from_utf8_lossy(&basic.body).into_owned()),
                    headers,
                    served_by,
                }
            }
            Response::Opaque(_) => Self {
                kind: "opaque".into(),
                status: None,
                status_text: None,
                headers: BTreeMap::new(),
                body: None,
                cached_at: None,
                served_by,
            },
        }
    }
}

fn build_request(params: &InterceptParams) -> Result<Request, Error> {
    let mut request = Request::get(&params.url)?.with_method_name(&params.method)?;

    if let Some(mode) = params.mode.as_deref() {
        let mode = RequestMode::from_name(mode).ok_or_else(|| Error::InvalidInput(format!("unknown mode: {mode}")))?;
        request = request.with_mode(mode);
        if mode == RequestMode::Navigate {
            request = request.with_destination(Destination::Document);
        }
    }
    if let Some(destination) = params.destination.as_deref() {
        request = request.with_destination(Destination::from_name(destination));
    }
    for (name, value) in &params.headers {
        request = request.with_header(name, value)?;
    }
    Ok(request)
}

/// Implementation of the intercept tool.
pub async fn intercept_impl(registration: &Registration, params: InterceptParams) -> Result<CallToolResult, McpError> {
    let request = build_request(&params)?;
    let (response, served_by) = registration.dispatch(&request).await?;
    let output = InterceptOutput::from_response(response, served_by);
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize response: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
