//! background_sync tool implementation.
//!
//! Fires the background-sync trigger the host raises when connectivity
//! returns.

use fxcache_client::Registration;
use fxcache_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the background_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundSyncParams {
    /// Sync tag, e.g. "background-sync-currency-rates".
    pub tag: String,
}

/// Output from the background_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BackgroundSyncOutput {
    /// False when the tag is not one the worker handles.
    pub recognised: bool,
}

/// Implementation of the background_sync tool.
pub async fn sync_impl(registration: &Registration, params: BackgroundSyncParams) -> Result<CallToolResult, McpError> {
    let worker = registration
        .active()
        .await
        .ok_or_else(|| Error::InvalidState("no active worker".into()))?;

    let output = BackgroundSyncOutput { recognised: worker.on_sync(&params.tag).await? };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
