//! control_message tool implementation.
//!
//! Posts a page control message (`CACHE_UPDATE` or `CLEAR_CACHE`) to the
//! active worker.

use fxcache_client::Registration;
use fxcache_core::Error;
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the control_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlMessageParams {
    /// Message type: "CACHE_UPDATE" or "CLEAR_CACHE". Other types are ignored.
    #[serde(rename = "type")]
    pub message_type: String,
}

/// Output from the control_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlMessageOutput {
    /// Whether the message type was recognised.
    pub handled: bool,
    /// Notification broadcast to open clients, e.g. `{"type":"CACHE_CLEARED"}`.
    pub notification: Option<serde_json::Value>,
}

/// Implementation of the control_message tool.
pub async fn control_impl(
    registration: &Registration, params: ControlMessageParams,
) -> Result<CallToolResult, McpError> {
    let worker = registration
        .active()
        .await
        .ok_or_else(|| Error::InvalidState("no active worker".into()))?;

    let message = serde_json::json!({ "type": params.message_type }).to_string();
    let notification = worker.on_message_json(&message).await?;

    let output = ControlMessageOutput {
        handled: notification.is_some(),
        notification: notification
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| Error::InvalidInput(format!("Failed to serialize notification: {e}")))?,
    };
    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}
