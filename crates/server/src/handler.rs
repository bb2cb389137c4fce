//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the active worker. Each MCP session also joins the
//! worker's clients as an open page and receives cache notifications as
//! logging messages.
use std::sync::Arc;

use crate::tools::{
    BackgroundSyncParams, CacheStatusParams, ControlMessageParams, InterceptParams, control_impl, intercept_impl,
    status_impl, sync_impl,
};

use fxcache_client::{ClientHandle, Clients, Notification, Registration};
use fxcache_core::CacheDb;
use rmcp::{
    ErrorData as McpError, Peer, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, LoggingLevel,
        LoggingMessageNotificationParam, PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
    },
    service::{NotificationContext, RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for fxcache.
#[derive(Clone)]
pub struct FxCacheServer {
    tool_router: ToolRouter<Self>,
    registration: Arc<Registration>,
    cache: CacheDb,
    clients: Arc<Clients>,
}

#[tool_router]
impl FxCacheServer {
    pub fn new(registration: Arc<Registration>, cache: CacheDb, clients: Arc<Clients>) -> Self {
        Self { tool_router: Self::tool_router(), registration, cache, clients }
    }

    /// Register a session as an open page, controlled by the version serving now.
    async fn connect_session(&self) -> ClientHandle {
        let controller = self.registration.active().await.map(|worker| worker.version().to_string());
        self.clients.connect_controlled(controller.as_deref())
    }

    #[tool(
        description = "Offer a page request to the offline cache layer. Returns the response the page would receive (status, headers, body), or an opaque marker."
    )]
    async fn intercept(&self, params: Parameters<InterceptParams>) -> Result<CallToolResult, McpError> {
        intercept_impl(&self.registration, params.0).await
    }

    /// Destructive for CLEAR_CACHE: every generation is deleted without confirmation.
    #[tool(
        description = "Post a control message to the active worker. CACHE_UPDATE refetches exchange rates; CLEAR_CACHE deletes every cached generation."
    )]
    async fn control_message(&self, params: Parameters<ControlMessageParams>) -> Result<CallToolResult, McpError> {
        control_impl(&self.registration, params.0).await
    }

    #[tool(description = "Fire a background-sync trigger. The currency-rate tag refreshes cached rates silently.")]
    async fn background_sync(&self, params: Parameters<BackgroundSyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.registration, params.0).await
    }

    #[tool(description = "Report the active worker version, its lifecycle state and the cached generations.")]
    async fn cache_status(&self, params: Parameters<CacheStatusParams>) -> Result<CallToolResult, McpError> {
        status_impl(&self.registration, &self.cache, params.0).await
    }
}

fn logging_message(notification: Notification) -> Result<LoggingMessageNotificationParam, serde_json::Error> {
    Ok(LoggingMessageNotificationParam {
        level: LoggingLevel::Info,
        logger: Some("fxcache".into()),
        data: serde_json::to_value(notification)?,
    })
}

/// Relay notifications to the peer until either side goes away. Dropping the
/// handle on return takes the session out of the client registry.
async fn forward_notifications(mut session: ClientHandle, peer: Peer<RoleServer>) {
    while let Some(notification) = session.recv().await {
        let message = match logging_message(notification) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(client = session.id, error = %e, "could not encode notification");
                continue;
            }
        };
        if let Err(e) = peer.notify_logging_message(message).await {
            tracing::debug!(client = session.id, error = %e, "session closed");
            break;
        }
    }
}

impl ServerHandler for FxCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "fxcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().enable_logging().build(),
            ..Default::default()
        }
    }

    async fn on_initialized(&self, context: NotificationContext<RoleServer>) {
        let session = self.connect_session().await;
        tracing::info!(client = session.id, controller = ?self.clients.controller(session.id), "client initialized");
        tokio::spawn(forward_notifications(session, context.peer));
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
