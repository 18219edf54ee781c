//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the registration.
use std::sync::Arc;

use crate::tools::sw_fetch::{SwFetchParams, fetch_impl};
use crate::tools::sw_message::{SwMessageParams, message_impl};
use crate::tools::sw_status::status_impl;
use crate::tools::sw_sync::{SwSyncParams, sync_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use swcache_client::{AttendanceSync, Registration};

/// The main MCP server handler for swcache.
#[derive(Clone)]
pub struct SwCacheServer {
    tool_router: ToolRouter<Self>,
    registration: Arc<Registration>,
    attendance: Arc<AttendanceSync>,
}

/// Tool router implementation using the #[tool_router] macro.
#[tool_router]
impl SwCacheServer {
    /// Create a new server handler over a started registration.
    pub fn new(registration: Arc<Registration>, attendance: Arc<AttendanceSync>) -> Self {
        Self { tool_router: Self::tool_router(), registration, attendance }
    }

    /// Intercept a request the way a controlled page's fetch would be.
    #[tool(
        description = "Fetch a URL through the service worker. Applies the caching strategy for the resource category and reports whether the response came from the network, the cache or was synthesized offline."
    )]
    async fn sw_fetch(&self, params: Parameters<SwFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.registration, params.0).await
    }

    #[tool(
        description = "Post a control message to the service worker: SKIP_WAITING, CACHE_URLS {urls}, CLEAR_CACHE or GET_CACHE_INFO. Unknown types are ignored."
    )]
    async fn sw_message(&self, params: Parameters<SwMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.registration, params.0).await
    }

    #[tool(
        description = "Fire a background sync tag (default sync-attendance), optionally queueing attendance records first. Failed syncs stay pending for retry."
    )]
    async fn sw_sync(&self, params: Parameters<SwSyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.registration, &self.attendance, params.0).await
    }

    #[tool(description = "Show active and waiting worker versions, open clients, pending sync tags and cache stores.")]
    async fn sw_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.registration).await
    }
}

impl ServerHandler for SwCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "swcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
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
