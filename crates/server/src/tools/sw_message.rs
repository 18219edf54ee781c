//! sw_message tool implementation.
//!
//! Posts a control message (`SKIP_WAITING`, `CACHE_URLS`, `CLEAR_CACHE`,
//! `GET_CACHE_INFO`) to the registration. Unknown types are accepted and
//! ignored.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::Registration;
use swcache_client::worker::{CacheInfo, ControlMessage, MessageOutcome};
use tokio::sync::oneshot;

use crate::error::json_result;

/// Input parameters for sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageParams {
    /// Message payload, e.g. `{"type": "CACHE_URLS", "urls": ["/admin.html"]}`.
    pub message: serde_json::Value,
}

/// Output structure for sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageOutput {
    pub outcome: MessageOutcome,
    /// What arrived on the reply port, for `GET_CACHE_INFO`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<CacheInfo>,
}

/// Implementation of the sw_message tool.
pub async fn message_impl(registration: &Registration, params: SwMessageParams) -> Result<CallToolResult, McpError> {
    let message = ControlMessage::from_value(params.message);

    let (reply, port) = if message == ControlMessage::GetCacheInfo {
        let (tx, rx) = oneshot::channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    };

    let outcome = registration.post_message(message, reply).await?;
    let reply = match port {
        Some(rx) => rx.await.ok(),
        None => None,
    };

    json_result(&SwMessageOutput { outcome, reply })
}
