//! sw_status tool implementation.
//!
//! Reports active and waiting workers, open clients, pending sync tags
//! and every store with its entry count.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use swcache_client::Registration;

use crate::error::json_result;

/// Implementation of the sw_status tool.
pub async fn status_impl(registration: &Registration) -> Result<CallToolResult, McpError> {
    let status = registration.status().await?;
    json_result(&status)
}
