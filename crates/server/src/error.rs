//! Structured errors for the swcache tools.
//!
//! Engine failures arrive as `swcache_core::Error` and convert directly;
//! these cover what the tool layer itself can get wrong.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Invalid tool parameters (e.g., an unknown request mode).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// A tool result could not be encoded.
    #[error("ENCODE_FAILED: {0}")]
    EncodeFailed(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::EncodeFailed(msg) => (-32000, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

/// Encode `output` as a pretty JSON tool result.
pub fn json_result<T: serde::Serialize>(output: &T) -> Result<rmcp::model::CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::EncodeFailed(e.to_string()))?;
    Ok(rmcp::model::CallToolResult::success(vec![rmcp::model::Content::text(json)]))
}
