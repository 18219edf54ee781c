//! sw_fetch tool implementation.
//!
//! Runs a request through the registration exactly as a page fetch would
//! be intercepted, and reports where the response came from.

use chrono::Utc;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::Registration;
use swcache_client::fetch::resolve;
use swcache_core::{Request, RequestMode, ResponseSource, ResponseType};

use crate::error::{ToolError, json_result};

/// Input parameters for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Absolute URL, or a path resolved against the configured origin.
    pub url: String,

    /// Request mode: "navigate", "same-origin" (default), "cors" or "no-cors".
    #[serde(default)]
    pub mode: Option<String>,

    /// Optional Accept header.
    #[serde(default)]
    pub accept: Option<String>,

    /// Include the body in the output when it is valid UTF-8 (default: true).
    #[serde(default = "default_true")]
    pub include_body: bool,
}

fn default_true() -> bool {
    true
}

/// Output structure for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchOutput {
    pub url: String,
    pub status: u16,
    /// "network", "cache" or "synthetic".
    pub source: ResponseSource,
    pub response_type: ResponseType,
    pub content_type: Option<String>,
    pub body_bytes: usize,
    /// Body text; absent for binary bodies or when not requested.
    pub body: Option<String>,
    /// ISO8601 timestamp of when the response was served.
    pub served_at: String,
}

pub(crate) fn build_request(registration: &Registration, params: &SwFetchParams) -> Result<Request, McpError> {
    let origin = registration
        .config()
        .origin_url()
        .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
    let url = resolve(&origin, &params.url).map_err(|e| ToolError::InvalidInput(e.to_string()))?;

    let mode = match params.mode.as_deref() {
        Some(mode) => mode.parse::<RequestMode>()?,
        None => RequestMode::SameOrigin,
    };

    let mut request = match mode {
        RequestMode::Navigate => Request::navigate(url),
        mode => Request::get(url).with_mode(mode),
    };
    if let Some(accept) = &params.accept {
        request = request.with_accept(accept.clone());
    }
    Ok(request)
}

/// Implementation of the sw_fetch tool.
pub async fn fetch_impl(registration: &Registration, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    let request = build_request(registration, &params)?;
    let url = request.url.to_string();

    let response = registration.fetch(request).await?;

    let status = response.status;
    let source = response.source;
    let response_type = response.response_type;
    let content_type = response.content_type().map(str::to_string);
    let body = response.into_body();

    let output = SwFetchOutput {
        url,
        status,
        source,
        response_type,
        content_type,
        body_bytes: body.len(),
        body: if params.include_body { std::str::from_utf8(&body).ok().map(str::to_string) } else { None },
        served_at: Utc::now().to_rfc3339(),
    };

    json_result(&output)
}
