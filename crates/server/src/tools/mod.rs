//! MCP tool implementations.
//!
//! This module contains all tools exposed by the swcache server.

pub mod sw_fetch;
pub mod sw_message;
pub mod sw_status;
pub mod sw_sync;

pub use sw_fetch::{SwFetchOutput, SwFetchParams};
pub use sw_message::{SwMessageOutput, SwMessageParams};
pub use sw_sync::{SwSyncOutput, SwSyncParams};

#[cfg(test)]
pub(crate) use test_support::*;

#[cfg(test)]
mod test_support {
    use std::sync::Arc;
    use swcache_client::fetch::{FetchClient, FetchConfig};
    use swcache_client::{AttendanceSync, Registration, WorkerContext};
    use swcache_core::{AppConfig, CacheStorage};

    /// Nothing listens on the discard port, so every network call fails fast.
    fn offline_config() -> AppConfig {
        AppConfig { origin: "http://127.0.0.1:9".into(), precache_urls: vec![], timeout_ms: 2_000, ..Default::default() }
    }

    pub(crate) async fn test_registration() -> Registration {
        let config = offline_config();
        let storage = CacheStorage::open_in_memory().await.unwrap();
        let network = Arc::new(FetchClient::new(FetchConfig::from_app_config(&config)).unwrap());
        Registration::new(config, WorkerContext::new(storage, network))
    }

    pub(crate) async fn started_registration() -> Registration {
        let registration = test_registration().await;
        registration.start().await.unwrap();
        registration
    }

    pub(crate) fn attendance_for(registration: &Registration) -> AttendanceSync {
        let config = registration.config();
        let client = FetchClient::new(FetchConfig::from_app_config(config)).unwrap();
        AttendanceSync::from_config(config, client.http().clone()).unwrap()
    }

    pub(crate) fn tool_output(result: rmcp::model::CallToolResult) -> serde_json::Value {
        let content = serde_json::to_value(&result.content[0]).unwrap();
        let text = content.get("text").and_then(|v| v.as_str()).expect("Expected text field in content");
        serde_json::from_str(text).unwrap()
    }
}
