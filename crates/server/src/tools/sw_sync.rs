//! sw_sync tool implementation.
//!
//! Queues attendance records (optional) and fires the sync event for a
//! tag. A failed run leaves the tag pending and surfaces as `SYNC_FAILED`
//! so the caller can retry later.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use swcache_client::Registration;
use swcache_client::worker::{ATTENDANCE_SYNC_TAG, AttendanceSync, PendingSync, SyncOutcome};

use crate::error::{ToolError, json_result};

/// Input parameters for sw_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwSyncParams {
    /// Sync tag to fire (default: "sync-attendance").
    #[serde(default = "default_tag")]
    pub tag: String,

    /// Attendance records to queue before syncing. Only valid for the
    /// attendance tag.
    #[serde(default)]
    pub records: Vec<serde_json::Value>,
}

fn default_tag() -> String {
    ATTENDANCE_SYNC_TAG.to_string()
}

/// Output structure for sw_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwSyncOutput {
    pub tag: String,
    pub outcome: SyncOutcome,
    /// Tags still waiting for a successful run.
    pub pending: Vec<PendingSync>,
}

/// Implementation of the sw_sync tool.
pub async fn sync_impl(
    registration: &Registration, attendance: &AttendanceSync, params: SwSyncParams,
) -> Result<CallToolResult, McpError> {
    if params.tag.trim().is_empty() {
        return Err(ToolError::InvalidInput("tag cannot be empty".into()).into());
    }

    if !params.records.is_empty() {
        if params.tag != ATTENDANCE_SYNC_TAG {
            return Err(ToolError::InvalidInput(format!("records are only accepted for {ATTENDANCE_SYNC_TAG}")).into());
        }
        for record in params.records {
            attendance.enqueue(record).await;
        }
    }

    let outcome = registration.sync(&params.tag).await?;
    let pending = registration.context().sync.pending().await;

    json_result(&SwSyncOutput { tag: params.tag, outcome, pending })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{attendance_for, started_registration, test_registration, tool_output};
    use serde_json::json;

    #[tokio::test]
    async fn test_sync_requires_active_worker() {
        let registration = test_registration().await;
        let attendance = attendance_for(&registration);
        let params = SwSyncParams { tag: default_tag(), records: vec![] };

        let err = sync_impl(&registration, &attendance, params).await.unwrap_err();
        assert_eq!(err.code.0, -32021);
    }

    #[tokio::test]
    async fn test_records_rejected_for_other_tags() {
        let registration = started_registration().await;
        let attendance = attendance_for(&registration);
        let params = SwSyncParams { tag: "sync-photos".into(), records: vec![json!({"id": 1})] };

        let err = sync_impl(&registration, &attendance, params).await.unwrap_err();
        assert_eq!(err.code.0, -32602);
        assert_eq!(attendance.queued().await, 0);
    }

    #[tokio::test]
    async fn test_unbound_tag_stays_pending() {
        let registration = started_registration().await;
        let attendance = attendance_for(&registration);
        let params = SwSyncParams { tag: "sync-photos".into(), records: vec![] };

        let value = tool_output(sync_impl(&registration, &attendance, params).await.unwrap());
        assert_eq!(value["outcome"], "unhandled");
        assert_eq!(value["pending"][0]["tag"], "sync-photos");
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_records_and_tag() {
        let registration = started_registration().await;
        let attendance = std::sync::Arc::new(attendance_for(&registration));
        registration
            .context()
            .sync
            .bind(ATTENDANCE_SYNC_TAG, attendance.clone())
            .await;

        let params = SwSyncParams { tag: default_tag(), records: vec![json!({"employeeId": "E-3"})] };
        let err = sync_impl(&registration, &attendance, params).await.unwrap_err();

        assert_eq!(err.code.0, -32022);
        assert_eq!(attendance.queued().await, 1);
        assert_eq!(registration.context().sync.pending_count().await, 1);
    }
}
