//! Coordinator wire request/response bodies (§6).

use fabric_types::{ArtifactDescriptor, NaString, OutcomeKind, ReceiptId, Status, TaskId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct LeaseRequest {
    pub worker_id: String,
    #[serde(default)]
    pub preferred_kinds: Vec<String>,
    #[serde(default = "default_max_tasks")]
    pub max_tasks: i64,
}

fn default_max_tasks() -> i64 {
    1
}

fn default_outcome_kind() -> OutcomeKind {
    OutcomeKind::Na
}

#[derive(Debug, Clone, Serialize)]
pub struct LeasedTask {
    pub task_id: TaskId,
    pub lease_id: String,
    pub task_type: String,
    pub task_body: serde_json::Value,
    pub inputs: serde_json::Value,
    pub attempt: i32,
    pub lease_expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatRequest {
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatResponse {
    pub lease_expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    pub worker_id: String,
    pub status: Status,
    #[serde(default = "default_outcome_kind")]
    pub outcome_kind: OutcomeKind,
    #[serde(default = "NaString::none")]
    pub outcome_text: NaString,
    #[serde(default)]
    pub artifact: ArtifactDescriptor,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteResponse {
    pub task_id: TaskId,
    pub lease_id: String,
    pub status: Status,
    pub receipt_id: Option<ReceiptId>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailRequest {
    pub worker_id: String,
    pub error_message: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailResponse {
    pub status: String,
    pub retry_scheduled: bool,
    pub next_attempt: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateTaskResponse {
    pub task_id: TaskId,
    pub receipt_id: Option<ReceiptId>,
    pub status: &'static str,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReclaimResponse {
    pub expired: u64,
}
