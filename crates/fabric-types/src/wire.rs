//! Response envelopes shared by the ledger and coordinator wire protocols (§6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ReceiptId, TaskId, TenantId};
use crate::receipt::Receipt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendReceiptResponse {
    pub receipt_id: ReceiptId,
    pub stored_at: DateTime<Utc>,
    pub tenant_id: TenantId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxResponse {
    pub receipts: Vec<Receipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTimelineResponse {
    pub task_id: TaskId,
    pub receipts: Vec<Receipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskChainResponse {
    pub root: ReceiptId,
    pub receipts: Vec<Receipt>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub receipt_schema_version: String,
    pub capabilities: Vec<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            receipt_schema_version: "1.0".to_string(),
            capabilities: vec!["receipts".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapResponse {
    pub inbox: Vec<Receipt>,
    pub recent: Vec<Receipt>,
    pub config: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub recipient_ai: Option<String>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}

fn default_search_limit() -> i64 {
    50
}

/// A single field-level validation failure, echoed in `validation_failed`
/// responses (§6, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDetail {
    pub field: String,
    pub constraint: String,
    pub message: String,
}
