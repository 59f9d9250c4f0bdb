//! The Worker registry — external, `(tenant_id, worker_id)` unique.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TenantId;
use crate::plan::WorkerCapability;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Alive,
    Stale,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub tenant_id: TenantId,
    pub worker_id: String,
    pub capabilities: Vec<WorkerCapability>,
    pub accepted_task_types: Vec<String>,
    pub last_seen: DateTime<Utc>,
    pub liveness: Liveness,
}
