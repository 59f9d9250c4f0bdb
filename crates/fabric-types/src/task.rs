//! The Task — the coordinator-owned mutable state machine (§3 T1–T3, §4.3/4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{LeaseId, ReceiptId, TaskId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Leased,
    Completed,
    Failed,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub tenant_id: TenantId,
    pub task_type: String,

    pub recipient_ai: String,
    pub from_principal: String,
    pub for_principal: String,

    pub expected_outcome_kind: Option<String>,
    pub expected_artifact_mime: Option<String>,

    pub parent_task_id: Option<TaskId>,
    pub caused_by_receipt_id: Option<ReceiptId>,

    pub priority: i32,
    pub status: TaskStatus,
    pub attempt: i32,
    pub max_attempts: i32,

    pub lease_id: Option<LeaseId>,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub task_body: serde_json::Value,
    pub inputs: serde_json::Value,
    pub metadata: serde_json::Value,
}

/// A task specification accepted by `Create` (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_type: String,
    pub recipient_ai: String,
    pub from_principal: String,
    pub for_principal: String,
    #[serde(default)]
    pub expected_outcome_kind: Option<String>,
    #[serde(default)]
    pub expected_artifact_mime: Option<String>,
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,
    #[serde(default)]
    pub caused_by_receipt_id: Option<ReceiptId>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default)]
    pub task_body: serde_json::Value,
    #[serde(default)]
    pub inputs: serde_json::Value,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_priority() -> i32 {
    0
}

fn default_max_attempts() -> i32 {
    3
}

impl Task {
    /// Invariant T1: lease fields are populated iff the task is leased.
    pub fn lease_fields_consistent(&self) -> bool {
        let leased = self.status == TaskStatus::Leased;
        let has_lease =
            self.lease_id.is_some() && self.worker_id.is_some() && self.lease_expires_at.is_some();
        leased == has_lease
    }

    /// Invariant T2: terminal states set completed_at.
    pub fn terminal_sets_completed_at(&self) -> bool {
        let terminal = matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Expired
        );
        !terminal || self.completed_at.is_some()
    }

    /// Invariant T3: attempt never exceeds max_attempts.
    pub fn attempt_within_bounds(&self) -> bool {
        self.attempt <= self.max_attempts
    }

    pub fn can_retry(&self) -> bool {
        self.attempt + 1 < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_task() -> Task {
        Task {
            task_id: TaskId::generate(),
            tenant_id: TenantId::new("t1"),
            task_type: "demo".to_string(),
            recipient_ai: "worker.alice".to_string(),
            from_principal: "user.bob".to_string(),
            for_principal: "user.bob".to_string(),
            expected_outcome_kind: None,
            expected_artifact_mime: None,
            parent_task_id: None,
            caused_by_receipt_id: None,
            priority: 0,
            status: TaskStatus::Queued,
            attempt: 0,
            max_attempts: 3,
            lease_id: None,
            worker_id: None,
            lease_expires_at: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            task_body: serde_json::json!({}),
            inputs: serde_json::json!({}),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn queued_task_has_no_lease_fields() {
        let t = queued_task();
        assert!(t.lease_fields_consistent());
    }

    #[test]
    fn leased_task_without_lease_fields_is_inconsistent() {
        let mut t = queued_task();
        t.status = TaskStatus::Leased;
        assert!(!t.lease_fields_consistent());
    }

    #[test]
    fn can_retry_respects_max_attempts() {
        let mut t = queued_task();
        t.attempt = 2;
        t.max_attempts = 3;
        assert!(!t.can_retry());
        t.attempt = 1;
        assert!(t.can_retry());
    }
}
