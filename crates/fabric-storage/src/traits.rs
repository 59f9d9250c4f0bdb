//! Tenant-scoped storage traits for receipts and tasks (§4.1, §4.3/§4.4).
//!
//! Every method takes `tenant_id` explicitly and every implementation MUST
//! fold it into the query predicate — tenant isolation is a storage-layer
//! correctness property, not just an API-layer one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fabric_types::{Receipt, ReceiptId, Task, TaskId, TaskStatus, TenantId};

use crate::error::StorageResult;

/// Outcome of an `Append` attempt, distinguishing a fresh insert from an
/// idempotent re-post of an existing `(tenant_id, receipt_id)` (I1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: Option<String>,
    pub recipient_ai: Option<String>,
    pub task_type: Option<String>,
    pub phase: Option<String>,
    pub limit: i64,
}

#[async_trait]
pub trait ReceiptStorage: Send + Sync {
    async fn append(&self, receipt: &Receipt) -> StorageResult<AppendOutcome>;
    async fn get(&self, tenant_id: &TenantId, receipt_id: &ReceiptId) -> StorageResult<Option<Receipt>>;
    async fn inbox(&self, tenant_id: &TenantId, recipient_ai: &str, limit: i64) -> StorageResult<Vec<Receipt>>;
    async fn timeline(&self, tenant_id: &TenantId, task_id: &TaskId, ascending: bool) -> StorageResult<Vec<Receipt>>;
    async fn children_of(&self, tenant_id: &TenantId, caused_by: &ReceiptId) -> StorageResult<Vec<Receipt>>;
    async fn recent_for(&self, tenant_id: &TenantId, recipient_ai: &str, limit: i64) -> StorageResult<Vec<Receipt>>;
    async fn archive(&self, tenant_id: &TenantId, receipt_id: &ReceiptId) -> StorageResult<bool>;
    async fn search(&self, tenant_id: &TenantId, query: &SearchQuery) -> StorageResult<Vec<Receipt>>;
}

#[async_trait]
pub trait TaskStorage: Send + Sync {
    async fn insert(&self, task: &Task) -> StorageResult<()>;
    async fn get(&self, tenant_id: &TenantId, task_id: &TaskId) -> StorageResult<Option<Task>>;
    async fn list(&self, tenant_id: &TenantId, status: Option<TaskStatus>, limit: i64) -> StorageResult<Vec<Task>>;

    /// Selects and leases up to `max_tasks` queued rows using a skip-locked
    /// read, ordered `priority DESC, created_at ASC` (§4.4). Implementations
    /// MUST perform selection and lease assignment in one transaction so
    /// that no two concurrent callers can claim the same row.
    async fn lease_next(
        &self,
        tenant_id: &TenantId,
        worker_id: &str,
        preferred_kinds: &[String],
        max_tasks: i64,
        lease_duration_secs: i64,
    ) -> StorageResult<Vec<Task>>;

    async fn heartbeat(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        worker_id: &str,
        lease_duration_secs: i64,
    ) -> StorageResult<Option<Task>>;

    async fn complete(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        worker_id: &str,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<Option<Task>>;

    /// Requeues the task (attempt += 1, lease fields cleared) iff `retry`
    /// is true, otherwise marks it `failed`. Returns the task as it stood
    /// after the transition, or `None` if the lease no longer belongs to
    /// `worker_id`.
    async fn fail(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        worker_id: &str,
        retry: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>>;

    /// Returns every `leased` row (any tenant) whose lease has expired, for
    /// the Expiry Reaper (§4.5). Each returned task still carries its own
    /// `tenant_id`.
    async fn find_expired_leases(&self, now: DateTime<Utc>) -> StorageResult<Vec<Task>>;

    /// Applies the same reclaim policy as `Fail(retryable=true)` to a task
    /// discovered expired by the reaper.
    async fn reclaim_expired(&self, tenant_id: &TenantId, task_id: &TaskId, now: DateTime<Utc>) -> StorageResult<Task>;
}
