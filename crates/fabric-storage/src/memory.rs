//! In-memory storage for fast, deterministic tests of ledger and
//! coordinator logic without a real Postgres instance.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fabric_types::{Receipt, ReceiptId, Task, TaskId, TaskStatus, TenantId};

use crate::error::{StorageError, StorageResult};
use crate::traits::{AppendOutcome, ReceiptStorage, SearchQuery, TaskStorage};

#[derive(Default)]
pub struct InMemoryStorage {
    receipts: Mutex<HashMap<(String, String), Receipt>>,
    tasks: Mutex<HashMap<(String, String), Task>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant_id: &TenantId, id: &str) -> (String, String) {
        (tenant_id.as_str().to_string(), id.to_string())
    }
}

#[async_trait]
impl ReceiptStorage for InMemoryStorage {
    async fn append(&self, receipt: &Receipt) -> StorageResult<AppendOutcome> {
        let mut receipts = self.receipts.lock().unwrap();
        let key = Self::key(&receipt.tenant_id, receipt.receipt_id.as_str());
        if receipts.contains_key(&key) {
            return Ok(AppendOutcome::Duplicate);
        }
        receipts.insert(key, receipt.clone());
        Ok(AppendOutcome::Inserted)
    }

    async fn get(&self, tenant_id: &TenantId, receipt_id: &ReceiptId) -> StorageResult<Option<Receipt>> {
        let receipts = self.receipts.lock().unwrap();
        Ok(receipts.get(&Self::key(tenant_id, receipt_id.as_str())).cloned())
    }

    async fn inbox(&self, tenant_id: &TenantId, recipient_ai: &str, limit: i64) -> StorageResult<Vec<Receipt>> {
        let receipts = self.receipts.lock().unwrap();
        let mut matching: Vec<Receipt> = receipts
            .values()
            .filter(|r| {
                r.tenant_id.as_str() == tenant_id.as_str()
                    && r.recipient_ai == recipient_ai
                    && r.phase == fabric_types::Phase::Accepted
                    && r.archived_at.is_none()
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        matching.truncate(limit.clamp(1, 100) as usize);
        Ok(matching)
    }

    async fn timeline(&self, tenant_id: &TenantId, task_id: &TaskId, ascending: bool) -> StorageResult<Vec<Receipt>> {
        let receipts = self.receipts.lock().unwrap();
        let mut matching: Vec<Receipt> = receipts
            .values()
            .filter(|r| r.tenant_id.as_str() == tenant_id.as_str() && &r.task_id == task_id)
            .cloned()
            .collect();
        if ascending {
            matching.sort_by(|a, b| a.stored_at.cmp(&b.stored_at));
        } else {
            matching.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        }
        Ok(matching)
    }

    async fn children_of(&self, tenant_id: &TenantId, caused_by: &ReceiptId) -> StorageResult<Vec<Receipt>> {
        let receipts = self.receipts.lock().unwrap();
        let mut matching: Vec<Receipt> = receipts
            .values()
            .filter(|r| {
                r.tenant_id.as_str() == tenant_id.as_str()
                    && r.caused_by_receipt_id.as_ref() == Some(caused_by)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.stored_at.cmp(&b.stored_at));
        Ok(matching)
    }

    async fn recent_for(&self, tenant_id: &TenantId, recipient_ai: &str, limit: i64) -> StorageResult<Vec<Receipt>> {
        let receipts = self.receipts.lock().unwrap();
        let mut matching: Vec<Receipt> = receipts
            .values()
            .filter(|r| r.tenant_id.as_str() == tenant_id.as_str() && r.recipient_ai == recipient_ai)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        matching.truncate(limit.max(0) as usize);
        Ok(matching)
    }

    async fn archive(&self, tenant_id: &TenantId, receipt_id: &ReceiptId) -> StorageResult<bool> {
        let mut receipts = self.receipts.lock().unwrap();
        match receipts.get_mut(&Self::key(tenant_id, receipt_id.as_str())) {
            Some(r) if r.archived_at.is_none() => {
                r.archived_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn search(&self, tenant_id: &TenantId, query: &SearchQuery) -> StorageResult<Vec<Receipt>> {
        let receipts = self.receipts.lock().unwrap();
        let mut matching: Vec<Receipt> = receipts
            .values()
            .filter(|r| r.tenant_id.as_str() == tenant_id.as_str())
            .filter(|r| query.recipient_ai.as_deref().map_or(true, |v| r.recipient_ai == v))
            .filter(|r| query.task_type.as_deref().map_or(true, |v| r.task_type == v))
            .filter(|r| query.phase.as_deref().map_or(true, |p| r.phase.as_wire_str() == p))
            .filter(|r| {
                query
                    .text
                    .as_deref()
                    .map_or(true, |t| r.task_summary.to_lowercase().contains(&t.to_lowercase()))
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.stored_at.cmp(&a.stored_at));
        matching.truncate(query.limit.clamp(1, 200) as usize);
        Ok(matching)
    }
}

#[async_trait]
impl TaskStorage for InMemoryStorage {
    async fn insert(&self, task: &Task) -> StorageResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.insert(Self::key(&task.tenant_id, task.task_id.as_str()), task.clone());
        Ok(())
    }

    async fn get(&self, tenant_id: &TenantId, task_id: &TaskId) -> StorageResult<Option<Task>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks.get(&Self::key(tenant_id, task_id.as_str())).cloned())
    }

    async fn list(&self, tenant_id: &TenantId, status: Option<TaskStatus>, limit: i64) -> StorageResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut matching: Vec<Task> = tasks
            .values()
            .filter(|t| t.tenant_id.as_str() == tenant_id.as_str())
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.created_at.cmp(&b.created_at)));
        matching.truncate(limit.clamp(1, 200) as usize);
        Ok(matching)
    }

    async fn lease_next(
        &self,
        tenant_id: &TenantId,
        worker_id: &str,
        preferred_kinds: &[String],
        max_tasks: i64,
        lease_duration_secs: i64,
    ) -> StorageResult<Vec<Task>> {
        let mut tasks = self.tasks.lock().unwrap();
        let mut candidate_keys: Vec<(String, String)> = tasks
            .values()
            .filter(|t| {
                t.tenant_id.as_str() == tenant_id.as_str()
                    && t.status == TaskStatus::Queued
                    && (preferred_kinds.is_empty() || preferred_kinds.contains(&t.task_type))
            })
            .map(|t| Self::key(&t.tenant_id, t.task_id.as_str()))
            .collect();

        candidate_keys.sort_by(|a, b| {
            let ta = &tasks[a];
            let tb = &tasks[b];
            tb.priority.cmp(&ta.priority).then(ta.created_at.cmp(&tb.created_at))
        });
        candidate_keys.truncate(max_tasks.max(0) as usize);

        let now = Utc::now();
        let mut leased = Vec::with_capacity(candidate_keys.len());
        for key in candidate_keys {
            let task = tasks.get_mut(&key).unwrap();
            task.status = TaskStatus::Leased;
            task.lease_id = Some(fabric_types::LeaseId::generate());
            task.worker_id = Some(worker_id.to_string());
            task.lease_expires_at = Some(now + chrono::Duration::seconds(lease_duration_secs));
            task.started_at = Some(now);
            leased.push(task.clone());
        }
        Ok(leased)
    }

    async fn heartbeat(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        worker_id: &str,
        lease_duration_secs: i64,
    ) -> StorageResult<Option<Task>> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.values_mut().find(|t| {
            t.tenant_id.as_str() == tenant_id.as_str()
                && t.status == TaskStatus::Leased
                && t.lease_id.as_ref().map(|l| l.as_str()) == Some(lease_id)
                && t.worker_id.as_deref() == Some(worker_id)
        });
        match task {
            Some(task) => {
                task.lease_expires_at = Some(Utc::now() + chrono::Duration::seconds(lease_duration_secs));
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        worker_id: &str,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<Option<Task>> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.values_mut().find(|t| {
            t.tenant_id.as_str() == tenant_id.as_str()
                && t.status == TaskStatus::Leased
                && t.lease_id.as_ref().map(|l| l.as_str()) == Some(lease_id)
                && t.worker_id.as_deref() == Some(worker_id)
        });
        match task {
            Some(task) => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(completed_at);
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    async fn fail(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        worker_id: &str,
        retry: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.values_mut().find(|t| {
            t.tenant_id.as_str() == tenant_id.as_str()
                && t.status == TaskStatus::Leased
                && t.lease_id.as_ref().map(|l| l.as_str()) == Some(lease_id)
                && t.worker_id.as_deref() == Some(worker_id)
        });
        match task {
            Some(task) => {
                if retry && task.can_retry() {
                    task.attempt += 1;
                    task.status = TaskStatus::Queued;
                    task.lease_id = None;
                    task.worker_id = None;
                    task.lease_expires_at = None;
                } else {
                    task.status = TaskStatus::Failed;
                    task.completed_at = Some(now);
                }
                Ok(Some(task.clone()))
            }
            None => Ok(None),
        }
    }

    async fn find_expired_leases(&self, now: DateTime<Utc>) -> StorageResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        Ok(tasks
            .values()
            .filter(|t| t.status == TaskStatus::Leased && t.lease_expires_at.map_or(false, |e| e < now))
            .cloned()
            .collect())
    }

    async fn reclaim_expired(&self, tenant_id: &TenantId, task_id: &TaskId, now: DateTime<Utc>) -> StorageResult<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&Self::key(tenant_id, task_id.as_str()))
            .ok_or_else(|| StorageError::NotFound(task_id.to_string()))?;

        if task.status != TaskStatus::Leased {
            return Err(StorageError::Conflict(format!("{task_id} is not leased")));
        }

        if task.can_retry() {
            task.attempt += 1;
            task.status = TaskStatus::Queued;
            task.lease_id = None;
            task.worker_id = None;
            task.lease_expires_at = None;
        } else {
            task.status = TaskStatus::Expired;
            task.completed_at = Some(now);
        }
        Ok(task.clone())
    }
}
