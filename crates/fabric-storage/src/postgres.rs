//! PostgreSQL-backed implementation of [`ReceiptStorage`] and [`TaskStorage`].
//!
//! Follows the JSONB-column-plus-indexed-scalars pattern used throughout
//! the fabric's other daemons: the full entity round-trips through a `data`
//! JSONB column, while the columns the query patterns in §6 actually filter
//! or sort on are broken out and kept in sync on every write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fabric_types::{Receipt, ReceiptId, Task, TaskId, TaskStatus, TenantId};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use std::time::Duration;

use crate::error::{StorageError, StorageResult};
use crate::traits::{AppendOutcome, ReceiptStorage, SearchQuery, TaskStorage};

#[derive(Debug, Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub async fn new(url: &str, max_connections: u32, connect_timeout_secs: u64) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let storage = Self { pool };
        storage.initialize_schema().await?;
        Ok(storage)
    }

    async fn initialize_schema(&self) -> StorageResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS receipts (
                tenant_id TEXT NOT NULL,
                receipt_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                phase TEXT NOT NULL,
                recipient_ai TEXT NOT NULL,
                caused_by_receipt_id TEXT,
                stored_at TIMESTAMPTZ NOT NULL,
                archived_at TIMESTAMPTZ,
                data JSONB NOT NULL,
                PRIMARY KEY (tenant_id, receipt_id)
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS receipts_inbox ON receipts (tenant_id, recipient_ai, phase, stored_at DESC);"#,
            r#"CREATE INDEX IF NOT EXISTS receipts_timeline ON receipts (tenant_id, task_id, stored_at);"#,
            r#"CREATE INDEX IF NOT EXISTS receipts_chain ON receipts (tenant_id, caused_by_receipt_id);"#,
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                tenant_id TEXT NOT NULL,
                task_id TEXT NOT NULL,
                status TEXT NOT NULL,
                priority INT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                lease_id TEXT,
                worker_id TEXT,
                lease_expires_at TIMESTAMPTZ,
                data JSONB NOT NULL,
                PRIMARY KEY (tenant_id, task_id)
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS tasks_queue ON tasks (tenant_id, status, priority DESC, created_at ASC);"#,
            r#"CREATE INDEX IF NOT EXISTS tasks_leases ON tasks (tenant_id, status, lease_expires_at);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Query(e.to_string()))?;
        }

        Ok(())
    }

    fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<Value> {
        serde_json::to_value(value).map_err(|e| StorageError::InvalidData(e.to_string()))
    }

    fn from_json<T: serde::de::DeserializeOwned>(value: Value) -> StorageResult<T> {
        serde_json::from_value(value).map_err(|e| StorageError::InvalidData(e.to_string()))
    }
}

#[async_trait]
impl ReceiptStorage for PostgresStorage {
    async fn append(&self, receipt: &Receipt) -> StorageResult<AppendOutcome> {
        let data = Self::to_json(receipt)?;
        let result = sqlx::query(
            r#"
            INSERT INTO receipts
                (tenant_id, receipt_id, task_id, phase, recipient_ai, caused_by_receipt_id, stored_at, archived_at, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tenant_id, receipt_id) DO NOTHING
            "#,
        )
        .bind(receipt.tenant_id.as_str())
        .bind(receipt.receipt_id.as_str())
        .bind(receipt.task_id.as_str())
        .bind(format!("{:?}", receipt.phase).to_lowercase())
        .bind(&receipt.recipient_ai)
        .bind(receipt.caused_by_receipt_id.as_ref().map(|r| r.as_str().to_string()))
        .bind(receipt.stored_at)
        .bind(receipt.archived_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        if result.rows_affected() > 0 {
            Ok(AppendOutcome::Inserted)
        } else {
            Ok(AppendOutcome::Duplicate)
        }
    }

    async fn get(&self, tenant_id: &TenantId, receipt_id: &ReceiptId) -> StorageResult<Option<Receipt>> {
        let row = sqlx::query("SELECT data FROM receipts WHERE tenant_id = $1 AND receipt_id = $2")
            .bind(tenant_id.as_str())
            .bind(receipt_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn inbox(&self, tenant_id: &TenantId, recipient_ai: &str, limit: i64) -> StorageResult<Vec<Receipt>> {
        let rows = sqlx::query(
            r#"
            SELECT data FROM receipts
            WHERE tenant_id = $1 AND recipient_ai = $2 AND phase = 'accepted' AND archived_at IS NULL
            ORDER BY stored_at DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(recipient_ai)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn timeline(&self, tenant_id: &TenantId, task_id: &TaskId, ascending: bool) -> StorageResult<Vec<Receipt>> {
        let order = if ascending { "ASC" } else { "DESC" };
        let sql = format!(
            "SELECT data FROM receipts WHERE tenant_id = $1 AND task_id = $2 ORDER BY stored_at {order}"
        );
        let rows = sqlx::query(&sql)
            .bind(tenant_id.as_str())
            .bind(task_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn children_of(&self, tenant_id: &TenantId, caused_by: &ReceiptId) -> StorageResult<Vec<Receipt>> {
        let rows = sqlx::query(
            "SELECT data FROM receipts WHERE tenant_id = $1 AND caused_by_receipt_id = $2 ORDER BY stored_at ASC",
        )
        .bind(tenant_id.as_str())
        .bind(caused_by.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn recent_for(&self, tenant_id: &TenantId, recipient_ai: &str, limit: i64) -> StorageResult<Vec<Receipt>> {
        let rows = sqlx::query(
            "SELECT data FROM receipts WHERE tenant_id = $1 AND recipient_ai = $2 ORDER BY stored_at DESC LIMIT $3",
        )
        .bind(tenant_id.as_str())
        .bind(recipient_ai)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn archive(&self, tenant_id: &TenantId, receipt_id: &ReceiptId) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE receipts SET archived_at = now(), data = jsonb_set(data, '{archived_at}', to_jsonb(now())) \
             WHERE tenant_id = $1 AND receipt_id = $2 AND archived_at IS NULL",
        )
        .bind(tenant_id.as_str())
        .bind(receipt_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn search(&self, tenant_id: &TenantId, query: &SearchQuery) -> StorageResult<Vec<Receipt>> {
        let mut sql = String::from("SELECT data FROM receipts WHERE tenant_id = $1");
        let mut next_placeholder = 2;
        if query.recipient_ai.is_some() {
            sql.push_str(&format!(" AND recipient_ai = ${next_placeholder}"));
            next_placeholder += 1;
        }
        if query.phase.is_some() {
            sql.push_str(&format!(" AND phase = ${next_placeholder}"));
            next_placeholder += 1;
        }
        sql.push_str(" ORDER BY stored_at DESC LIMIT ");
        sql.push_str(&query.limit.clamp(1, 200).to_string());

        let mut q = sqlx::query(&sql).bind(tenant_id.as_str());
        if let Some(r) = &query.recipient_ai {
            q = q.bind(r);
        }
        if let Some(p) = &query.phase {
            q = q.bind(p);
        }

        let rows = q.fetch_all(&self.pool).await.map_err(|e| StorageError::Query(e.to_string()))?;

        let mut receipts: Vec<Receipt> = rows
            .into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
                Self::from_json(data)
            })
            .collect::<StorageResult<_>>()?;

        if let Some(text) = &query.text {
            let needle = text.to_lowercase();
            receipts.retain(|r| r.task_summary.to_lowercase().contains(&needle));
        }
        if let Some(task_type) = &query.task_type {
            receipts.retain(|r| &r.task_type == task_type);
        }

        Ok(receipts)
    }
}

#[async_trait]
impl TaskStorage for PostgresStorage {
    async fn insert(&self, task: &Task) -> StorageResult<()> {
        let data = Self::to_json(task)?;
        sqlx::query(
            r#"
            INSERT INTO tasks (tenant_id, task_id, status, priority, created_at, lease_id, worker_id, lease_expires_at, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(task.tenant_id.as_str())
        .bind(task.task_id.as_str())
        .bind(format!("{:?}", task.status).to_lowercase())
        .bind(task.priority)
        .bind(task.created_at)
        .bind(task.lease_id.as_ref().map(|l| l.as_str().to_string()))
        .bind(&task.worker_id)
        .bind(task.lease_expires_at)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, tenant_id: &TenantId, task_id: &TaskId) -> StorageResult<Option<Task>> {
        let row = sqlx::query("SELECT data FROM tasks WHERE tenant_id = $1 AND task_id = $2")
            .bind(tenant_id.as_str())
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn list(&self, tenant_id: &TenantId, status: Option<TaskStatus>, limit: i64) -> StorageResult<Vec<Task>> {
        let rows = if let Some(status) = status {
            sqlx::query(
                "SELECT data FROM tasks WHERE tenant_id = $1 AND status = $2 ORDER BY priority DESC, created_at ASC LIMIT $3",
            )
            .bind(tenant_id.as_str())
            .bind(format!("{:?}", status).to_lowercase())
            .bind(limit.clamp(1, 200))
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query("SELECT data FROM tasks WHERE tenant_id = $1 ORDER BY priority DESC, created_at ASC LIMIT $2")
                .bind(tenant_id.as_str())
                .bind(limit.clamp(1, 200))
                .fetch_all(&self.pool)
                .await
        }
        .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn lease_next(
        &self,
        tenant_id: &TenantId,
        worker_id: &str,
        preferred_kinds: &[String],
        max_tasks: i64,
        lease_duration_secs: i64,
    ) -> StorageResult<Vec<Task>> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Connection(e.to_string()))?;

        let rows = if !preferred_kinds.is_empty() {
            sqlx::query(
                r#"
                SELECT data FROM tasks
                WHERE tenant_id = $1 AND status = 'queued' AND data->>'task_type' = ANY($2)
                ORDER BY priority DESC, created_at ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(preferred_kinds)
            .bind(max_tasks)
            .fetch_all(&mut *tx)
            .await
        } else {
            sqlx::query(
                r#"
                SELECT data FROM tasks
                WHERE tenant_id = $1 AND status = 'queued'
                ORDER BY priority DESC, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(max_tasks)
            .fetch_all(&mut *tx)
            .await
        }
        .map_err(|e| StorageError::Query(e.to_string()))?;

        let mut leased = Vec::with_capacity(rows.len());
        let now = Utc::now();
        for row in rows {
            let data: Value = row.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
            let mut task: Task = Self::from_json(data)?;

            task.status = TaskStatus::Leased;
            task.lease_id = Some(fabric_types::LeaseId::generate());
            task.worker_id = Some(worker_id.to_string());
            task.lease_expires_at = Some(now + chrono::Duration::seconds(lease_duration_secs));
            task.started_at = Some(now);

            let data = Self::to_json(&task)?;
            sqlx::query(
                r#"
                UPDATE tasks SET status = 'leased', lease_id = $3, worker_id = $4, lease_expires_at = $5, data = $6
                WHERE tenant_id = $1 AND task_id = $2
                "#,
            )
            .bind(tenant_id.as_str())
            .bind(task.task_id.as_str())
            .bind(task.lease_id.as_ref().unwrap().as_str())
            .bind(worker_id)
            .bind(task.lease_expires_at)
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

            leased.push(task);
        }

        tx.commit().await.map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(leased)
    }

    async fn heartbeat(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        worker_id: &str,
        lease_duration_secs: i64,
    ) -> StorageResult<Option<Task>> {
        let new_expiry = Utc::now() + chrono::Duration::seconds(lease_duration_secs);
        let row = sqlx::query(
            r#"
            UPDATE tasks SET lease_expires_at = $4, data = jsonb_set(data, '{lease_expires_at}', to_jsonb($4::timestamptz))
            WHERE tenant_id = $1 AND status = 'leased' AND lease_id = $2 AND worker_id = $3
            RETURNING data
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(lease_id)
        .bind(worker_id)
        .bind(new_expiry)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        row.map(|r| {
            let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
            Self::from_json(data)
        })
        .transpose()
    }

    async fn complete(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        worker_id: &str,
        completed_at: DateTime<Utc>,
    ) -> StorageResult<Option<Task>> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Connection(e.to_string()))?;

        let row = sqlx::query(
            "SELECT data FROM tasks WHERE tenant_id = $1 AND status = 'leased' AND lease_id = $2 AND worker_id = $3",
        )
        .bind(tenant_id.as_str())
        .bind(lease_id)
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: Value = row.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
        let mut task: Task = Self::from_json(data)?;
        task.status = TaskStatus::Completed;
        task.completed_at = Some(completed_at);

        let data = Self::to_json(&task)?;
        sqlx::query("UPDATE tasks SET status = 'completed', data = $3 WHERE tenant_id = $1 AND task_id = $2")
            .bind(tenant_id.as_str())
            .bind(task.task_id.as_str())
            .bind(data)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        tx.commit().await.map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Some(task))
    }

    async fn fail(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        worker_id: &str,
        retry: bool,
        now: DateTime<Utc>,
    ) -> StorageResult<Option<Task>> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Connection(e.to_string()))?;

        let row = sqlx::query(
            "SELECT data FROM tasks WHERE tenant_id = $1 AND status = 'leased' AND lease_id = $2 AND worker_id = $3",
        )
        .bind(tenant_id.as_str())
        .bind(lease_id)
        .bind(worker_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let data: Value = row.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
        let mut task: Task = Self::from_json(data)?;

        let can_retry = retry && task.can_retry();
        if can_retry {
            task.attempt += 1;
            task.status = TaskStatus::Queued;
            task.lease_id = None;
            task.worker_id = None;
            task.lease_expires_at = None;
        } else {
            task.status = TaskStatus::Failed;
            task.completed_at = Some(now);
        }

        let status_str = format!("{:?}", task.status).to_lowercase();
        let data = Self::to_json(&task)?;
        sqlx::query(
            r#"
            UPDATE tasks SET status = $3, lease_id = $4, worker_id = $5, lease_expires_at = $6, data = $7
            WHERE tenant_id = $1 AND task_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(task.task_id.as_str())
        .bind(status_str)
        .bind(task.lease_id.as_ref().map(|l| l.as_str().to_string()))
        .bind(&task.worker_id)
        .bind(task.lease_expires_at)
        .bind(data)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        tx.commit().await.map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(Some(task))
    }

    async fn find_expired_leases(&self, now: DateTime<Utc>) -> StorageResult<Vec<Task>> {
        let rows = sqlx::query("SELECT data FROM tasks WHERE status = 'leased' AND lease_expires_at < $1")
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Query(e.to_string()))?;

        rows.into_iter()
            .map(|r| {
                let data: Value = r.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
                Self::from_json(data)
            })
            .collect()
    }

    async fn reclaim_expired(&self, tenant_id: &TenantId, task_id: &TaskId, now: DateTime<Utc>) -> StorageResult<Task> {
        let mut tx = self.pool.begin().await.map_err(|e| StorageError::Connection(e.to_string()))?;

        let row = sqlx::query(
            "SELECT data FROM tasks WHERE tenant_id = $1 AND task_id = $2 AND status = 'leased' FOR UPDATE",
        )
        .bind(tenant_id.as_str())
        .bind(task_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?
        .ok_or_else(|| StorageError::NotFound(task_id.to_string()))?;

        let data: Value = row.try_get("data").map_err(|e| StorageError::Query(e.to_string()))?;
        let mut task: Task = Self::from_json(data)?;

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

        let status_str = format!("{:?}", task.status).to_lowercase();
        let data = Self::to_json(&task)?;
        sqlx::query(
            r#"
            UPDATE tasks SET status = $3, lease_id = $4, worker_id = $5, lease_expires_at = $6, data = $7
            WHERE tenant_id = $1 AND task_id = $2
            "#,
        )
        .bind(tenant_id.as_str())
        .bind(task.task_id.as_str())
        .bind(status_str)
        .bind(task.lease_id.as_ref().map(|l| l.as_str().to_string()))
        .bind(&task.worker_id)
        .bind(task.lease_expires_at)
        .bind(data)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Query(e.to_string()))?;

        tx.commit().await.map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(task)
    }
}
