//! Task Store & Lease Coordinator operations (§4.3/§4.4).

use std::sync::Arc;

use chrono::Utc;
use fabric_emission::EmissionClient;
use fabric_storage::TaskStorage;
use fabric_types::{
    ArtifactDescriptor, EscalationClass, NaString, OutcomeKind, Phase, Receipt, Status, Task, TaskId, TaskSpec,
    TaskStatus, TenantId,
};
use tracing::{info, warn};

use crate::api_types::{CompleteRequest, CompleteResponse, FailRequest, FailResponse};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, CoordinatorResult};

pub struct Coordinator<S: TaskStorage> {
    storage: Arc<S>,
    emission: Arc<EmissionClient>,
    config: CoordinatorConfig,
}

impl<S: TaskStorage> Coordinator<S> {
    pub fn new(storage: Arc<S>, emission: Arc<EmissionClient>, config: CoordinatorConfig) -> Self {
        Self { storage, emission, config }
    }

    /// Create(task_spec) — inserts a queued task and emits an `accepted`
    /// receipt. If emission fails the caller sees `service_unavailable`;
    /// the task row persists so the drain worker can later reconcile.
    pub async fn create(&self, tenant_id: &TenantId, spec: TaskSpec) -> CoordinatorResult<(Task, Option<fabric_types::ReceiptId>)> {
        let now = Utc::now();
        let task = Task {
            task_id: TaskId::generate(),
            tenant_id: tenant_id.clone(),
            task_type: spec.task_type.clone(),
            recipient_ai: spec.recipient_ai.clone(),
            from_principal: spec.from_principal.clone(),
            for_principal: spec.for_principal.clone(),
            expected_outcome_kind: spec.expected_outcome_kind.clone(),
            expected_artifact_mime: spec.expected_artifact_mime.clone(),
            parent_task_id: spec.parent_task_id.clone(),
            caused_by_receipt_id: spec.caused_by_receipt_id.clone(),
            priority: spec.priority,
            status: TaskStatus::Queued,
            attempt: 0,
            max_attempts: spec.max_attempts,
            lease_id: None,
            worker_id: None,
            lease_expires_at: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            task_body: spec.task_body.clone(),
            inputs: spec.inputs.clone(),
            metadata: spec.metadata.clone(),
        };

        self.storage.insert(&task).await?;

        let receipt = self.accepted_receipt(&task);
        match self.emission.emit(&receipt).await {
            Ok(receipt_id) => Ok((task, Some(receipt_id))),
            Err(_) => {
                let task_id = task.task_id.clone();
                warn!(task_id = %task_id, "accepted receipt emission exhausted retries");
                Err(CoordinatorError::ServiceUnavailable(task_id))
            }
        }
    }

    pub async fn get(&self, tenant_id: &TenantId, task_id: &TaskId) -> CoordinatorResult<Task> {
        self.storage
            .get(tenant_id, task_id)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(task_id.to_string()))
    }

    pub async fn list(&self, tenant_id: &TenantId, status: Option<TaskStatus>, limit: i64) -> CoordinatorResult<Vec<Task>> {
        Ok(self.storage.list(tenant_id, status, limit.clamp(1, 200)).await?)
    }

    /// Lease(worker_id, preferred_kinds?, max_tasks) — at-most-one
    /// concurrent holder per task is guaranteed by the storage layer's
    /// skip-locked selection (property 4); an empty result is the
    /// distinct no-work outcome, not an error.
    pub async fn lease(
        &self,
        tenant_id: &TenantId,
        worker_id: &str,
        preferred_kinds: &[String],
        max_tasks: i64,
    ) -> CoordinatorResult<Vec<Task>> {
        let mut leased = self
            .storage
            .lease_next(tenant_id, worker_id, preferred_kinds, max_tasks, self.config.lease_duration_secs)
            .await?;

        if leased.is_empty() && !preferred_kinds.is_empty() {
            leased = self
                .storage
                .lease_next(tenant_id, worker_id, &[], max_tasks, self.config.lease_duration_secs)
                .await?;
        }

        Ok(leased)
    }

    pub async fn heartbeat(&self, tenant_id: &TenantId, lease_id: &str, worker_id: &str) -> CoordinatorResult<Task> {
        self.storage
            .heartbeat(tenant_id, lease_id, worker_id, self.config.lease_duration_secs)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(lease_id.to_string()))
    }

    pub async fn complete(
        &self,
        tenant_id: &TenantId,
        lease_id: &str,
        request: CompleteRequest,
    ) -> CoordinatorResult<CompleteResponse> {
        let completed_at = Utc::now();
        let task = self
            .storage
            .complete(tenant_id, lease_id, &request.worker_id, completed_at)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(lease_id.to_string()))?;

        let receipt = self.complete_receipt(&task, &request, completed_at);
        let receipt_id = self.emission.emit(&receipt).await.ok();

        Ok(CompleteResponse {
            task_id: task.task_id,
            lease_id: lease_id.to_string(),
            status: request.status,
            receipt_id,
            completed_at,
        })
    }

    /// Fail(lease_id, worker_id, error_message, retryable) — requeues the
    /// task when attempts remain, otherwise marks it `failed` and emits an
    /// `escalate` receipt transferring ownership to the fabric's fallback
    /// recipient (the routing invariant holds because `recipient_ai` is
    /// set to that same recipient here, deliberately overriding the
    /// task's own `recipient_ai`).
    pub async fn fail(&self, tenant_id: &TenantId, lease_id: &str, request: FailRequest) -> CoordinatorResult<FailResponse> {
        let now = Utc::now();
        let task = self
            .storage
            .fail(tenant_id, lease_id, &request.worker_id, request.retryable, now)
            .await?
            .ok_or_else(|| CoordinatorError::NotFound(lease_id.to_string()))?;

        match task.status {
            TaskStatus::Queued => Ok(FailResponse {
                status: "retry_scheduled".to_string(),
                retry_scheduled: true,
                next_attempt: Some(task.attempt),
            }),
            TaskStatus::Failed => {
                let receipt = self.escalation_receipt(
                    &task,
                    &format!("task exhausted retries: {}", request.error_message),
                );
                let _ = self.emission.emit(&receipt).await;
                Ok(FailResponse {
                    status: "failed".to_string(),
                    retry_scheduled: false,
                    next_attempt: None,
                })
            }
            other => Err(CoordinatorError::ValidationFailed(format!(
                "unexpected post-fail task status {other:?}"
            ))),
        }
    }

    pub(crate) fn accepted_receipt(&self, task: &Task) -> Receipt {
        Receipt {
            tenant_id: task.tenant_id.clone(),
            receipt_id: fabric_types::ReceiptId::generate(),
            task_id: task.task_id.clone(),
            phase: Phase::Accepted,
            recipient_ai: task.recipient_ai.clone(),
            from_principal: task.from_principal.clone(),
            for_principal: task.for_principal.clone(),
            source_system: "coordinator".to_string(),
            task_type: task.task_type.clone(),
            task_summary: task.task_type.clone(),
            task_body: NaString::some(task.task_body.to_string()),
            inputs: task.inputs.clone(),
            expected_outcome_kind: task.expected_outcome_kind.clone().map(NaString::some).unwrap_or_else(NaString::none),
            expected_artifact_mime: task.expected_artifact_mime.clone().map(NaString::some).unwrap_or_else(NaString::none),
            status: Status::Na,
            outcome_kind: OutcomeKind::Na,
            outcome_text: NaString::none(),
            artifact: ArtifactDescriptor::default(),
            escalation_class: EscalationClass::Na,
            escalation_reason: NaString::none(),
            escalation_to: NaString::none(),
            caused_by_receipt_id: task.caused_by_receipt_id.clone(),
            parent_task_id: task.parent_task_id.clone(),
            dedupe_key: NaString::none(),
            attempt: task.attempt,
            retry_requested: false,
            created_at: task.created_at,
            stored_at: None,
            started_at: None,
            completed_at: None,
            read_at: None,
            archived_at: None,
            metadata: task.metadata.clone(),
            schema_version: "1.0".to_string(),
            trust_domain: "default".to_string(),
            realtime: false,
        }
    }

    fn complete_receipt(&self, task: &Task, request: &CompleteRequest, completed_at: chrono::DateTime<Utc>) -> Receipt {
        let mut receipt = self.accepted_receipt(task);
        receipt.receipt_id = fabric_types::ReceiptId::generate();
        receipt.phase = Phase::Complete;
        receipt.status = request.status;
        receipt.outcome_kind = request.outcome_kind;
        receipt.outcome_text = request.outcome_text.clone();
        receipt.artifact = request.artifact.clone();
        receipt.completed_at = Some(completed_at);
        receipt.attempt = task.attempt;
        receipt
    }

    fn escalation_receipt(&self, task: &Task, reason: &str) -> Receipt {
        let mut receipt = self.accepted_receipt(task);
        receipt.receipt_id = fabric_types::ReceiptId::generate();
        receipt.phase = Phase::Escalate;
        receipt.recipient_ai = self.config.default_escalation_recipient.clone();
        receipt.escalation_class = EscalationClass::Policy;
        receipt.escalation_reason = NaString::some(reason);
        receipt.escalation_to = NaString::some(self.config.default_escalation_recipient.clone());
        receipt.completed_at = task.completed_at;
        receipt.attempt = task.attempt;
        info!(task_id = %task.task_id, "task escalated to fallback recipient");
        receipt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_emission::EmissionConfig;
    use fabric_storage::InMemoryStorage;
    use fabric_types::TaskSpec;

    fn coordinator() -> Coordinator<InMemoryStorage> {
        let storage = Arc::new(InMemoryStorage::new());
        let emission = Arc::new(EmissionClient::new("http://127.0.0.1:0", EmissionConfig::default()));
        Coordinator::new(storage, emission, CoordinatorConfig::default())
    }

    fn spec() -> TaskSpec {
        TaskSpec {
            task_type: "demo".to_string(),
            recipient_ai: "worker.alice".to_string(),
            from_principal: "user.bob".to_string(),
            for_principal: "user.bob".to_string(),
            expected_outcome_kind: None,
            expected_artifact_mime: None,
            parent_task_id: None,
            caused_by_receipt_id: None,
            priority: 0,
            max_attempts: 3,
            task_body: serde_json::json!({"cmd": "noop"}),
            inputs: serde_json::json!({}),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn create_without_reachable_ledger_reports_service_unavailable() {
        let coordinator = coordinator();
        let tenant = TenantId::new("t1");
        let err = coordinator.create(&tenant, spec()).await.unwrap_err();
        assert!(matches!(err, CoordinatorError::ServiceUnavailable(_)));

        let listed = coordinator.list(&tenant, None, 10).await.unwrap();
        assert_eq!(listed.len(), 1, "task row persists despite emission failure");
    }

    #[tokio::test]
    async fn lease_then_complete_transitions_task_to_completed() {
        let coordinator = coordinator();
        let tenant = TenantId::new("t1");
        let _ = coordinator.create(&tenant, spec()).await;

        let leased = coordinator.lease(&tenant, "worker-1", &[], 1).await.unwrap();
        assert_eq!(leased.len(), 1);
        let lease_id = leased[0].lease_id.clone().unwrap().to_string();

        let response = coordinator
            .complete(
                &tenant,
                &lease_id,
                CompleteRequest {
                    worker_id: "worker-1".to_string(),
                    status: Status::Success,
                    outcome_kind: OutcomeKind::None,
                    outcome_text: NaString::none(),
                    artifact: ArtifactDescriptor::default(),
                },
            )
            .await
            .unwrap();

        let task = coordinator.get(&tenant, &response.task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn fail_without_retry_budget_marks_task_failed() {
        let coordinator = coordinator();
        let tenant = TenantId::new("t1");
        let mut one_shot = spec();
        one_shot.max_attempts = 1;
        let _ = coordinator.create(&tenant, one_shot).await;

        let leased = coordinator.lease(&tenant, "worker-1", &[], 1).await.unwrap();
        let lease_id = leased[0].lease_id.clone().unwrap().to_string();

        let response = coordinator
            .fail(
                &tenant,
                &lease_id,
                FailRequest {
                    worker_id: "worker-1".to_string(),
                    error_message: "boom".to_string(),
                    retryable: true,
                },
            )
            .await
            .unwrap();

        assert_eq!(response.status, "failed");
        assert!(!response.retry_scheduled);
    }
}
