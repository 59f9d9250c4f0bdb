//! Expiry Reaper (§4.5) — a cooperative background worker that reclaims
//! leases past their `lease_expires_at` on a fixed cadence, applying the
//! same retry-vs-escalate policy as a worker-reported `Fail(retryable=true)`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use fabric_emission::EmissionClient;
use fabric_storage::TaskStorage;
use fabric_types::{EscalationClass, NaString, Phase, TaskStatus};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::CoordinatorConfig;
use crate::service::Coordinator;

pub struct ExpiryReaper<S: TaskStorage> {
    coordinator: Arc<Coordinator<S>>,
    storage: Arc<S>,
    emission: Arc<EmissionClient>,
    config: CoordinatorConfig,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl<S: TaskStorage + 'static> ExpiryReaper<S> {
    pub fn new(
        coordinator: Arc<Coordinator<S>>,
        storage: Arc<S>,
        emission: Arc<EmissionClient>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            coordinator,
            storage,
            emission,
            config,
            running: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.reaper_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// One reaper pass: find every lease expired as of now, across all
    /// tenants, and reclaim each. Reclaiming is per-row so a failure on one
    /// task never blocks the rest (§4.5 edge case: reaper and worker race
    /// on the same lease — `reclaim_expired` rejects rows no longer
    /// `leased`, so a worker that completes first wins and the reaper's
    /// attempt on that task simply logs and moves on). Returns the number
    /// of leases reclaimed, for callers that want an off-cycle admin pass.
    pub async fn sweep(&self) -> u64 {
        let now = Utc::now();
        let expired = match self.storage.find_expired_leases(now).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!(error = %err, "expiry reaper failed to list expired leases");
                return 0;
            }
        };

        if expired.is_empty() {
            return 0;
        }

        let mut reclaimed = 0u64;
        let mut escalated = 0u64;

        for task in expired {
            let tenant_id = task.tenant_id.clone();
            let task_id = task.task_id.clone();
            match self.storage.reclaim_expired(&tenant_id, &task_id, now).await {
                Ok(updated) => {
                    reclaimed += 1;
                    if updated.status == TaskStatus::Expired {
                        escalated += 1;
                        let receipt = self.expiry_receipt(&updated);
                        let _ = self.emission.emit(&receipt).await;
                    }
                }
                Err(err) => {
                    warn!(task_id = %task_id, error = %err, "failed to reclaim expired lease");
                }
            }
        }

        info!(reclaimed, escalated, "expiry reaper pass complete");
        reclaimed
    }

    fn expiry_receipt(&self, task: &fabric_types::Task) -> fabric_types::Receipt {
        let mut receipt = self.coordinator.accepted_receipt(task);
        receipt.phase = Phase::Escalate;
        receipt.recipient_ai = self.config.default_escalation_recipient.clone();
        receipt.escalation_class = EscalationClass::Policy;
        receipt.escalation_reason = NaString::some("lease expired, max retries exceeded");
        receipt.escalation_to = NaString::some(self.config.default_escalation_recipient.clone());
        receipt.completed_at = task.completed_at;
        receipt.attempt = task.attempt;
        receipt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fabric_emission::EmissionConfig;
    use fabric_storage::InMemoryStorage;
    use fabric_types::{TaskSpec, TenantId};

    fn reaper(coordinator: Arc<Coordinator<InMemoryStorage>>, storage: Arc<InMemoryStorage>) -> ExpiryReaper<InMemoryStorage> {
        let emission = Arc::new(EmissionClient::new("http://127.0.0.1:0", EmissionConfig::default()));
        ExpiryReaper::new(coordinator, storage, emission, CoordinatorConfig::default())
    }

    fn spec(max_attempts: i32) -> TaskSpec {
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
            max_attempts,
            task_body: serde_json::json!({"cmd": "noop"}),
            inputs: serde_json::json!({}),
            metadata: serde_json::json!({}),
        }
    }

    /// Leases the sole queued task for `tenant`, then backdates its lease
    /// so the next `sweep()` finds it expired.
    async fn lease_and_expire(storage: &InMemoryStorage, coordinator: &Coordinator<InMemoryStorage>, tenant: &TenantId) {
        let leased = coordinator.lease(tenant, "worker-1", &[], 1).await.unwrap();
        let mut task = leased.into_iter().next().unwrap();
        task.lease_expires_at = Some(Utc::now() - Duration::seconds(1));
        storage.insert(&task).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_requeues_task_with_retries_remaining() {
        let storage = Arc::new(InMemoryStorage::new());
        let emission = Arc::new(EmissionClient::new("http://127.0.0.1:0", EmissionConfig::default()));
        let coordinator = Arc::new(Coordinator::new(storage.clone(), emission.clone(), CoordinatorConfig::default()));
        let tenant = TenantId::new("t1");
        let _ = coordinator.create(&tenant, spec(3)).await;
        let task_id = coordinator.list(&tenant, None, 10).await.unwrap().remove(0).task_id;

        lease_and_expire(&storage, &coordinator, &tenant).await;

        let reaper = reaper(coordinator.clone(), storage.clone());
        let reclaimed = reaper.sweep().await;
        assert_eq!(reclaimed, 1);

        let updated = coordinator.get(&tenant, &task_id).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Queued);
        assert_eq!(updated.attempt, 1);
        assert!(updated.lease_id.is_none());
    }

    #[tokio::test]
    async fn sweep_escalates_task_with_no_retries_left() {
        let storage = Arc::new(InMemoryStorage::new());
        let emission = Arc::new(EmissionClient::new("http://127.0.0.1:0", EmissionConfig::default()));
        let coordinator = Arc::new(Coordinator::new(storage.clone(), emission.clone(), CoordinatorConfig::default()));
        let tenant = TenantId::new("t1");
        let _ = coordinator.create(&tenant, spec(1)).await;
        let task_id = coordinator.list(&tenant, None, 10).await.unwrap().remove(0).task_id;

        lease_and_expire(&storage, &coordinator, &tenant).await;

        let reaper = reaper(coordinator.clone(), storage.clone());
        let reclaimed = reaper.sweep().await;
        assert_eq!(reclaimed, 1);

        let updated = coordinator.get(&tenant, &task_id).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Expired);

        let receipt = reaper.expiry_receipt(&updated);
        assert_eq!(receipt.phase, Phase::Escalate);
        assert_eq!(receipt.escalation_class, EscalationClass::Policy);
        assert_eq!(receipt.recipient_ai, receipt.escalation_to.as_deref().unwrap());
    }
}
