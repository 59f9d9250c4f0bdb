//! Receipt Ledger operations (§4.1).

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use fabric_storage::{AppendOutcome, ReceiptStorage, SearchQuery};
use fabric_types::{validate_receipt, Receipt, ReceiptId, TaskId, TenantId};
use fabric_types::wire::{BootstrapConfig, BootstrapResponse, SearchFilters};
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};

/// Maximum chain traversal depth — the chain can only grow by one receipt
/// per later successor, so a runaway traversal indicates a storage bug,
/// not a legitimate chain; this bound keeps `Chain` defensive regardless.
const MAX_CHAIN_DEPTH: usize = 10_000;

pub struct Ledger<S: ReceiptStorage> {
    storage: Arc<S>,
}

impl<S: ReceiptStorage> Ledger<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Validates phase invariants, the routing invariant, and size
    /// ceilings, then attempts insertion. A duplicate `(tenant_id,
    /// receipt_id)` is surfaced distinctly so emission clients can treat it
    /// as success (property 3).
    pub async fn append(&self, mut receipt: Receipt) -> LedgerResult<(ReceiptId, chrono::DateTime<Utc>)> {
        validate_receipt(&receipt).map_err(LedgerError::ValidationFailed)?;

        receipt.stored_at = Some(Utc::now());
        let stored_at = receipt.stored_at.unwrap();
        let receipt_id = receipt.receipt_id.clone();

        match self.storage.append(&receipt).await? {
            AppendOutcome::Inserted => {
                info!(receipt_id = %receipt_id, phase = ?receipt.phase, "receipt stored");
                Ok((receipt_id, stored_at))
            }
            AppendOutcome::Duplicate => {
                warn!(receipt_id = %receipt_id, "duplicate receipt re-posted");
                Err(LedgerError::DuplicateReceiptId(receipt_id))
            }
        }
    }

    pub async fn get(&self, tenant_id: &TenantId, receipt_id: &ReceiptId) -> LedgerResult<Receipt> {
        self.storage
            .get(tenant_id, receipt_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(receipt_id.to_string()))
    }

    pub async fn inbox(&self, tenant_id: &TenantId, recipient_ai: &str, limit: i64) -> LedgerResult<Vec<Receipt>> {
        Ok(self.storage.inbox(tenant_id, recipient_ai, limit.clamp(1, 100)).await?)
    }

    pub async fn timeline(&self, tenant_id: &TenantId, task_id: &TaskId, ascending: bool) -> LedgerResult<Vec<Receipt>> {
        Ok(self.storage.timeline(tenant_id, task_id, ascending).await?)
    }

    /// Transitive closure over `caused_by_receipt_id` forward edges from
    /// `root`, in `stored_at` order (property 10). Bounded depth and a
    /// visited set guard against any storage anomaly producing a cycle,
    /// even though receipt immutability makes one impossible in practice.
    pub async fn chain(&self, tenant_id: &TenantId, root: &ReceiptId) -> LedgerResult<Vec<Receipt>> {
        let root_receipt = self.get(tenant_id, root).await?;

        let mut chain = vec![root_receipt];
        let mut visited: HashSet<ReceiptId> = HashSet::new();
        visited.insert(root.clone());
        let mut frontier = vec![root.clone()];
        let mut depth = 0;

        while !frontier.is_empty() && depth < MAX_CHAIN_DEPTH {
            let mut next_frontier = Vec::new();
            for parent in &frontier {
                for child in self.storage.children_of(tenant_id, parent).await? {
                    if visited.insert(child.receipt_id.clone()) {
                        next_frontier.push(child.receipt_id.clone());
                        chain.push(child);
                    }
                }
            }
            frontier = next_frontier;
            depth += 1;
        }

        chain.sort_by(|a, b| a.stored_at.cmp(&b.stored_at));
        Ok(chain)
    }

    pub async fn archive(&self, tenant_id: &TenantId, receipt_id: &ReceiptId) -> LedgerResult<()> {
        if self.storage.archive(tenant_id, receipt_id).await? {
            Ok(())
        } else {
            Err(LedgerError::NotFound(receipt_id.to_string()))
        }
    }

    pub async fn bootstrap(&self, tenant_id: &TenantId, agent_name: &str) -> LedgerResult<BootstrapResponse> {
        let inbox = self.storage.inbox(tenant_id, agent_name, 50).await?;
        let recent = self.storage.recent_for(tenant_id, agent_name, 10).await?;
        Ok(BootstrapResponse {
            inbox,
            recent,
            config: BootstrapConfig::default(),
        })
    }

    pub async fn search(&self, tenant_id: &TenantId, filters: &SearchFilters) -> LedgerResult<Vec<Receipt>> {
        let query = SearchQuery {
            text: filters.text.clone(),
            recipient_ai: filters.recipient_ai.clone(),
            task_type: filters.task_type.clone(),
            phase: filters.phase.clone(),
            limit: filters.limit,
        };
        Ok(self.storage.search(tenant_id, &query).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_storage::InMemoryStorage;
    use fabric_types::{ArtifactDescriptor, EscalationClass, NaString, OutcomeKind, Phase, Status};

    fn accepted(tenant: &str, task: TaskId, recipient: &str) -> Receipt {
        Receipt {
            tenant_id: TenantId::new(tenant),
            receipt_id: ReceiptId::generate(),
            task_id: task,
            phase: Phase::Accepted,
            recipient_ai: recipient.to_string(),
            from_principal: "user.bob".to_string(),
            for_principal: "user.bob".to_string(),
            source_system: "coordinator".to_string(),
            task_type: "demo".to_string(),
            task_summary: "do the thing".to_string(),
            task_body: NaString::none(),
            inputs: serde_json::json!({}),
            expected_outcome_kind: NaString::none(),
            expected_artifact_mime: NaString::none(),
            status: Status::Na,
            outcome_kind: OutcomeKind::Na,
            outcome_text: NaString::none(),
            artifact: ArtifactDescriptor::default(),
            escalation_class: EscalationClass::Na,
            escalation_reason: NaString::none(),
            escalation_to: NaString::none(),
            caused_by_receipt_id: None,
            parent_task_id: None,
            dedupe_key: NaString::none(),
            attempt: 0,
            retry_requested: false,
            created_at: Utc::now(),
            stored_at: None,
            started_at: None,
            completed_at: None,
            read_at: None,
            archived_at: None,
            metadata: serde_json::json!({}),
            schema_version: "1.0".to_string(),
            trust_domain: "default".to_string(),
            realtime: false,
        }
    }

    #[tokio::test]
    async fn duplicate_append_is_rejected_with_one_stored_row() {
        let storage = Arc::new(InMemoryStorage::new());
        let ledger = Ledger::new(storage.clone());
        let tenant = TenantId::new("t1");
        let task = TaskId::generate();
        let mut receipt = accepted("t1", task.clone(), "worker.alice");
        let fixed_id = receipt.receipt_id.clone();

        ledger.append(receipt.clone()).await.unwrap();
        receipt.receipt_id = fixed_id;
        let err = ledger.append(receipt).await.unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateReceiptId(_)));

        let timeline = ledger.timeline(&tenant, &task, true).await.unwrap();
        assert_eq!(timeline.len(), 1);
    }

    #[tokio::test]
    async fn archive_hides_from_inbox_but_not_timeline() {
        let storage = Arc::new(InMemoryStorage::new());
        let ledger = Ledger::new(storage.clone());
        let tenant = TenantId::new("t1");
        let task = TaskId::generate();
        let receipt = accepted("t1", task.clone(), "worker.alice");
        let receipt_id = receipt.receipt_id.clone();

        ledger.append(receipt).await.unwrap();
        assert_eq!(ledger.inbox(&tenant, "worker.alice", 10).await.unwrap().len(), 1);

        ledger.archive(&tenant, &receipt_id).await.unwrap();
        assert_eq!(ledger.inbox(&tenant, "worker.alice", 10).await.unwrap().len(), 0);
        assert_eq!(ledger.timeline(&tenant, &task, true).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn chain_follows_causal_links_in_stored_order() {
        let storage = Arc::new(InMemoryStorage::new());
        let ledger = Ledger::new(storage.clone());
        let tenant = TenantId::new("t1");
        let task = TaskId::generate();

        let r1 = accepted("t1", task.clone(), "worker.alice");
        let r1_id = r1.receipt_id.clone();
        ledger.append(r1).await.unwrap();

        let mut r2 = accepted("t1", task.clone(), "delegate");
        r2.phase = Phase::Escalate;
        r2.status = Status::Na;
        r2.escalation_class = EscalationClass::Policy;
        r2.escalation_reason = NaString::some("lease expired, max retries exceeded");
        r2.escalation_to = NaString::some("delegate");
        r2.caused_by_receipt_id = Some(r1_id.clone());
        let r2_id = r2.receipt_id.clone();
        ledger.append(r2).await.unwrap();

        let mut r3 = accepted("t1", task.clone(), "worker.alice");
        r3.phase = Phase::Complete;
        r3.status = Status::Success;
        r3.outcome_kind = OutcomeKind::None;
        r3.completed_at = Some(Utc::now());
        r3.caused_by_receipt_id = Some(r2_id);
        ledger.append(r3).await.unwrap();

        let chain = ledger.chain(&tenant, &r1_id).await.unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].receipt_id, r1_id);
    }
}
