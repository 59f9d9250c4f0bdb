//! Bounded-retry receipt emitter (§4.2).
//!
//! Grounded directly in the original coordinator's `receipt_emitter.py`
//! (`emit_receipt_with_retry` / `retry_worker`), re-architected per the
//! fabric's own design notes out of module-level globals (`_retry_queue`,
//! `_running`) into an owned [`EmissionClient`] value: the overflow queue
//! and the drain worker's cancellation handle are both constructed
//! explicitly and held by the caller, not hidden behind process statics.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fabric_types::{Receipt, ReceiptId};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EmissionError {
    #[error("receipt failed validation and was not enqueued: {0}")]
    ValidationFailed(String),
    #[error("emission exhausted retries; receipt queued for background drain")]
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct EmissionConfig {
    /// R — foreground retry attempts.
    pub max_attempts: u32,
    /// base backoff, doubled per attempt.
    pub backoff_base: Duration,
    /// Q — overflow queue capacity.
    pub queue_capacity: usize,
    /// T — drain worker cadence.
    pub drain_interval: Duration,
    /// B — items drained per wake.
    pub drain_batch: usize,
    /// R_max — drain retries before an item is discarded.
    pub max_drain_retries: u32,
    pub request_timeout: Duration,
}

impl Default for EmissionConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            queue_capacity: 1000,
            drain_interval: Duration::from_secs(60),
            drain_batch: 10,
            max_drain_retries: 10,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedReceipt {
    receipt: Receipt,
    queued_at: DateTime<Utc>,
    retry_count: u32,
}

/// Couples a receipt-producing component (the coordinator) to the ledger's
/// HTTP endpoint with bounded local retry and best-effort background
/// drain, so the coordinator can keep serving workers through a ledger
/// partition without silently dropping audit.
pub struct EmissionClient {
    http: reqwest::Client,
    ledger_base_url: String,
    config: EmissionConfig,
    overflow: Arc<Mutex<VecDeque<QueuedReceipt>>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl EmissionClient {
    pub fn new(ledger_base_url: impl Into<String>, config: EmissionConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        Self {
            http,
            ledger_base_url: ledger_base_url.into(),
            config,
            overflow: Arc::new(Mutex::new(VecDeque::new())),
            running: Arc::new(AtomicBool::new(true)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub async fn queue_len(&self) -> usize {
        self.overflow.lock().await.len()
    }

    /// Attempts delivery up to `max_attempts` times with exponential
    /// backoff. A `409` is treated as success (duplicate idempotence,
    /// property 3); a `400`/`422` fails fast without enqueueing; anything
    /// else (connect/timeout/5xx) is retried, and on exhaustion the receipt
    /// is pushed onto the overflow queue for the drain worker.
    pub async fn emit(&self, receipt: &Receipt) -> Result<ReceiptId, EmissionError> {
        let url = format!("{}/receipts", self.ledger_base_url);
        let mut backoff = self.config.backoff_base;

        for attempt in 1..=self.config.max_attempts {
            debug!(attempt, receipt_id = %receipt.receipt_id, "attempting receipt emission");
            match self.http.post(&url).json(receipt).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::CONFLICT => {
                    return Ok(receipt.receipt_id.clone());
                }
                Ok(resp) if resp.status().is_success() => {
                    return Ok(receipt.receipt_id.clone());
                }
                Ok(resp)
                    if resp.status() == reqwest::StatusCode::BAD_REQUEST
                        || resp.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY =>
                {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(EmissionError::ValidationFailed(body));
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), attempt, "ledger rejected receipt, retrying");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "failed to reach ledger, retrying");
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        self.enqueue(receipt.clone()).await;
        Err(EmissionError::Unavailable)
    }

    async fn enqueue(&self, receipt: Receipt) {
        let mut overflow = self.overflow.lock().await;
        if overflow.len() >= self.config.queue_capacity {
            overflow.pop_front();
        }
        overflow.push_back(QueuedReceipt {
            receipt,
            queued_at: Utc::now(),
            retry_count: 0,
        });
    }

    /// Spawns the cooperative drain worker. It wakes on `drain_interval`,
    /// processes up to `drain_batch` items, and tolerates cancellation at
    /// its sleep boundary without committing anything partial — the queue
    /// only loses an item once a delivery attempt actually succeeds or its
    /// retry budget is exhausted.
    pub fn spawn_drain_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move { client.drain_loop().await })
    }

    async fn drain_loop(&self) {
        let mut ticker = tokio::time::interval(self.config.drain_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.drain_once().await;
                }
                _ = self.shutdown.notified() => {
                    info!("emission drain worker shutting down");
                    return;
                }
            }
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
        }
    }

    async fn drain_once(&self) {
        let batch: Vec<QueuedReceipt> = {
            let mut overflow = self.overflow.lock().await;
            let n = overflow.len().min(self.config.drain_batch);
            overflow.drain(..n).collect()
        };
        if batch.is_empty() {
            return;
        }

        let mut drained = 0;
        let mut discarded = 0;
        let url = format!("{}/receipts", self.ledger_base_url);

        for mut item in batch {
            let delivered = match self.http.post(&url).json(&item.receipt).send().await {
                Ok(resp) => resp.status().is_success() || resp.status() == reqwest::StatusCode::CONFLICT,
                Err(_) => false,
            };

            if delivered {
                drained += 1;
                continue;
            }

            item.retry_count += 1;
            if item.retry_count < self.config.max_drain_retries {
                self.overflow.lock().await.push_back(item);
            } else {
                discarded += 1;
                warn!(
                    receipt_id = %item.receipt.receipt_id,
                    queued_at = %item.queued_at,
                    "discarding receipt after exhausting drain retries"
                );
            }
        }

        info!(drained, discarded, "emission drain cycle complete");
    }

    /// Signals the drain worker to stop at its next suspension point.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_types::{ArtifactDescriptor, EscalationClass, NaString, OutcomeKind, Phase, Status, TaskId, TenantId};

    fn sample_receipt() -> Receipt {
        Receipt {
            tenant_id: TenantId::new("t1"),
            receipt_id: ReceiptId::generate(),
            task_id: TaskId::generate(),
            phase: Phase::Accepted,
            recipient_ai: "worker.alice".to_string(),
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
    async fn unreachable_ledger_queues_the_receipt_for_drain() {
        let config = EmissionConfig {
            max_attempts: 1,
            backoff_base: Duration::from_millis(1),
            ..Default::default()
        };
        let client = EmissionClient::new("http://127.0.0.1:0", config);
        let receipt = sample_receipt();

        let result = client.emit(&receipt).await;
        assert!(matches!(result, Err(EmissionError::Unavailable)));
        assert_eq!(client.queue_len().await, 1);
    }

    #[tokio::test]
    async fn overflow_queue_drops_oldest_past_capacity() {
        let config = EmissionConfig {
            max_attempts: 1,
            backoff_base: Duration::from_millis(1),
            queue_capacity: 2,
            ..Default::default()
        };
        let client = EmissionClient::new("http://127.0.0.1:0", config);

        for _ in 0..3 {
            let _ = client.emit(&sample_receipt()).await;
        }
        assert_eq!(client.queue_len().await, 2);
    }
}
