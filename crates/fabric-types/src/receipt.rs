//! The Receipt — the atomic, immutable audit record (§3, I1–I4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{ReceiptId, TaskId, TenantId};
use crate::sentinel::NaString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Accepted,
    Complete,
    Escalate,
}

impl Phase {
    /// The lowercase wire representation, matching this type's own
    /// `#[serde(rename_all = "snake_case")]` encoding.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Phase::Accepted => "accepted",
            Phase::Complete => "complete",
            Phase::Escalate => "escalate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Na,
    Success,
    Failure,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Na,
    None,
    ResponseText,
    ArtifactPointer,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationClass {
    Na,
    Owner,
    Capability,
    Trust,
    Policy,
    Scope,
    Other,
}

/// Field-size ceilings enforced uniformly at the ledger's `Append` boundary.
pub const MAX_INPUTS_BYTES: usize = 64 * 1024;
pub const MAX_METADATA_BYTES: usize = 16 * 1024;
pub const MAX_TASK_BODY_BYTES: usize = 100 * 1024;
pub const MAX_OUTCOME_TEXT_BYTES: usize = 100 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    #[serde(default = "NaString::none")]
    pub location: NaString,
    #[serde(default = "NaString::none")]
    pub pointer: NaString,
    #[serde(default = "NaString::none")]
    pub checksum: NaString,
    #[serde(default)]
    pub size_bytes: i64,
    #[serde(default = "NaString::none")]
    pub mime: NaString,
}

impl Default for ArtifactDescriptor {
    fn default() -> Self {
        Self {
            location: NaString::none(),
            pointer: NaString::none(),
            checksum: NaString::none(),
            size_bytes: 0,
            mime: NaString::none(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub tenant_id: TenantId,
    pub receipt_id: ReceiptId,
    pub task_id: TaskId,
    pub phase: Phase,
    pub recipient_ai: String,
    pub from_principal: String,
    pub for_principal: String,
    pub source_system: String,

    pub task_type: String,
    pub task_summary: String,
    #[serde(default = "NaString::none")]
    pub task_body: NaString,
    #[serde(default)]
    pub inputs: serde_json::Value,
    #[serde(default = "NaString::none")]
    pub expected_outcome_kind: NaString,
    #[serde(default = "NaString::none")]
    pub expected_artifact_mime: NaString,

    #[serde(default = "default_status")]
    pub status: Status,
    #[serde(default = "default_outcome_kind")]
    pub outcome_kind: OutcomeKind,
    #[serde(default = "NaString::none")]
    pub outcome_text: NaString,
    #[serde(default)]
    pub artifact: ArtifactDescriptor,

    #[serde(default = "default_escalation_class")]
    pub escalation_class: EscalationClass,
    #[serde(default = "NaString::none")]
    pub escalation_reason: NaString,
    #[serde(default = "NaString::none")]
    pub escalation_to: NaString,

    #[serde(default)]
    pub caused_by_receipt_id: Option<ReceiptId>,
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,
    #[serde(default = "NaString::none")]
    pub dedupe_key: NaString,
    #[serde(default)]
    pub attempt: i32,
    #[serde(default)]
    pub retry_requested: bool,

    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stored_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub archived_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub metadata: serde_json::Value,

    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default = "default_trust_domain")]
    pub trust_domain: String,
    #[serde(default)]
    pub realtime: bool,
}

fn default_status() -> Status {
    Status::Na
}

fn default_outcome_kind() -> OutcomeKind {
    OutcomeKind::Na
}

fn default_escalation_class() -> EscalationClass {
    EscalationClass::Na
}

fn default_schema_version() -> String {
    "1.0".to_string()
}

fn default_trust_domain() -> String {
    "default".to_string()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReceiptValidationError {
    #[error("{field}: {message}")]
    Constraint { field: String, message: String },
    #[error("{field} exceeds the {limit} byte size ceiling")]
    TooLarge { field: String, limit: usize },
}

impl ReceiptValidationError {
    fn constraint(field: &str, message: impl Into<String>) -> Self {
        Self::Constraint {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Validates I2 (phase constraints + routing invariant), I3 (retry
/// accounting), and the §3 size ceilings. Does not check I1 (uniqueness) —
/// that is a storage-layer concern, not a structural one.
pub fn validate_receipt(receipt: &Receipt) -> Result<(), Vec<ReceiptValidationError>> {
    let mut errors = Vec::new();

    match receipt.phase {
        Phase::Accepted => validate_accepted(receipt, &mut errors),
        Phase::Complete => validate_complete(receipt, &mut errors),
        Phase::Escalate => validate_escalate(receipt, &mut errors),
    }

    if receipt.retry_requested && receipt.attempt < 1 {
        errors.push(ReceiptValidationError::constraint(
            "attempt",
            "retry_requested requires attempt >= 1",
        ));
    }

    validate_size_ceilings(receipt, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_accepted(receipt: &Receipt, errors: &mut Vec<ReceiptValidationError>) {
    if receipt.status != Status::Na {
        errors.push(ReceiptValidationError::constraint(
            "status",
            "accepted receipts must carry status=NA",
        ));
    }
    if receipt.completed_at.is_some() {
        errors.push(ReceiptValidationError::constraint(
            "completed_at",
            "accepted receipts must not set completed_at",
        ));
    }
    if receipt.task_summary == "TBD" {
        errors.push(ReceiptValidationError::constraint(
            "task_summary",
            "task_summary must not be the placeholder \"TBD\"",
        ));
    }
    if receipt.outcome_kind != OutcomeKind::Na {
        errors.push(ReceiptValidationError::constraint(
            "outcome_kind",
            "accepted receipts must not carry an outcome",
        ));
    }
    if !receipt.artifact.pointer.is_na()
        || !receipt.artifact.location.is_na()
        || !receipt.artifact.mime.is_na()
    {
        errors.push(ReceiptValidationError::constraint(
            "artifact",
            "accepted receipts must not carry artifact data",
        ));
    }
    if receipt.escalation_class != EscalationClass::Na {
        errors.push(ReceiptValidationError::constraint(
            "escalation_class",
            "accepted receipts must not carry an escalation block",
        ));
    }
    if !receipt.escalation_to.is_na() {
        errors.push(ReceiptValidationError::constraint(
            "escalation_to",
            "accepted receipts must not carry an escalation block",
        ));
    }
    if receipt.retry_requested {
        errors.push(ReceiptValidationError::constraint(
            "retry_requested",
            "accepted receipts cannot request a retry",
        ));
    }
}

fn validate_complete(receipt: &Receipt, errors: &mut Vec<ReceiptValidationError>) {
    if !matches!(
        receipt.status,
        Status::Success | Status::Failure | Status::Canceled
    ) {
        errors.push(ReceiptValidationError::constraint(
            "status",
            "complete receipts must carry status in {success, failure, canceled}",
        ));
    }
    if receipt.completed_at.is_none() {
        errors.push(ReceiptValidationError::constraint(
            "completed_at",
            "complete receipts must set completed_at",
        ));
    }
    if receipt.outcome_kind == OutcomeKind::Na {
        errors.push(ReceiptValidationError::constraint(
            "outcome_kind",
            "complete receipts must carry an outcome_kind",
        ));
    }
    if receipt.escalation_class != EscalationClass::Na {
        errors.push(ReceiptValidationError::constraint(
            "escalation_class",
            "complete receipts must not carry an escalation block",
        ));
    }
    if matches!(
        receipt.outcome_kind,
        OutcomeKind::ArtifactPointer | OutcomeKind::Mixed
    ) {
        if receipt.artifact.pointer.is_na() {
            errors.push(ReceiptValidationError::constraint(
                "artifact.pointer",
                "artifact_pointer/mixed outcomes require artifact.pointer",
            ));
        }
        if receipt.artifact.location.is_na() {
            errors.push(ReceiptValidationError::constraint(
                "artifact.location",
                "artifact_pointer/mixed outcomes require artifact.location",
            ));
        }
        if receipt.artifact.mime.is_na() {
            errors.push(ReceiptValidationError::constraint(
                "artifact.mime",
                "artifact_pointer/mixed outcomes require artifact.mime",
            ));
        }
    }
}

fn validate_escalate(receipt: &Receipt, errors: &mut Vec<ReceiptValidationError>) {
    if receipt.status != Status::Na {
        errors.push(ReceiptValidationError::constraint(
            "status",
            "escalate receipts must carry status=NA",
        ));
    }
    if receipt.escalation_class == EscalationClass::Na {
        errors.push(ReceiptValidationError::constraint(
            "escalation_class",
            "escalate receipts must carry a non-NA escalation_class",
        ));
    }
    match receipt.escalation_reason.as_deref() {
        None | Some("TBD") => {
            errors.push(ReceiptValidationError::constraint(
                "escalation_reason",
                "escalate receipts must carry a concrete escalation_reason",
            ));
        }
        _ => {}
    }
    if receipt.escalation_to.is_na() {
        errors.push(ReceiptValidationError::constraint(
            "escalation_to",
            "escalate receipts must carry escalation_to",
        ));
    } else if !receipt.escalation_to.eq_str(&receipt.recipient_ai) {
        errors.push(ReceiptValidationError::constraint(
            "recipient_ai",
            "routing invariant violated: recipient_ai must equal escalation_to",
        ));
    }
}

fn validate_size_ceilings(receipt: &Receipt, errors: &mut Vec<ReceiptValidationError>) {
    let inputs_len = serde_json::to_vec(&receipt.inputs).map(|v| v.len()).unwrap_or(0);
    if inputs_len > MAX_INPUTS_BYTES {
        errors.push(ReceiptValidationError::TooLarge {
            field: "inputs".to_string(),
            limit: MAX_INPUTS_BYTES,
        });
    }
    let metadata_len = serde_json::to_vec(&receipt.metadata).map(|v| v.len()).unwrap_or(0);
    if metadata_len > MAX_METADATA_BYTES {
        errors.push(ReceiptValidationError::TooLarge {
            field: "metadata".to_string(),
            limit: MAX_METADATA_BYTES,
        });
    }
    if let Some(body) = receipt.task_body.as_deref() {
        if body.len() > MAX_TASK_BODY_BYTES {
            errors.push(ReceiptValidationError::TooLarge {
                field: "task_body".to_string(),
                limit: MAX_TASK_BODY_BYTES,
            });
        }
    }
    if let Some(text) = receipt.outcome_text.as_deref() {
        if text.len() > MAX_OUTCOME_TEXT_BYTES {
            errors.push(ReceiptValidationError::TooLarge {
                field: "outcome_text".to_string(),
                limit: MAX_OUTCOME_TEXT_BYTES,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_accepted() -> Receipt {
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

    #[test]
    fn accepted_receipt_is_valid() {
        assert!(validate_receipt(&base_accepted()).is_ok());
    }

    #[test]
    fn accepted_with_placeholder_summary_is_rejected() {
        let mut r = base_accepted();
        r.task_summary = "TBD".to_string();
        assert!(validate_receipt(&r).is_err());
    }

    #[test]
    fn complete_requires_completed_at_and_outcome_kind() {
        let mut r = base_accepted();
        r.phase = Phase::Complete;
        r.status = Status::Success;
        let err = validate_receipt(&r).unwrap_err();
        assert!(err.iter().any(|e| matches!(e, ReceiptValidationError::Constraint { field, .. } if field == "completed_at")));
    }

    #[test]
    fn complete_artifact_outcome_requires_artifact_fields() {
        let mut r = base_accepted();
        r.phase = Phase::Complete;
        r.status = Status::Success;
        r.completed_at = Some(Utc::now());
        r.outcome_kind = OutcomeKind::ArtifactPointer;
        let err = validate_receipt(&r).unwrap_err();
        assert_eq!(err.len(), 3);
    }

    #[test]
    fn escalate_enforces_routing_invariant() {
        let mut r = base_accepted();
        r.phase = Phase::Escalate;
        r.escalation_class = EscalationClass::Policy;
        r.escalation_reason = NaString::some("lease expired, max retries exceeded");
        r.escalation_to = NaString::some("delegate");
        r.recipient_ai = "worker.alice".to_string();
        let err = validate_receipt(&r).unwrap_err();
        assert!(err
            .iter()
            .any(|e| matches!(e, ReceiptValidationError::Constraint { field, .. } if field == "recipient_ai")));

        r.recipient_ai = "delegate".to_string();
        assert!(validate_receipt(&r).is_ok());
    }

    #[test]
    fn retry_requested_requires_attempt_at_least_one() {
        let mut r = base_accepted();
        r.retry_requested = true;
        r.attempt = 0;
        assert!(validate_receipt(&r).is_err());
    }

    #[test]
    fn oversized_metadata_is_rejected() {
        let mut r = base_accepted();
        r.metadata = serde_json::json!({ "blob": "x".repeat(MAX_METADATA_BYTES + 1) });
        let err = validate_receipt(&r).unwrap_err();
        assert!(err
            .iter()
            .any(|e| matches!(e, ReceiptValidationError::TooLarge { field, .. } if field == "metadata")));
    }
}
