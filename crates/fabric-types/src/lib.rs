//! Domain model for the agent work coordination fabric: receipts, tasks,
//! plans, and worker registrations, plus the id newtypes and wire envelopes
//! shared between the ledger and coordinator services.

pub mod ids;
pub mod plan;
pub mod receipt;
pub mod sentinel;
pub mod task;
pub mod wire;
pub mod worker;

pub use ids::{LeaseId, PlanId, ReceiptId, StepId, TaskId, TenantId};
pub use plan::{
    topological_execution_order, Plan, PlanRequest, PlanStatus, PlanStep, StepType, WorkerCapability,
};
pub use receipt::{
    validate_receipt, ArtifactDescriptor, EscalationClass, OutcomeKind, Phase, Receipt,
    ReceiptValidationError, Status,
};
pub use sentinel::NaString;
pub use task::{Task, TaskSpec, TaskStatus};
pub use worker::{Liveness, WorkerRegistration};
