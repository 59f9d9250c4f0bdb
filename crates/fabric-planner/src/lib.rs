//! Planner Adapter core (§4.7): submits a plan's `queue_execution` steps
//! to the coordinator in dependency order. Non-`queue_execution` steps
//! (`call_worker`, `wait_for`, `aggregate`, `escalate`) are the owning
//! principal's responsibility and are not actuated here.

use fabric_types::{Plan, PlanStatus, PlanStep, TaskSpec};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("submission request failed: {0}")]
    Request(#[from] reqwest::Error),
}

pub type PlannerResult<T> = Result<T, PlannerError>;

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteOutcome {
    pub plan_id: String,
    pub submitted: usize,
    pub skipped: usize,
    pub dry_run: bool,
}

/// Submits one `queue_execution` step as a task creation request.
#[derive(Debug, Clone, Serialize)]
struct StepSubmission<'a> {
    task_type: &'a str,
    recipient_ai: &'a str,
    from_principal: &'a str,
    for_principal: &'a str,
    task_body: &'a serde_json::Value,
}

pub struct PlannerAdapter {
    http: reqwest::Client,
    coordinator_base_url: String,
}

impl PlannerAdapter {
    pub fn new(coordinator_base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            coordinator_base_url: coordinator_base_url.into(),
        }
    }

    /// Execute(plan, dry_run) — enumerates `queue_execution` steps in
    /// dependency order and submits each to the coordinator's `Create`
    /// endpoint. `dry_run=true` counts without submitting. A submission
    /// failure is logged and the remaining steps still run rather than
    /// halting the rest of the plan.
    pub async fn execute(&self, plan: &Plan, dry_run: bool) -> PlannerResult<ExecuteOutcome> {
        let ordered = fabric_types::topological_execution_order(&plan.steps);
        let total = ordered.len();

        if dry_run {
            info!(plan_id = %plan.plan_id, steps = total, "dry run, no tasks submitted");
            return Ok(ExecuteOutcome {
                plan_id: plan.plan_id.to_string(),
                submitted: 0,
                skipped: total,
                dry_run: true,
            });
        }

        let mut submitted = 0usize;
        let mut skipped = 0usize;

        for step in ordered {
            match self.submit_step(plan, step).await {
                Ok(()) => submitted += 1,
                Err(err) => {
                    warn!(plan_id = %plan.plan_id, step_id = %step.step_id, error = %err, "step submission failed, continuing");
                    skipped += 1;
                }
            }
        }

        info!(plan_id = %plan.plan_id, submitted, skipped, "plan execution complete");

        Ok(ExecuteOutcome {
            plan_id: plan.plan_id.to_string(),
            submitted,
            skipped,
            dry_run: false,
        })
    }

    async fn submit_step(&self, plan: &Plan, step: &PlanStep) -> PlannerResult<()> {
        let body = StepSubmission {
            task_type: step.task_type.as_deref().unwrap_or("generic"),
            recipient_ai: step.recipient_ai.as_deref().unwrap_or("delegate"),
            from_principal: &plan.principal,
            for_principal: &plan.principal,
            task_body: &step.payload,
        };

        let response = self
            .http
            .post(format!("{}/tasks", self.coordinator_base_url))
            .json(&body)
            .send()
            .await?;

        response.error_for_status().map(|_| ()).map_err(PlannerError::Request)
    }
}

/// Advances a freshly-submitted plan's lifecycle status.
pub fn mark_executing(plan: &mut Plan) {
    plan.status = PlanStatus::Executing;
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_types::{PlanId, StepId, StepType};
    use std::collections::HashSet;

    fn sample_plan() -> Plan {
        Plan {
            plan_id: PlanId::generate(),
            principal: "user.bob".to_string(),
            intent: "summarize quarterly report".to_string(),
            steps: vec![PlanStep {
                step_id: StepId::generate(),
                step_type: StepType::QueueExecution,
                depends_on: HashSet::new(),
                task_type: Some("text_summarize".to_string()),
                recipient_ai: Some("worker.alice".to_string()),
                payload: serde_json::json!({"document": "q3.pdf"}),
            }],
            confidence: 0.9,
            status: PlanStatus::Draft,
        }
    }

    #[tokio::test]
    async fn dry_run_skips_submission() {
        let adapter = PlannerAdapter::new("http://127.0.0.1:0");
        let outcome = adapter.execute(&sample_plan(), true).await.unwrap();
        assert_eq!(outcome.submitted, 0);
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.dry_run);
    }

    #[tokio::test]
    async fn unreachable_coordinator_counts_as_skipped_not_fatal() {
        let adapter = PlannerAdapter::new("http://127.0.0.1:0");
        let outcome = adapter.execute(&sample_plan(), false).await.unwrap();
        assert_eq!(outcome.submitted, 0);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn mark_executing_updates_status() {
        let mut plan = sample_plan();
        mark_executing(&mut plan);
        assert_eq!(plan.status, PlanStatus::Executing);
    }
}
