//! The Plan — the planner's external contract (§3, §4.7).
//!
//! Step kinds and worker capabilities mirror the original rule-based
//! planner's vocabulary (`step_type`, `WorkerCapability`), carried forward
//! here even though the planner's own intent-detection heuristics are out
//! of scope.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ids::{PlanId, ReceiptId, StepId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    QueueExecution,
    CallWorker,
    WaitFor,
    Aggregate,
    Escalate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Draft,
    Executing,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerCapability {
    CodeGenerate,
    CodeReview,
    CodeRefactor,
    DataAnalyze,
    DataTransform,
    TextSummarize,
    TextTranslate,
    ImageGenerate,
    Search,
    Generic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_id: StepId,
    pub step_type: StepType,
    #[serde(default)]
    pub depends_on: HashSet<StepId>,
    #[serde(default)]
    pub task_type: Option<String>,
    #[serde(default)]
    pub recipient_ai: Option<String>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: PlanId,
    pub principal: String,
    pub intent: String,
    pub steps: Vec<PlanStep>,
    pub confidence: f32,
    pub status: PlanStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    pub intent: String,
    pub principal: String,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub constraints: serde_json::Value,
    #[serde(default)]
    pub caused_by_receipt_id: Option<ReceiptId>,
    #[serde(default)]
    pub parent_task_id: Option<TaskId>,
}

/// Orders `queue_execution` steps so that a step whose `depends_on` set is
/// already satisfied by earlier steps in the returned order submits first
/// (§4.7): one topological pass, falling back to original list order for
/// any step whose dependencies are not satisfied within that pass.
pub fn topological_execution_order(steps: &[PlanStep]) -> Vec<&PlanStep> {
    let queue_steps: Vec<&PlanStep> = steps
        .iter()
        .filter(|s| s.step_type == StepType::QueueExecution)
        .collect();

    let mut resolved: HashSet<StepId> = HashSet::new();
    let mut ordered: Vec<&PlanStep> = Vec::with_capacity(queue_steps.len());
    let mut remaining: Vec<&PlanStep> = queue_steps.clone();

    loop {
        let mut progressed = false;
        let mut next_remaining = Vec::new();
        for step in remaining {
            if step.depends_on.iter().all(|d| resolved.contains(d)) {
                resolved.insert(step.step_id.clone());
                ordered.push(step);
                progressed = true;
            } else {
                next_remaining.push(step);
            }
        }
        remaining = next_remaining;
        if !progressed || remaining.is_empty() {
            break;
        }
    }

    // Dependencies never satisfied within this pass: append in original
    // order rather than blocking plan execution on them.
    ordered.extend(remaining);
    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, step_type: StepType, deps: &[&str]) -> PlanStep {
        PlanStep {
            step_id: StepId::new(id),
            step_type,
            depends_on: deps.iter().map(|d| StepId::new(*d)).collect(),
            task_type: Some("demo".to_string()),
            recipient_ai: Some("worker.alice".to_string()),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn independent_steps_keep_their_relative_order() {
        let steps = vec![
            step("step-a", StepType::QueueExecution, &[]),
            step("step-b", StepType::QueueExecution, &[]),
        ];
        let order = topological_execution_order(&steps);
        assert_eq!(order[0].step_id.as_str(), "step-a");
        assert_eq!(order[1].step_id.as_str(), "step-b");
    }

    #[test]
    fn dependent_step_submits_after_its_dependency() {
        let steps = vec![
            step("step-b", StepType::QueueExecution, &["step-a"]),
            step("step-a", StepType::QueueExecution, &[]),
        ];
        let order = topological_execution_order(&steps);
        assert_eq!(order[0].step_id.as_str(), "step-a");
        assert_eq!(order[1].step_id.as_str(), "step-b");
    }

    #[test]
    fn non_queue_execution_steps_are_excluded() {
        let steps = vec![
            step("step-a", StepType::QueueExecution, &[]),
            step("step-escalate", StepType::Escalate, &[]),
        ];
        let order = topological_execution_order(&steps);
        assert_eq!(order.len(), 1);
    }
}
