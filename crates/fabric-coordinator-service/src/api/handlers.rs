//! Coordinator REST handlers (§6).

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fabric_coordinator::{
    CompleteRequest, CompleteResponse, CreateTaskResponse, FailRequest, FailResponse, HeartbeatRequest,
    HeartbeatResponse, LeaseRequest, LeasedTask, ReclaimResponse,
};
use fabric_types::{Task, TaskSpec, TaskStatus};
use serde::Deserialize;

use crate::auth_extract::resolve_tenant;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(spec): Json<TaskSpec>,
) -> Result<Json<CreateTaskResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let (task, receipt_id) = state.coordinator.create(&tenant_id, spec).await?;
    Ok(Json(CreateTaskResponse {
        task_id: task.task_id,
        receipt_id,
        status: "queued",
        created_at: task.created_at,
    }))
}

pub async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let task = state.coordinator.get(&tenant_id, &fabric_types::TaskId::new(task_id)).await?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<TaskStatus>,
    #[serde(default = "default_list_limit")]
    pub limit: i64,
}

fn default_list_limit() -> i64 {
    50
}

pub async fn list_tasks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let tasks = state.coordinator.list(&tenant_id, query.status, query.limit).await?;
    Ok(Json(tasks))
}

pub async fn lease(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<LeaseRequest>,
) -> Result<Response, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let tasks = state
        .coordinator
        .lease(&tenant_id, &request.worker_id, &request.preferred_kinds, request.max_tasks)
        .await?;

    let leased: Vec<LeasedTask> = tasks
        .into_iter()
        .map(|t| LeasedTask {
            task_id: t.task_id,
            lease_id: t.lease_id.map(|l| l.to_string()).unwrap_or_default(),
            task_type: t.task_type,
            task_body: t.task_body,
            inputs: t.inputs,
            attempt: t.attempt,
            lease_expires_at: t.lease_expires_at.unwrap_or_default(),
        })
        .collect();

    if leased.is_empty() {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(Json(leased).into_response())
    }
}

pub async fn heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lease_id): Path<String>,
    Json(request): Json<HeartbeatRequest>,
) -> Result<Json<HeartbeatResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let task = state.coordinator.heartbeat(&tenant_id, &lease_id, &request.worker_id).await?;
    Ok(Json(HeartbeatResponse {
        lease_expires_at: task.lease_expires_at.unwrap_or_default(),
    }))
}

pub async fn complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lease_id): Path<String>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<CompleteResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let response = state.coordinator.complete(&tenant_id, &lease_id, request).await?;
    Ok(Json(response))
}

pub async fn fail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lease_id): Path<String>,
    Json(request): Json<FailRequest>,
) -> Result<Json<FailResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let response = state.coordinator.fail(&tenant_id, &lease_id, request).await?;
    Ok(Json(response))
}

pub async fn expire_leases(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ReclaimResponse>, ApiError> {
    resolve_tenant(state.resolver.as_ref(), &headers).await?;
    // Admin endpoint: the background reaper already runs this sweep on its
    // own cadence; this route lets an operator force an off-cycle pass.
    let expired = state.reaper.sweep().await;
    Ok(Json(ReclaimResponse { expired }))
}
