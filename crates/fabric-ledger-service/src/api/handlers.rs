//! Ledger REST handlers (§6).

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use fabric_types::wire::{
    AppendReceiptResponse, BootstrapResponse, InboxResponse, SearchFilters, TaskChainResponse,
    TaskTimelineResponse,
};
use fabric_types::{Receipt, ReceiptId, TaskId};
use serde::Deserialize;

use crate::auth_extract::resolve_tenant;
use crate::error::ApiError;
use crate::state::AppState;

pub async fn append_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(receipt): Json<Receipt>,
) -> Result<Json<AppendReceiptResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let mut receipt = receipt;
    receipt.tenant_id = tenant_id.clone();

    let (receipt_id, stored_at) = state.ledger.append(receipt).await?;
    Ok(Json(AppendReceiptResponse { receipt_id, stored_at, tenant_id }))
}

pub async fn get_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(receipt_id): Path<String>,
) -> Result<Json<Receipt>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let receipt = state.ledger.get(&tenant_id, &ReceiptId::new(receipt_id)).await?;
    Ok(Json(receipt))
}

#[derive(Debug, Deserialize)]
pub struct InboxQuery {
    pub recipient_ai: String,
    #[serde(default = "default_inbox_limit")]
    pub limit: i64,
}

fn default_inbox_limit() -> i64 {
    50
}

pub async fn inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<InboxQuery>,
) -> Result<Json<InboxResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let receipts = state.ledger.inbox(&tenant_id, &query.recipient_ai, query.limit).await?;
    Ok(Json(InboxResponse { receipts }))
}

pub async fn task_timeline(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<String>,
) -> Result<Json<TaskTimelineResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let task_id = TaskId::new(task_id);
    let receipts = state.ledger.timeline(&tenant_id, &task_id, true).await?;
    Ok(Json(TaskTimelineResponse { task_id, receipts }))
}

pub async fn receipt_chain(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(receipt_id): Path<String>,
) -> Result<Json<TaskChainResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let root = ReceiptId::new(receipt_id);
    let receipts = state.ledger.chain(&tenant_id, &root).await?;
    Ok(Json(TaskChainResponse { root, receipts }))
}

pub async fn archive_receipt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(receipt_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    state.ledger.archive(&tenant_id, &ReceiptId::new(receipt_id)).await?;
    Ok(Json(serde_json::json!({ "status": "archived" })))
}

#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    pub agent_name: String,
}

pub async fn bootstrap(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<BootstrapRequest>,
) -> Result<Json<BootstrapResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let response = state.ledger.bootstrap(&tenant_id, &request.agent_name).await?;
    Ok(Json(response))
}

pub async fn search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filters): Query<SearchFilters>,
) -> Result<Json<InboxResponse>, ApiError> {
    let tenant_id = resolve_tenant(state.resolver.as_ref(), &headers).await?;
    let receipts = state.ledger.search(&tenant_id, &filters).await?;
    Ok(Json(InboxResponse { receipts }))
}
