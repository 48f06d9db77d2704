use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use model::operation::types::{Operation, OperationConfig};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::error::OrchestratorError;

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOperationRequest {
    pub owner_id: String,
    pub source_registry_id: String,
    pub config: OperationConfig,
    pub scheduled_at: Option<DateTime<Utc>>,
}

pub async fn create_operation(
    State(state): State<AppState>,
    Json(req): Json<CreateOperationRequest>,
) -> Result<(StatusCode, Json<Operation>), OrchestratorError> {
    req.config
        .validate()
        .map_err(OrchestratorError::Validation)?;

    let mut op = Operation::new(req.owner_id, req.source_registry_id, req.config);
    if let Some(scheduled_at) = req.scheduled_at {
        op.scheduled_at = scheduled_at;
    }
    let op = state.store.insert(op).await?;
    Ok((StatusCode::CREATED, Json(op)))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub owner_id: Option<String>,
}

pub async fn list_operations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Operation>>, OrchestratorError> {
    let ops = state.store.list(query.owner_id.as_deref()).await?;
    Ok(Json(ops))
}

pub async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Operation>, OrchestratorError> {
    let op = state.store.get(id).await?.ok_or(OrchestratorError::NotFound(id))?;
    Ok(Json(op))
}

pub async fn delete_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Operation>, OrchestratorError> {
    let op = state.lifecycle.delete(id).await?;
    Ok(Json(op))
}

#[derive(Debug, Deserialize)]
pub struct ExecuteQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn execute_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExecuteQuery>,
) -> Result<Json<Operation>, OrchestratorError> {
    let op = state.lifecycle.execute(id, query.force).await?;
    Ok(Json(op))
}

pub async fn retry_operation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Operation>, OrchestratorError> {
    let op = state.lifecycle.retry(id).await?;
    Ok(Json(op))
}

#[derive(Debug, Serialize)]
pub struct OperationStatusView {
    #[serde(flatten)]
    pub operation: Operation,
    pub duration_seconds: Option<i64>,
    pub is_completed: bool,
    pub is_success: bool,
}

pub async fn operation_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OperationStatusView>, OrchestratorError> {
    let op = state.store.get(id).await?.ok_or(OrchestratorError::NotFound(id))?;
    Ok(Json(OperationStatusView {
        duration_seconds: op.duration_seconds(),
        is_completed: op.is_completed(),
        is_success: op.is_success(),
        operation: op,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub owner_id: Option<String>,
    #[serde(default = "default_recent")]
    pub recent: usize,
}

fn default_recent() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct OperationsSummary {
    pub by_status: HashMap<String, u64>,
    pub by_type: HashMap<String, u64>,
    pub recent: Vec<Operation>,
}

pub async fn operations_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Result<Json<OperationsSummary>, OrchestratorError> {
    let mut ops = state.store.list(query.owner_id.as_deref()).await?;
    let mut by_status = HashMap::new();
    let mut by_type = HashMap::new();
    for op in &ops {
        *by_status.entry(format!("{:?}", op.status)).or_insert(0u64) += 1;
        *by_type.entry(format!("{:?}", op.operation_type)).or_insert(0u64) += 1;
    }
    ops.sort_by_key(|op| std::cmp::Reverse(op.created_at));
    ops.truncate(query.recent);

    Ok(Json(OperationsSummary {
        by_status,
        by_type,
        recent: ops,
    }))
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}
