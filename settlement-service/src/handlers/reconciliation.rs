use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ReconciliationTask;
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
pub struct ReconciliationTaskResponse {
    pub task_id: String,
    pub restaurant_id: String,
    pub invoice_number: String,
    pub table: String,
    pub order_ids: Vec<String>,
    pub error: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_count: Option<u64>,
    pub created_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_utc: Option<DateTime<Utc>>,
}

impl From<ReconciliationTask> for ReconciliationTaskResponse {
    fn from(task: ReconciliationTask) -> Self {
        Self {
            task_id: task.task_id,
            restaurant_id: task.restaurant_id,
            invoice_number: task.invoice_number,
            table: task.predicate.to_string(),
            order_ids: task.order_ids,
            error: task.error_message,
            status: task.status.to_string(),
            deleted_count: task.deleted_count,
            created_utc: task.created_utc,
            resolved_utc: task.resolved_utc,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListReconciliationResponse {
    pub tasks: Vec<ReconciliationTaskResponse>,
    pub count: usize,
}

/// Pending compensation tasks of a restaurant.
#[tracing::instrument(skip(state))]
pub async fn list_reconciliation_tasks(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
) -> Result<Json<ListReconciliationResponse>, AppError> {
    let tasks: Vec<ReconciliationTaskResponse> = state
        .engine
        .pending_reconciliation(&restaurant_id)
        .await?
        .into_iter()
        .map(ReconciliationTaskResponse::from)
        .collect();

    let count = tasks.len();
    Ok(Json(ListReconciliationResponse { tasks, count }))
}

#[tracing::instrument(skip(state))]
pub async fn resolve_reconciliation_task(
    State(state): State<AppState>,
    Path((restaurant_id, task_id)): Path<(String, String)>,
) -> Result<Json<ReconciliationTaskResponse>, AppError> {
    let task = state
        .engine
        .resolve_reconciliation(&restaurant_id, &task_id)
        .await?;

    Ok(Json(task.into()))
}
