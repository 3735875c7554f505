use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::models::Invoice;
use crate::services::settlement::history_page;
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct OrderHistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct OrderHistoryResponse {
    pub invoices: Vec<Invoice>,
    pub limit: i64,
    pub offset: u64,
    pub count: usize,
}

/// Archived invoices of a restaurant, newest first.
#[tracing::instrument(skip(state))]
pub async fn order_history(
    State(state): State<AppState>,
    Path(restaurant_id): Path<String>,
    Query(query): Query<OrderHistoryQuery>,
) -> Result<Json<OrderHistoryResponse>, AppError> {
    let (limit, offset) = history_page(query.limit, query.offset);
    let invoices = state
        .engine
        .invoice_history(&restaurant_id, Some(limit), Some(offset))
        .await?;

    let count = invoices.len();
    Ok(Json(OrderHistoryResponse {
        invoices,
        limit,
        offset,
        count,
    }))
}
