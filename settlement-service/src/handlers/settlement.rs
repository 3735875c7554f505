use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Uri,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::models::{Invoice, OpenOrder};
use crate::services::consolidation::{ConsolidatedLine, RawCharges};
use crate::services::money::to_f64;
use crate::services::SettlementReceipt;
use crate::startup::AppState;
use service_core::error::AppError;

/// Segment index of `:table` in `/api/restaurants/:restaurant_id/tables/:table/...`.
const TABLE_SEGMENT: usize = 5;
/// Segment index of `:table` in `/api/clearTable/:table`.
const LEGACY_TABLE_SEGMENT: usize = 3;

/// The table segment as sent, still percent-encoded. The identifier
/// normalizer decodes it exactly once; `Path` has already decoded `decoded`.
fn raw_table<'a>(uri: &'a Uri, index: usize, decoded: &'a str) -> &'a str {
    uri.path().split('/').nth(index).unwrap_or(decoded)
}

/// Body of the settle and clear-table routes. Every field is optional; charge
/// values may be numbers or numeric strings.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    /// Only read by the legacy clear-table route.
    #[serde(default)]
    pub restaurant_id: Option<String>,
    #[serde(default)]
    pub tax_rate: Option<Value>,
    #[serde(default)]
    pub discount_rate: Option<Value>,
    #[serde(default)]
    pub additional_charges: Option<Value>,
    #[validate(length(max = 64, message = "paymentMethod is too long"))]
    #[serde(default)]
    pub payment_method: Option<String>,
}

impl SettleRequest {
    /// Empty bodies are accepted as "no overrides".
    fn parse(body: &Bytes) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        let request: Self = serde_json::from_slice(body).map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Invalid request body: {}", e))
        })?;
        request.validate()?;
        Ok(request)
    }

    fn charges(self) -> RawCharges {
        RawCharges {
            tax_rate: self.tax_rate,
            discount_rate: self.discount_rate,
            additional_charges: self.additional_charges,
            payment_method: self.payment_method,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    pub message: String,
    pub invoice_number: String,
    pub final_total: f64,
    pub cleared_orders: u64,
    pub unresolved_items: usize,
    pub invoice: Invoice,
}

impl SettleResponse {
    fn from_receipt(receipt: SettlementReceipt) -> Self {
        let label = receipt
            .invoice
            .table_identifier
            .clone()
            .unwrap_or_else(|| "without number".to_string());
        Self {
            success: true,
            message: format!("Table {} cleared and orders archived.", label),
            invoice_number: receipt.invoice.invoice_number.clone(),
            final_total: to_f64(receipt.invoice.final_total),
            cleared_orders: receipt.cleared_orders,
            unresolved_items: receipt.unresolved_items,
            invoice: receipt.invoice,
        }
    }
}

#[tracing::instrument(skip(state, uri, body))]
pub async fn settle_table(
    State(state): State<AppState>,
    Path((restaurant_id, table)): Path<(String, String)>,
    uri: Uri,
    body: Bytes,
) -> Result<Json<SettleResponse>, AppError> {
    let request = SettleRequest::parse(&body)?;
    let table = raw_table(&uri, TABLE_SEGMENT, &table);

    let receipt = state
        .engine
        .settle_table(&restaurant_id, Some(table), &request.charges())
        .await?;

    Ok(Json(SettleResponse::from_receipt(receipt)))
}

/// `POST /api/clearTable/:table` with the restaurant in the body.
#[tracing::instrument(skip(state, uri, body))]
pub async fn clear_table(
    State(state): State<AppState>,
    Path(table): Path<String>,
    uri: Uri,
    body: Bytes,
) -> Result<Json<SettleResponse>, AppError> {
    let mut request = SettleRequest::parse(&body)?;
    let restaurant_id = request.restaurant_id.take().unwrap_or_default();
    let table = raw_table(&uri, LEGACY_TABLE_SEGMENT, &table);

    let receipt = state
        .engine
        .settle_table(&restaurant_id, Some(table), &request.charges())
        .await?;

    Ok(Json(SettleResponse::from_receipt(receipt)))
}

/// Charge overrides for the bill preview, taken from the query string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillQuery {
    pub tax_rate: Option<String>,
    pub discount_rate: Option<String>,
    pub additional_charges: Option<String>,
    pub payment_method: Option<String>,
}

impl BillQuery {
    fn charges(self) -> RawCharges {
        RawCharges {
            tax_rate: self.tax_rate.map(Value::String),
            discount_rate: self.discount_rate.map(Value::String),
            additional_charges: self.additional_charges.map(Value::String),
            payment_method: self.payment_method,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillPreviewResponse {
    pub invoice: Invoice,
    pub lines: Vec<ConsolidatedLine>,
    pub contributing_order_ids: Vec<String>,
}

#[tracing::instrument(skip(state, uri))]
pub async fn preview_bill(
    State(state): State<AppState>,
    Path((restaurant_id, table)): Path<(String, String)>,
    uri: Uri,
    Query(query): Query<BillQuery>,
) -> Result<Json<BillPreviewResponse>, AppError> {
    let table = raw_table(&uri, TABLE_SEGMENT, &table);
    let preview = state
        .engine
        .preview_bill(&restaurant_id, Some(table), &query.charges())
        .await?;

    Ok(Json(BillPreviewResponse {
        invoice: preview.invoice,
        lines: preview.lines,
        contributing_order_ids: preview.contributing_order_ids,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TableOrdersQuery {
    #[serde(default)]
    pub today: bool,
}

#[derive(Debug, Serialize)]
pub struct TableOrdersResponse {
    pub orders: Vec<OpenOrder>,
    pub count: usize,
}

#[tracing::instrument(skip(state, uri))]
pub async fn table_orders(
    State(state): State<AppState>,
    Path((restaurant_id, table)): Path<(String, String)>,
    uri: Uri,
    Query(query): Query<TableOrdersQuery>,
) -> Result<Json<TableOrdersResponse>, AppError> {
    let table = raw_table(&uri, TABLE_SEGMENT, &table);
    let orders = state
        .engine
        .list_table_orders(&restaurant_id, Some(table), query.today)
        .await?;

    let count = orders.len();
    Ok(Json(TableOrdersResponse { orders, count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn table_segment_is_taken_before_decoding() {
        let uri: Uri = "/api/restaurants/r1/tables/A%2541/settle?x=1".parse().unwrap();
        assert_eq!(raw_table(&uri, TABLE_SEGMENT, "A%41"), "A%2541");

        let legacy: Uri = "/api/clearTable/Patio%202".parse().unwrap();
        assert_eq!(raw_table(&legacy, LEGACY_TABLE_SEGMENT, "Patio 2"), "Patio%202");
    }

    #[test]
    fn empty_body_means_no_overrides() {
        let request = SettleRequest::parse(&Bytes::from_static(b"  ")).unwrap();
        assert!(request.tax_rate.is_none());
        assert!(request.payment_method.is_none());
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let err = SettleRequest::parse(&Bytes::from_static(b"{tax")).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn overlong_payment_method_fails_validation() {
        let body = json!({ "paymentMethod": "x".repeat(65) }).to_string();
        let err = SettleRequest::parse(&Bytes::from(body)).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn legacy_body_carries_restaurant_and_string_charges() {
        let body = json!({
            "restaurantId": "64b7f0c2a1b2c3d4e5f60718",
            "taxRate": "5",
            "additionalCharges": 20,
            "paymentMethod": "UPI"
        })
        .to_string();
        let request = SettleRequest::parse(&Bytes::from(body)).unwrap();
        assert_eq!(request.restaurant_id.as_deref(), Some("64b7f0c2a1b2c3d4e5f60718"));

        let charges = request.charges();
        assert_eq!(charges.tax_rate, Some(json!("5")));
        assert_eq!(charges.additional_charges, Some(json!(20)));
        assert_eq!(charges.payment_method.as_deref(), Some("UPI"));
    }
}
