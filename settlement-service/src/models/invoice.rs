//! Invoice model for settlement-service.
//!
//! An invoice is the immutable record of one table settlement. Field names in
//! JSON follow the historical `orderhistories` layout so existing billing
//! screens keep working.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One consolidated line on an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineItem {
    pub name: String,
    pub quantity: u32,
    #[serde(rename = "price", with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    /// False for lines of cancelled/rejected orders: listed, never charged.
    pub billable: bool,
}

impl InvoiceLineItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Settled invoice document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Storage id, assigned by the archive. `None` while the invoice is a draft.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub restaurant_id: String,
    #[serde(rename = "tableNumber")]
    pub table_identifier: Option<String>,
    pub invoice_number: String,
    #[serde(rename = "orderItems")]
    pub line_items: Vec<InvoiceLineItem>,
    #[serde(with = "rust_decimal::serde::float")]
    pub sub_total: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub tax_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount_rate: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub additional_charges: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub final_total: Decimal,
    /// Mirror of `final_total` kept for older readers of the archive.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub payment_method: String,
    pub timestamp: DateTime<Utc>,
    pub order_count: u32,
    pub excluded_order_count: u32,
}

impl Invoice {
    pub fn is_draft(&self) -> bool {
        self.id.is_none()
    }

    /// Sum of the billable line totals, unrounded.
    pub fn billable_total(&self) -> Decimal {
        self.line_items
            .iter()
            .filter(|line| line.billable)
            .map(InvoiceLineItem::line_total)
            .sum()
    }
}
