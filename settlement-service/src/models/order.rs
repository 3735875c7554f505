//! Open (not yet settled) table orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Table identifier exactly as the ordering client stored it.
///
/// Older clients wrote plain numbers, newer ones free text such as
/// `"Table 5"`; absent or null values are modelled as `None` on the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TableIdentifier {
    Number(f64),
    Text(String),
}

impl fmt::Display for TableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableIdentifier::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            TableIdentifier::Number(n) => write!(f, "{}", n),
            TableIdentifier::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for TableIdentifier {
    fn from(value: &str) -> Self {
        TableIdentifier::Text(value.to_string())
    }
}

/// Order status as written by the ordering and kitchen flows.
///
/// Unknown values are kept verbatim so they survive a round trip; they are
/// billed like any other non-cancelled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    OutForDelivery,
    Delivered,
    Cancelled,
    Rejected,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Preparing => "preparing",
            OrderStatus::OutForDelivery => "out-for-delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Other(s) => s.as_str(),
        }
    }

    pub fn from_string(s: &str) -> Self {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "pending" => OrderStatus::Pending,
            "confirmed" | "accepted" => OrderStatus::Confirmed,
            "preparing" => OrderStatus::Preparing,
            "out-for-delivery" => OrderStatus::OutForDelivery,
            "delivered" | "served" => OrderStatus::Delivered,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            "rejected" => OrderStatus::Rejected,
            _ => OrderStatus::Other(s.trim().to_string()),
        }
    }

    /// Cancelled and rejected orders are cleared with the table but never billed.
    pub fn is_billable(&self) -> bool {
        !matches!(self, OrderStatus::Cancelled | OrderStatus::Rejected)
    }
}

impl From<String> for OrderStatus {
    fn from(value: String) -> Self {
        OrderStatus::from_string(&value)
    }
}

impl From<OrderStatus> for String {
    fn from(value: OrderStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an open order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineItem {
    #[serde(rename = "itemId")]
    pub item_reference: String,
    pub quantity: u32,
    /// Price captured when the order was placed.
    #[serde(
        rename = "price",
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub unit_price: Option<Decimal>,
}

impl OrderLineItem {
    pub fn new(item_reference: impl Into<String>, quantity: u32, unit_price: Option<Decimal>) -> Self {
        Self {
            item_reference: item_reference.into(),
            quantity,
            unit_price,
        }
    }
}

/// A placed order that has not been consolidated into an invoice yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    pub id: String,
    pub restaurant_id: String,
    #[serde(rename = "tableNumber")]
    pub table_identifier: Option<TableIdentifier>,
    #[serde(rename = "items")]
    pub line_items: Vec<OrderLineItem>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "wpno", skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(rename = "total", skip_serializing_if = "Option::is_none")]
    pub declared_total: Option<String>,
}

impl OpenOrder {
    pub fn new(
        restaurant_id: impl Into<String>,
        table_identifier: Option<TableIdentifier>,
        line_items: Vec<OrderLineItem>,
        status: OrderStatus,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            restaurant_id: restaurant_id.into(),
            table_identifier,
            line_items,
            status,
            created_at: Utc::now(),
            customer_phone: None,
            declared_total: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parsing_accepts_legacy_spellings() {
        assert_eq!(OrderStatus::from_string("Out for Delivery"), OrderStatus::OutForDelivery);
        assert_eq!(OrderStatus::from_string("out_for_delivery"), OrderStatus::OutForDelivery);
        assert_eq!(OrderStatus::from_string("Canceled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::from_string(" REJECTED "), OrderStatus::Rejected);
        assert_eq!(
            OrderStatus::from_string("on-hold"),
            OrderStatus::Other("on-hold".to_string())
        );
    }

    #[test]
    fn only_cancelled_and_rejected_are_unbillable() {
        assert!(!OrderStatus::Cancelled.is_billable());
        assert!(!OrderStatus::Rejected.is_billable());
        assert!(OrderStatus::Pending.is_billable());
        assert!(OrderStatus::Delivered.is_billable());
        assert!(OrderStatus::Other("on-hold".into()).is_billable());
    }

    #[test]
    fn numeric_table_identifiers_display_without_fraction() {
        assert_eq!(TableIdentifier::Number(5.0).to_string(), "5");
        assert_eq!(TableIdentifier::Number(2.5).to_string(), "2.5");
        assert_eq!(TableIdentifier::from("Patio 2").to_string(), "Patio 2");
    }

    #[test]
    fn order_json_uses_stored_field_names() {
        let order = OpenOrder::new(
            "r1",
            Some(TableIdentifier::Number(7.0)),
            vec![OrderLineItem::new("burger", 2, Some(Decimal::new(150, 0)))],
            OrderStatus::Confirmed,
        );
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["restaurantId"], "r1");
        assert_eq!(json["tableNumber"], 7.0);
        assert_eq!(json["items"][0]["itemId"], "burger");
        assert_eq!(json["items"][0]["price"], 150.0);
        assert_eq!(json["status"], "confirmed");
    }
}
