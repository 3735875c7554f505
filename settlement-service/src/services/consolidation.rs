//! Bill consolidation.
//!
//! Folds every open order of a table into one invoice draft: line items are
//! flattened in order of placement, prices are resolved against the order
//! snapshot and the menu catalog, and the financial breakdown is computed
//! with two-decimal half-up rounding.

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::models::{Invoice, InvoiceLineItem, MenuItem, OpenOrder};
use crate::services::error::SettlementError;
use crate::services::identifier::MatchPredicate;
use crate::services::metrics::PRICE_RESOLUTIONS_TOTAL;
use crate::services::money::{line_total, parse_non_negative, percent_of, round2};
use crate::services::store::MenuCatalog;

pub const UNKNOWN_ITEM: &str = "Unknown Item";

/// Charge overrides exactly as the client sent them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCharges {
    #[serde(default)]
    pub tax_rate: Option<Value>,
    #[serde(default)]
    pub discount_rate: Option<Value>,
    #[serde(default)]
    pub additional_charges: Option<Value>,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Validated charges. All amounts are non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeParams {
    pub tax_rate: Decimal,
    pub discount_rate: Decimal,
    pub additional_charges: Decimal,
    pub payment_method: String,
}

impl ChargeParams {
    /// Lenient coercion: anything missing, negative or non-numeric becomes
    /// zero. Values that were present but unusable are logged.
    pub fn from_raw(raw: &RawCharges, default_payment_method: &str) -> Self {
        let payment_method = raw
            .payment_method
            .as_deref()
            .map(str::trim)
            .filter(|pm| !pm.is_empty())
            .unwrap_or(default_payment_method)
            .to_string();

        Self {
            tax_rate: coerce("taxRate", raw.tax_rate.as_ref()),
            discount_rate: coerce("discountRate", raw.discount_rate.as_ref()),
            additional_charges: coerce("additionalCharges", raw.additional_charges.as_ref()),
            payment_method,
        }
    }
}

fn coerce(field: &'static str, value: Option<&Value>) -> Decimal {
    match value {
        None | Some(Value::Null) => Decimal::ZERO,
        Some(v) => parse_non_negative(v).unwrap_or_else(|| {
            warn!(field, value = %v, "Unusable charge value coerced to 0");
            Decimal::ZERO
        }),
    }
}

/// How the unit price of a consolidated line was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceResolution {
    /// Order-time snapshot price.
    Resolved,
    /// Snapshot missing or zero; current catalog price used.
    FallbackToCatalog,
    /// No price anywhere; billed at zero.
    Unresolved,
}

impl PriceResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceResolution::Resolved => "resolved",
            PriceResolution::FallbackToCatalog => "fallback_to_catalog",
            PriceResolution::Unresolved => "unresolved",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedLine {
    pub order_id: String,
    pub item_reference: String,
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
    pub billable: bool,
    /// `None` for lines of excluded orders, which are never priced.
    pub resolution: Option<PriceResolution>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Breakdown {
    pub sub_total: Decimal,
    pub tax_amount: Decimal,
    pub discount_amount: Decimal,
    pub additional_charges: Decimal,
    pub final_total: Decimal,
}

fn out_of_range() -> SettlementError {
    SettlementError::InvalidInput("amount out of range".to_string())
}

/// Fails with `InvalidInput` when any intermediate amount overflows.
pub fn compute_breakdown(
    sub_total: Decimal,
    charges: &ChargeParams,
) -> Result<Breakdown, SettlementError> {
    let sub_total = round2(sub_total);
    let tax_amount = percent_of(sub_total, charges.tax_rate).ok_or_else(out_of_range)?;
    let discount_amount = percent_of(sub_total, charges.discount_rate).ok_or_else(out_of_range)?;
    let additional_charges = round2(charges.additional_charges);
    let final_total = sub_total
        .checked_add(tax_amount)
        .and_then(|total| total.checked_add(additional_charges))
        .and_then(|total| total.checked_sub(discount_amount))
        .map(round2)
        .ok_or_else(out_of_range)?;

    Ok(Breakdown {
        sub_total,
        tax_amount,
        discount_amount,
        additional_charges,
        final_total,
    })
}

/// `INV-DDMMYYYYHHmmss` in the restaurant's local offset.
pub fn invoice_number(at: DateTime<FixedOffset>) -> String {
    format!("INV-{}", at.format("%d%m%Y%H%M%S"))
}

/// Result of folding a table's open orders.
#[derive(Debug, Clone)]
pub struct Consolidation {
    /// Draft invoice (no storage id yet).
    pub invoice: Invoice,
    /// Every matched order, including excluded ones.
    pub contributing_order_ids: Vec<String>,
    pub lines: Vec<ConsolidatedLine>,
}

impl Consolidation {
    pub fn unresolved_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.resolution == Some(PriceResolution::Unresolved))
            .count()
    }
}

/// Memoised catalog reads for one consolidation. A failed read counts as a miss.
struct CatalogCache<'a> {
    catalog: &'a dyn MenuCatalog,
    entries: HashMap<String, Option<MenuItem>>,
}

impl<'a> CatalogCache<'a> {
    fn new(catalog: &'a dyn MenuCatalog) -> Self {
        Self {
            catalog,
            entries: HashMap::new(),
        }
    }

    async fn get(&mut self, item_reference: &str) -> Option<&MenuItem> {
        if !self.entries.contains_key(item_reference) {
            let found = match self.catalog.lookup_item(item_reference).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(item_reference, error = %e, "Menu lookup failed, treating as unknown");
                    None
                }
            };
            self.entries.insert(item_reference.to_string(), found);
        }
        self.entries.get(item_reference).and_then(Option::as_ref)
    }
}

/// Fold matched open orders into an invoice draft.
///
/// `orders` are the orders the predicate selected; they are processed in
/// order of placement. Fails with `NotFound` when there are none.
pub async fn consolidate(
    mut orders: Vec<OpenOrder>,
    catalog: &dyn MenuCatalog,
    restaurant_id: &str,
    predicate: &MatchPredicate,
    charges: &ChargeParams,
    now: DateTime<FixedOffset>,
) -> Result<Consolidation, SettlementError> {
    if orders.is_empty() {
        return Err(SettlementError::NotFound(format!(
            "No open orders for table {}",
            predicate
        )));
    }
    orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let mut cache = CatalogCache::new(catalog);
    let mut lines = Vec::new();
    let mut excluded_orders = 0u32;

    for order in &orders {
        let billable = order.status.is_billable();
        if !billable {
            excluded_orders += 1;
            debug!(order_id = %order.id, status = %order.status, "Order excluded from totals");
        }

        for item in &order.line_items {
            let snapshot = item.unit_price.filter(|p| *p > Decimal::ZERO);
            let catalog_entry = cache.get(&item.item_reference).await;
            let name = catalog_entry
                .map(|m| m.name.clone())
                .unwrap_or_else(|| UNKNOWN_ITEM.to_string());

            let (unit_price, resolution) = if !billable {
                (snapshot.unwrap_or(Decimal::ZERO), None)
            } else {
                let (price, resolution) = match (snapshot, catalog_entry) {
                    (Some(price), _) => (price, PriceResolution::Resolved),
                    (None, Some(entry)) if entry.price > Decimal::ZERO => {
                        (entry.price, PriceResolution::FallbackToCatalog)
                    }
                    _ => (Decimal::ZERO, PriceResolution::Unresolved),
                };
                PRICE_RESOLUTIONS_TOTAL
                    .with_label_values(&[resolution.as_str()])
                    .inc();
                if resolution == PriceResolution::Unresolved {
                    warn!(
                        order_id = %order.id,
                        item_reference = %item.item_reference,
                        "No price for item, billed at 0"
                    );
                }
                (price, Some(resolution))
            };

            let total = line_total(unit_price, item.quantity).ok_or_else(out_of_range)?;
            lines.push(ConsolidatedLine {
                order_id: order.id.clone(),
                item_reference: item.item_reference.clone(),
                name,
                quantity: item.quantity,
                unit_price,
                line_total: total,
                billable,
                resolution,
            });
        }
    }

    let sub_total = lines
        .iter()
        .filter(|l| l.billable)
        .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.line_total))
        .ok_or_else(out_of_range)?;
    let breakdown = compute_breakdown(sub_total, charges)?;

    let table_identifier =
        predicate.canonical_label(orders.iter().map(|o| o.table_identifier.as_ref()));

    let invoice = Invoice {
        id: None,
        restaurant_id: restaurant_id.to_string(),
        table_identifier,
        invoice_number: invoice_number(now),
        line_items: lines
            .iter()
            .map(|l| InvoiceLineItem {
                name: l.name.clone(),
                quantity: l.quantity,
                unit_price: round2(l.unit_price),
                billable: l.billable,
            })
            .collect(),
        sub_total: breakdown.sub_total,
        tax_rate: charges.tax_rate,
        tax_amount: breakdown.tax_amount,
        discount_rate: charges.discount_rate,
        discount_amount: breakdown.discount_amount,
        additional_charges: breakdown.additional_charges,
        final_total: breakdown.final_total,
        total_amount: breakdown.final_total,
        payment_method: charges.payment_method.clone(),
        timestamp: now.with_timezone(&Utc),
        order_count: orders.len() as u32,
        excluded_order_count: excluded_orders,
    };

    Ok(Consolidation {
        invoice,
        contributing_order_ids: orders.into_iter().map(|o| o.id).collect(),
        lines,
    })
}
