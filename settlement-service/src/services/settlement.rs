//! Table settlement.
//!
//! A settlement archives one invoice for every open order of a table and then
//! clears those orders. The two writes are not atomic: when the invoice is
//! durable but the clean-up fails, a reconciliation task is queued and the
//! caller is told which invoice needs attention.

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::config::SettlementSettings;
use crate::models::{Invoice, OpenOrder, ReconciliationStatus, ReconciliationTask};
use crate::services::consolidation::{consolidate, ChargeParams, Consolidation, RawCharges};
use crate::services::error::SettlementError;
use crate::services::identifier::{IdentifierNormalizer, MatchPredicate};
use crate::services::lock::{TableKey, TableLocks};
use crate::services::metrics::{
    INVOICE_AMOUNT_TOTAL, ORDERS_CLEARED_TOTAL, RECONCILIATION_TASKS_TOTAL, SETTLEMENTS_TOTAL,
    SETTLEMENT_DURATION,
};
use crate::services::money::to_f64;
use crate::services::store::{InvoiceArchive, MenuCatalog, OrderStore, ReconciliationQueue};

pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Storage and coordination capabilities the engine runs against.
#[derive(Clone)]
pub struct SettlementBackends {
    pub orders: Arc<dyn OrderStore>,
    pub catalog: Arc<dyn MenuCatalog>,
    pub archive: Arc<dyn InvoiceArchive>,
    pub reconciliation: Arc<dyn ReconciliationQueue>,
    pub locks: Arc<dyn TableLocks>,
}

/// Outcome of a successful settlement.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub invoice: Invoice,
    pub contributing_order_ids: Vec<String>,
    /// Orders actually deleted; can exceed the contributing orders when new
    /// ones arrived for the table while the bill was being computed.
    pub cleared_orders: u64,
    pub unresolved_items: usize,
}

pub struct SettlementEngine {
    backends: SettlementBackends,
    normalizer: IdentifierNormalizer,
    settings: SettlementSettings,
}

impl SettlementEngine {
    pub fn new(backends: SettlementBackends, settings: SettlementSettings) -> Self {
        let normalizer = IdentifierNormalizer::new(&settings.missing_table_sentinels);
        Self {
            backends,
            normalizer,
            settings,
        }
    }

    pub fn normalizer(&self) -> &IdentifierNormalizer {
        &self.normalizer
    }

    pub fn settings(&self) -> &SettlementSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.settings.utc_offset())
    }

    fn charges(&self, raw: &RawCharges) -> ChargeParams {
        ChargeParams::from_raw(raw, &self.settings.default_payment_method)
    }

    /// Settle every open order of a table.
    #[instrument(skip_all, fields(restaurant_id = %restaurant_id, table = ?raw_table))]
    pub async fn settle_table(
        &self,
        restaurant_id: &str,
        raw_table: Option<&str>,
        charges: &RawCharges,
    ) -> Result<SettlementReceipt, SettlementError> {
        let timer = SETTLEMENT_DURATION.start_timer();
        let result = self.run_settlement(restaurant_id, raw_table, charges).await;
        timer.observe_duration();

        let outcome = match &result {
            Ok(_) => "settled",
            Err(e) => e.outcome(),
        };
        SETTLEMENTS_TOTAL.with_label_values(&[outcome]).inc();
        if let Err(e) = &result {
            warn!(outcome, error = %e, "Settlement failed");
        }
        result
    }

    async fn run_settlement(
        &self,
        restaurant_id: &str,
        raw_table: Option<&str>,
        charges: &RawCharges,
    ) -> Result<SettlementReceipt, SettlementError> {
        let restaurant_id = require_restaurant(restaurant_id)?;
        let predicate = self.normalizer.normalize(raw_table);
        let params = self.charges(charges);
        let key = TableKey::new(restaurant_id, &predicate);
        let limit = self.settings.request_timeout();

        // The deadline covers waiting and reading only. Writes are never
        // cancelled once the invoice save has started.
        let (lease, consolidation) = tokio::time::timeout(limit, async {
            let lease = self
                .backends
                .locks
                .acquire(&key, self.settings.lock_wait())
                .await?;
            let consolidation = self.consolidate(restaurant_id, &predicate, &params).await?;
            Ok::<_, SettlementError>((lease, consolidation))
        })
        .await
        .map_err(|_| SettlementError::Timeout(limit))??;

        let receipt = self.settle(restaurant_id, &predicate, consolidation).await;
        drop(lease);
        receipt
    }

    /// Read the table's open orders and fold them into an invoice draft.
    pub async fn consolidate(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
        params: &ChargeParams,
    ) -> Result<Consolidation, SettlementError> {
        let orders = self
            .backends
            .orders
            .find_open_orders(restaurant_id, predicate)
            .await?;
        consolidate(
            orders,
            self.backends.catalog.as_ref(),
            restaurant_id,
            predicate,
            params,
            self.now(),
        )
        .await
    }

    /// Archive the draft, then clear the table.
    ///
    /// The caller must hold the table lease.
    pub async fn settle(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
        consolidation: Consolidation,
    ) -> Result<SettlementReceipt, SettlementError> {
        let unresolved_items = consolidation.unresolved_count();
        let Consolidation {
            invoice,
            contributing_order_ids,
            ..
        } = consolidation;

        let invoice = self.backends.archive.save_invoice(invoice).await.map_err(|e| {
            error!(error = %e, "Failed to archive invoice, orders left untouched");
            SettlementError::persistence(format!("Failed to archive invoice: {}", e))
        })?;

        info!(
            invoice_number = %invoice.invoice_number,
            final_total = %invoice.final_total,
            orders = contributing_order_ids.len(),
            unresolved_items,
            "Invoice archived"
        );
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[invoice.payment_method.as_str()])
            .inc_by(to_f64(invoice.final_total));

        match self
            .backends
            .orders
            .delete_open_orders(restaurant_id, predicate)
            .await
        {
            Ok(cleared_orders) => {
                ORDERS_CLEARED_TOTAL.inc_by(cleared_orders);
                if cleared_orders != contributing_order_ids.len() as u64 {
                    warn!(
                        invoice_number = %invoice.invoice_number,
                        cleared_orders,
                        contributing = contributing_order_ids.len(),
                        "Cleared order count differs from invoiced orders"
                    );
                }
                Ok(SettlementReceipt {
                    invoice,
                    contributing_order_ids,
                    cleared_orders,
                    unresolved_items,
                })
            }
            Err(e) => {
                error!(
                    invoice_number = %invoice.invoice_number,
                    error = %e,
                    "Invoice archived but orders were not cleared"
                );
                self.queue_reconciliation(
                    restaurant_id,
                    &invoice.invoice_number,
                    predicate,
                    contributing_order_ids,
                    e.to_string(),
                )
                .await;
                Err(SettlementError::PersistenceFailure {
                    message: format!("Failed to clear orders: {}", e),
                    invoice_number: Some(invoice.invoice_number),
                })
            }
        }
    }

    async fn queue_reconciliation(
        &self,
        restaurant_id: &str,
        invoice_number: &str,
        predicate: &MatchPredicate,
        order_ids: Vec<String>,
        error_message: String,
    ) {
        let task = ReconciliationTask::new(
            restaurant_id,
            invoice_number,
            predicate.clone(),
            order_ids,
            error_message,
        );
        match self.backends.reconciliation.enqueue(&task).await {
            Ok(()) => {
                RECONCILIATION_TASKS_TOTAL.with_label_values(&["enqueued"]).inc();
                warn!(task_id = %task.task_id, invoice_number, "Reconciliation task queued");
            }
            Err(e) => {
                RECONCILIATION_TASKS_TOTAL
                    .with_label_values(&["enqueue_failed"])
                    .inc();
                error!(
                    invoice_number,
                    order_ids = ?task.order_ids,
                    error = %e,
                    "Failed to queue reconciliation task"
                );
            }
        }
    }

    /// Compute the bill without archiving or clearing anything.
    #[instrument(skip_all, fields(restaurant_id = %restaurant_id, table = ?raw_table))]
    pub async fn preview_bill(
        &self,
        restaurant_id: &str,
        raw_table: Option<&str>,
        charges: &RawCharges,
    ) -> Result<Consolidation, SettlementError> {
        let restaurant_id = require_restaurant(restaurant_id)?;
        let predicate = self.normalizer.normalize(raw_table);
        let params = self.charges(charges);
        let limit = self.settings.request_timeout();

        tokio::time::timeout(limit, self.consolidate(restaurant_id, &predicate, &params))
            .await
            .map_err(|_| SettlementError::Timeout(limit))?
    }

    /// Open orders of a table, newest first. With `today`, only orders placed
    /// since local midnight.
    #[instrument(skip_all, fields(restaurant_id = %restaurant_id, table = ?raw_table))]
    pub async fn list_table_orders(
        &self,
        restaurant_id: &str,
        raw_table: Option<&str>,
        today: bool,
    ) -> Result<Vec<OpenOrder>, SettlementError> {
        let restaurant_id = require_restaurant(restaurant_id)?;
        let predicate = self.normalizer.normalize(raw_table);
        let since = if today { Some(start_of_day(self.now())) } else { None };

        Ok(self
            .backends
            .orders
            .list_table_orders(restaurant_id, &predicate, since)
            .await?)
    }

    /// Archived invoices of a restaurant, newest first.
    #[instrument(skip_all, fields(restaurant_id = %restaurant_id))]
    pub async fn invoice_history(
        &self,
        restaurant_id: &str,
        limit: Option<i64>,
        offset: Option<u64>,
    ) -> Result<Vec<Invoice>, SettlementError> {
        let restaurant_id = require_restaurant(restaurant_id)?;
        let (limit, offset) = history_page(limit, offset);
        Ok(self
            .backends
            .archive
            .list_invoices(restaurant_id, limit, offset)
            .await?)
    }

    pub async fn pending_reconciliation(
        &self,
        restaurant_id: &str,
    ) -> Result<Vec<ReconciliationTask>, SettlementError> {
        let restaurant_id = require_restaurant(restaurant_id)?;
        Ok(self
            .backends
            .reconciliation
            .list_pending(restaurant_id)
            .await?)
    }

    /// Delete the orders recorded on a task and mark it resolved.
    #[instrument(skip_all, fields(restaurant_id = %restaurant_id, task_id = %task_id))]
    pub async fn resolve_reconciliation(
        &self,
        restaurant_id: &str,
        task_id: &str,
    ) -> Result<ReconciliationTask, SettlementError> {
        let restaurant_id = require_restaurant(restaurant_id)?;
        let mut task = self
            .backends
            .reconciliation
            .get(task_id)
            .await?
            .filter(|t| t.restaurant_id == restaurant_id)
            .ok_or_else(|| {
                SettlementError::NotFound(format!("Reconciliation task not found: {}", task_id))
            })?;

        if task.status == ReconciliationStatus::Resolved {
            return Ok(task);
        }

        let deleted = self
            .backends
            .orders
            .delete_orders(restaurant_id, &task.order_ids)
            .await
            .map_err(|e| SettlementError::persistence(format!("Failed to clear orders: {}", e)))?;

        task.mark_resolved(deleted);
        self.backends.reconciliation.mark_resolved(&task).await?;

        ORDERS_CLEARED_TOTAL.inc_by(deleted);
        RECONCILIATION_TASKS_TOTAL.with_label_values(&["resolved"]).inc();
        info!(
            invoice_number = %task.invoice_number,
            deleted,
            "Reconciliation task resolved"
        );
        Ok(task)
    }

    pub async fn ping(&self) -> Result<(), SettlementError> {
        Ok(self.backends.orders.ping().await?)
    }
}

fn require_restaurant(restaurant_id: &str) -> Result<&str, SettlementError> {
    let trimmed = restaurant_id.trim();
    if trimmed.is_empty() {
        return Err(SettlementError::InvalidInput(
            "restaurantId is required".to_string(),
        ));
    }
    Ok(trimmed)
}

pub fn history_page(limit: Option<i64>, offset: Option<u64>) -> (i64, u64) {
    (
        limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT),
        offset.unwrap_or(0),
    )
}

fn start_of_day(now: DateTime<FixedOffset>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(*now.offset()).single())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc))
}
