//! Storage seams used by the settlement engine.
//!
//! Each trait has a MongoDB implementation ([`super::database::SettlementDb`])
//! and an in-memory one ([`super::memory::MemoryStore`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;

use crate::models::{Invoice, MenuItem, OpenOrder, ReconciliationTask};
use crate::services::identifier::MatchPredicate;

/// Open orders placed by the ordering flow.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// All open orders of the restaurant matching the predicate.
    async fn find_open_orders(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
    ) -> Result<Vec<OpenOrder>, AppError>;

    /// Delete every open order of the restaurant matching the predicate.
    /// Returns the number of deleted orders.
    async fn delete_open_orders(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
    ) -> Result<u64, AppError>;

    /// Delete specific orders of the restaurant by id.
    async fn delete_orders(&self, restaurant_id: &str, order_ids: &[String]) -> Result<u64, AppError>;

    /// Matching orders, newest first, optionally created at or after `since`.
    async fn list_table_orders(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<OpenOrder>, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

/// Read-only menu lookup.
#[async_trait]
pub trait MenuCatalog: Send + Sync {
    async fn lookup_item(&self, item_reference: &str) -> Result<Option<MenuItem>, AppError>;
}

/// Append-only invoice history.
#[async_trait]
pub trait InvoiceArchive: Send + Sync {
    /// Persist a draft and return it with its storage id.
    async fn save_invoice(&self, invoice: Invoice) -> Result<Invoice, AppError>;

    /// Invoices of a restaurant, newest first.
    async fn list_invoices(
        &self,
        restaurant_id: &str,
        limit: i64,
        offset: u64,
    ) -> Result<Vec<Invoice>, AppError>;
}

/// Durable queue of settlements whose order clean-up failed.
#[async_trait]
pub trait ReconciliationQueue: Send + Sync {
    async fn enqueue(&self, task: &ReconciliationTask) -> Result<(), AppError>;

    async fn list_pending(&self, restaurant_id: &str) -> Result<Vec<ReconciliationTask>, AppError>;

    async fn get(&self, task_id: &str) -> Result<Option<ReconciliationTask>, AppError>;

    async fn mark_resolved(&self, task: &ReconciliationTask) -> Result<(), AppError>;
}
