//! In-memory storage backend.
//!
//! Used by the test suite and by local runs with `SETTLEMENT_STORAGE=memory`.
//! Write failures and slow reads can be injected to exercise the settlement
//! error paths.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::models::{Invoice, MenuItem, OpenOrder, ReconciliationStatus, ReconciliationTask};
use crate::services::identifier::MatchPredicate;
use crate::services::store::{InvoiceArchive, MenuCatalog, OrderStore, ReconciliationQueue};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    orders: RwLock<Vec<OpenOrder>>,
    menu: RwLock<HashMap<String, MenuItem>>,
    invoices: RwLock<Vec<Invoice>>,
    tasks: RwLock<Vec<ReconciliationTask>>,
    fail_invoice_writes: AtomicBool,
    fail_order_deletes: AtomicBool,
    fail_menu_reads: AtomicBool,
    read_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, order: OpenOrder) {
        self.inner.orders.write().await.push(order);
    }

    pub async fn insert_menu_item(&self, item: MenuItem) {
        self.inner.menu.write().await.insert(item.id.clone(), item);
    }

    pub async fn orders(&self) -> Vec<OpenOrder> {
        self.inner.orders.read().await.clone()
    }

    pub async fn invoices(&self) -> Vec<Invoice> {
        self.inner.invoices.read().await.clone()
    }

    pub async fn tasks(&self) -> Vec<ReconciliationTask> {
        self.inner.tasks.read().await.clone()
    }

    pub fn fail_invoice_writes(&self, fail: bool) {
        self.inner.fail_invoice_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_order_deletes(&self, fail: bool) {
        self.inner.fail_order_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_menu_reads(&self, fail: bool) {
        self.inner.fail_menu_reads.store(fail, Ordering::SeqCst);
    }

    /// Delay applied to every order read.
    pub fn set_read_delay(&self, delay: Duration) {
        self.inner
            .read_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn simulate_latency(&self) {
        let ms = self.inner.read_delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

fn selects(order: &OpenOrder, restaurant_id: &str, predicate: &MatchPredicate) -> bool {
    order.restaurant_id == restaurant_id && predicate.matches(order.table_identifier.as_ref())
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_open_orders(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
    ) -> Result<Vec<OpenOrder>, AppError> {
        self.simulate_latency().await;
        let orders = self.inner.orders.read().await;
        Ok(orders
            .iter()
            .filter(|o| selects(o, restaurant_id, predicate))
            .cloned()
            .collect())
    }

    async fn delete_open_orders(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
    ) -> Result<u64, AppError> {
        if self.inner.fail_order_deletes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "order store unavailable"
            )));
        }
        let mut orders = self.inner.orders.write().await;
        let before = orders.len();
        orders.retain(|o| !selects(o, restaurant_id, predicate));
        Ok((before - orders.len()) as u64)
    }

    async fn delete_orders(&self, restaurant_id: &str, order_ids: &[String]) -> Result<u64, AppError> {
        if self.inner.fail_order_deletes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "order store unavailable"
            )));
        }
        let mut orders = self.inner.orders.write().await;
        let before = orders.len();
        orders.retain(|o| !(o.restaurant_id == restaurant_id && order_ids.contains(&o.id)));
        Ok((before - orders.len()) as u64)
    }

    async fn list_table_orders(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<OpenOrder>, AppError> {
        self.simulate_latency().await;
        let orders = self.inner.orders.read().await;
        let mut matched: Vec<OpenOrder> = orders
            .iter()
            .filter(|o| selects(o, restaurant_id, predicate))
            .filter(|o| since.map_or(true, |s| o.created_at >= s))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl MenuCatalog for MemoryStore {
    async fn lookup_item(&self, item_reference: &str) -> Result<Option<MenuItem>, AppError> {
        if self.inner.fail_menu_reads.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "menu catalog unavailable"
            )));
        }
        Ok(self.inner.menu.read().await.get(item_reference).cloned())
    }
}

#[async_trait]
impl InvoiceArchive for MemoryStore {
    async fn save_invoice(&self, mut invoice: Invoice) -> Result<Invoice, AppError> {
        if self.inner.fail_invoice_writes.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "invoice archive unavailable"
            )));
        }
        invoice.id = Some(uuid::Uuid::new_v4().to_string());
        self.inner.invoices.write().await.push(invoice.clone());
        Ok(invoice)
    }

    async fn list_invoices(
        &self,
        restaurant_id: &str,
        limit: i64,
        offset: u64,
    ) -> Result<Vec<Invoice>, AppError> {
        let invoices = self.inner.invoices.read().await;
        let mut matched: Vec<Invoice> = invoices
            .iter()
            .filter(|i| i.restaurant_id == restaurant_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched
            .into_iter()
            .skip(offset as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}

#[async_trait]
impl ReconciliationQueue for MemoryStore {
    async fn enqueue(&self, task: &ReconciliationTask) -> Result<(), AppError> {
        self.inner.tasks.write().await.push(task.clone());
        Ok(())
    }

    async fn list_pending(&self, restaurant_id: &str) -> Result<Vec<ReconciliationTask>, AppError> {
        let tasks = self.inner.tasks.read().await;
        let mut pending: Vec<ReconciliationTask> = tasks
            .iter()
            .filter(|t| t.restaurant_id == restaurant_id && t.status == ReconciliationStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        Ok(pending)
    }

    async fn get(&self, task_id: &str) -> Result<Option<ReconciliationTask>, AppError> {
        let tasks = self.inner.tasks.read().await;
        Ok(tasks.iter().find(|t| t.task_id == task_id).cloned())
    }

    async fn mark_resolved(&self, task: &ReconciliationTask) -> Result<(), AppError> {
        let mut tasks = self.inner.tasks.write().await;
        match tasks.iter_mut().find(|t| t.task_id == task.task_id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(anyhow::anyhow!(
                "Reconciliation task not found: {}",
                task.task_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderLineItem, OrderStatus, TableIdentifier};
    use crate::services::identifier::IdentifierNormalizer;

    fn order(restaurant: &str, table: Option<&str>) -> OpenOrder {
        OpenOrder::new(
            restaurant,
            table.map(TableIdentifier::from),
            vec![OrderLineItem::new("burger", 1, None)],
            OrderStatus::Pending,
        )
    }

    #[tokio::test]
    async fn delete_only_touches_matching_restaurant_and_table() {
        let store = MemoryStore::new();
        store.insert_order(order("r1", Some("Table 5"))).await;
        store.insert_order(order("r1", Some("table 5 "))).await;
        store.insert_order(order("r1", Some("Table 6"))).await;
        store.insert_order(order("r2", Some("Table 5"))).await;

        let predicate = IdentifierNormalizer::default().normalize(Some("TABLE 5"));
        let deleted = store.delete_open_orders("r1", &predicate).await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(store.orders().await.len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_database_errors() {
        let store = MemoryStore::new();
        store.fail_order_deletes(true);
        let predicate = IdentifierNormalizer::default().normalize(Some("1"));
        let err = store.delete_open_orders("r1", &predicate).await.unwrap_err();
        assert_eq!(err.kind(), "persistence_failure");
    }

    #[tokio::test]
    async fn table_orders_are_newest_first_and_respect_since() {
        let store = MemoryStore::new();
        let mut old = order("r1", Some("2"));
        old.created_at = Utc::now() - chrono::Duration::days(2);
        let fresh = order("r1", Some("2"));
        store.insert_order(old.clone()).await;
        store.insert_order(fresh.clone()).await;

        let predicate = IdentifierNormalizer::default().normalize(Some("2"));
        let all = store.list_table_orders("r1", &predicate, None).await.unwrap();
        assert_eq!(all[0].id, fresh.id);
        assert_eq!(all[1].id, old.id);

        let since = Utc::now() - chrono::Duration::hours(1);
        let recent = store
            .list_table_orders("r1", &predicate, Some(since))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }
}
