//! Per-table settlement leases.
//!
//! Two cashiers clearing the same table at once must not both archive an
//! invoice. A lease is held from the first order read until the orders are
//! deleted; settlements of different tables never wait on each other.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::services::error::SettlementError;
use crate::services::identifier::MatchPredicate;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub restaurant_id: String,
    /// `#<n>` for numeric identifiers, otherwise the folded text key;
    /// `None` for orders without a table.
    pub table: Option<String>,
}

impl TableKey {
    /// Every spelling of one number (`5`, `05`, `5.0`) can match the same
    /// numerically stored order, so they share a key.
    pub fn new(restaurant_id: &str, predicate: &MatchPredicate) -> Self {
        let table = match predicate {
            // `+ 0.0` folds -0 into 0
            MatchPredicate::Named {
                numeric: Some(n), ..
            } => Some(format!("#{}", n + 0.0)),
            MatchPredicate::Named { key, .. } => Some(key.clone()),
            MatchPredicate::Missing { .. } => None,
        };
        Self {
            restaurant_id: restaurant_id.to_string(),
            table,
        }
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}/{}", self.restaurant_id, table),
            None => write!(f, "{}/<no table>", self.restaurant_id),
        }
    }
}

/// Lease capability. The in-process registry is enough for a single
/// replica; a distributed implementation can slot in behind this trait.
#[async_trait]
pub trait TableLocks: Send + Sync {
    async fn acquire(&self, key: &TableKey, wait: Duration) -> Result<TableLease, SettlementError>;
}

/// Held lease. Released on drop.
pub struct TableLease {
    guard: Option<OwnedMutexGuard<()>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl TableLease {
    fn new(guard: OwnedMutexGuard<()>, release: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            guard: Some(guard),
            release: Some(release),
        }
    }
}

impl Drop for TableLease {
    fn drop(&mut self) {
        // Unlock before pruning so the registry sees the final reference count.
        drop(self.guard.take());
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

#[derive(Clone, Default)]
pub struct InProcessTableLocks {
    slots: Arc<DashMap<TableKey, Arc<Mutex<()>>>>,
}

impl InProcessTableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables with a live lease or waiter.
    pub fn active(&self) -> usize {
        self.slots.len()
    }
}

#[async_trait]
impl TableLocks for InProcessTableLocks {
    async fn acquire(&self, key: &TableKey, wait: Duration) -> Result<TableLease, SettlementError> {
        // Clone the slot out so no map shard stays locked across the await.
        let slot = self
            .slots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = match tokio::time::timeout(wait, slot.clone().lock_owned()).await {
            Ok(guard) => guard,
            Err(_) => {
                drop(slot);
                prune(&self.slots, key);
                return Err(SettlementError::Busy(key.to_string()));
            }
        };
        drop(slot);

        let slots = Arc::clone(&self.slots);
        let key = key.clone();
        Ok(TableLease::new(
            guard,
            Box::new(move || prune(&slots, &key)),
        ))
    }
}

/// Drop the slot once nobody holds or waits on it.
fn prune(slots: &DashMap<TableKey, Arc<Mutex<()>>>, key: &TableKey) {
    slots.remove_if(key, |_, slot| Arc::strong_count(slot) == 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identifier::IdentifierNormalizer;

    fn key(table: &str) -> TableKey {
        TableKey::new("r1", &IdentifierNormalizer::default().normalize(Some(table)))
    }

    #[tokio::test]
    async fn second_acquire_times_out_while_held() {
        let locks = InProcessTableLocks::new();
        let _lease = locks.acquire(&key("5"), Duration::from_millis(50)).await.unwrap();

        let err = locks
            .acquire(&key(" 5 "), Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SettlementError::Busy(_)));
    }

    #[tokio::test]
    async fn different_tables_do_not_contend() {
        let locks = InProcessTableLocks::new();
        let _a = locks.acquire(&key("5"), Duration::from_millis(20)).await.unwrap();
        let _b = locks.acquire(&key("6"), Duration::from_millis(20)).await.unwrap();
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_lease_can_be_reacquired_and_is_pruned() {
        let locks = InProcessTableLocks::new();
        {
            let _lease = locks.acquire(&key("5"), Duration::from_millis(20)).await.unwrap();
        }
        assert_eq!(locks.active(), 0);
        let _again = locks.acquire(&key("5"), Duration::from_millis(20)).await.unwrap();
        assert_eq!(locks.active(), 1);
    }

    #[tokio::test]
    async fn waiter_gets_lease_after_release() {
        let locks = InProcessTableLocks::new();
        let lease = locks.acquire(&key("5"), Duration::from_millis(20)).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(&key("5"), Duration::from_secs(2)).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(lease);

        assert!(waiter.await.unwrap());
    }

    #[test]
    fn numeric_spellings_share_one_key() {
        assert_eq!(key("5"), key("05"));
        assert_eq!(key("5"), key("5.0"));
        assert_eq!(key("0"), key("-0"));
        assert_ne!(key("5"), key("Table 5"));
        assert_ne!(key("5"), key("5.5"));
    }

    #[tokio::test]
    async fn numeric_spellings_contend_for_one_lease() {
        let locks = InProcessTableLocks::new();
        let _lease = locks.acquire(&key("5"), Duration::from_millis(20)).await.unwrap();

        let err = locks
            .acquire(&key("05"), Duration::from_millis(20))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SettlementError::Busy(_)));
    }

    #[test]
    fn missing_tables_share_one_key() {
        let normalizer = IdentifierNormalizer::default();
        assert_eq!(
            TableKey::new("r1", &normalizer.normalize(None)),
            TableKey::new("r1", &normalizer.normalize(Some("N/A")))
        );
    }
}
