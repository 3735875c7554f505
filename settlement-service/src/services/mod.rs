//! Services module for settlement-service.

pub mod consolidation;
pub mod database;
pub mod error;
pub mod identifier;
pub mod lock;
pub mod memory;
pub mod metrics;
pub mod money;
pub mod settlement;
pub mod store;

pub use database::SettlementDb;
pub use error::SettlementError;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use settlement::{SettlementBackends, SettlementEngine, SettlementReceipt};
