//! HTTP handlers for settlement-service.

pub mod health;
pub mod history;
pub mod reconciliation;
pub mod settlement;

pub use health::{health_check, metrics, readiness_check};
pub use history::order_history;
pub use reconciliation::{list_reconciliation_tasks, resolve_reconciliation_task};
pub use settlement::{clear_table, preview_bill, settle_table, table_orders};
