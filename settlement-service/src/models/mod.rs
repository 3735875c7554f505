//! Domain models for settlement-service.

mod invoice;
mod menu_item;
mod order;
mod reconciliation;

pub use invoice::{Invoice, InvoiceLineItem};
pub use menu_item::MenuItem;
pub use order::{OpenOrder, OrderLineItem, OrderStatus, TableIdentifier};
pub use reconciliation::{ReconciliationStatus, ReconciliationTask};
