//! MongoDB backend for settlement-service.
//!
//! Orders, menu items and invoices live in collections shared with the
//! ordering backend, so they are read and written as raw documents and
//! converted by hand: field types there drifted over time (table numbers
//! stored as strings or numbers, ids as ObjectIds or strings).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document},
    options::{FindOptions, IndexOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::str::FromStr;
use tracing::instrument;

use crate::models::{
    Invoice, InvoiceLineItem, MenuItem, OpenOrder, OrderLineItem, OrderStatus, ReconciliationStatus,
    ReconciliationTask, TableIdentifier,
};
use crate::services::identifier::MatchPredicate;
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::money::{to_decimal, to_f64};
use crate::services::store::{InvoiceArchive, MenuCatalog, OrderStore, ReconciliationQueue};

pub const ORDERS: &str = "orders";
pub const MENU_ITEMS: &str = "menuitems";
pub const ORDER_HISTORIES: &str = "orderhistories";
pub const RECONCILIATION_TASKS: &str = "reconciliation_tasks";

#[derive(Clone)]
pub struct SettlementDb {
    client: MongoClient,
    db: Database,
}

fn db_error(context: &str, e: impl std::fmt::Display) -> AppError {
    tracing::error!("{}: {}", context, e);
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

impl SettlementDb {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!("Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri)
            .await
            .map_err(|e| db_error("Failed to connect to MongoDB", e))?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for settlement-service");

        let indexes = [
            (
                ORDERS,
                doc! { "restaurantId": 1, "tableNumber": 1 },
                "restaurant_table_idx",
                false,
            ),
            (ORDERS, doc! { "createdAt": -1 }, "created_at_idx", false),
            (
                ORDER_HISTORIES,
                doc! { "restaurantId": 1, "timestamp": -1 },
                "restaurant_timestamp_idx",
                false,
            ),
            // Invoice numbers have one-second resolution; two tables settled
            // in the same second share a number, so this is not unique.
            (
                ORDER_HISTORIES,
                doc! { "invoiceNumber": 1 },
                "invoice_number_idx",
                false,
            ),
            (
                RECONCILIATION_TASKS,
                doc! { "task_id": 1 },
                "task_id_idx",
                true,
            ),
            (
                RECONCILIATION_TASKS,
                doc! { "restaurant_id": 1, "status": 1 },
                "restaurant_status_idx",
                false,
            ),
        ];

        for (collection, keys, name, unique) in indexes {
            let index = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(name.to_string())
                        .unique(unique)
                        .build(),
                )
                .build();

            self.db
                .collection::<Document>(collection)
                .create_index(index, None)
                .await
                .map_err(|e| db_error(&format!("Failed to create {} index", name), e))?;
        }

        tracing::info!("Successfully created all MongoDB indexes");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| db_error("MongoDB health check failed", e))?;
        Ok(())
    }

    fn orders(&self) -> Collection<Document> {
        self.db.collection(ORDERS)
    }

    fn menu_items(&self) -> Collection<Document> {
        self.db.collection(MENU_ITEMS)
    }

    fn order_histories(&self) -> Collection<Document> {
        self.db.collection(ORDER_HISTORIES)
    }

    fn reconciliation_tasks(&self) -> Collection<ReconciliationTask> {
        self.db.collection(RECONCILIATION_TASKS)
    }
}

#[async_trait]
impl OrderStore for SettlementDb {
    #[instrument(skip_all, fields(restaurant_id = %restaurant_id, table = %predicate))]
    async fn find_open_orders(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
    ) -> Result<Vec<OpenOrder>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_open_orders"])
            .start_timer();

        let options = FindOptions::builder().sort(doc! { "createdAt": 1 }).build();
        let documents: Vec<Document> = self
            .orders()
            .find(order_filter(restaurant_id, predicate), options)
            .await
            .map_err(|e| db_error("Failed to find open orders", e))?
            .try_collect()
            .await
            .map_err(|e| db_error("Failed to collect open orders", e))?;

        timer.observe_duration();

        documents.iter().map(order_from_document).collect()
    }

    #[instrument(skip_all, fields(restaurant_id = %restaurant_id, table = %predicate))]
    async fn delete_open_orders(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_open_orders"])
            .start_timer();

        let result = self
            .orders()
            .delete_many(order_filter(restaurant_id, predicate), None)
            .await
            .map_err(|e| db_error("Failed to delete open orders", e))?;

        timer.observe_duration();

        Ok(result.deleted_count)
    }

    #[instrument(skip_all, fields(restaurant_id = %restaurant_id, orders = order_ids.len()))]
    async fn delete_orders(&self, restaurant_id: &str, order_ids: &[String]) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_orders"])
            .start_timer();

        let ids: Vec<Bson> = order_ids.iter().map(|id| id_value(id)).collect();
        let filter = doc! {
            "$and": [
                restaurant_filter(restaurant_id),
                { "_id": { "$in": ids } },
            ]
        };

        let result = self
            .orders()
            .delete_many(filter, None)
            .await
            .map_err(|e| db_error("Failed to delete orders", e))?;

        timer.observe_duration();

        Ok(result.deleted_count)
    }

    #[instrument(skip_all, fields(restaurant_id = %restaurant_id, table = %predicate))]
    async fn list_table_orders(
        &self,
        restaurant_id: &str,
        predicate: &MatchPredicate,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<OpenOrder>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_table_orders"])
            .start_timer();

        let mut clauses = vec![
            Bson::Document(restaurant_filter(restaurant_id)),
            Bson::Document(predicate.to_filter()),
        ];
        if let Some(since) = since {
            clauses.push(Bson::Document(
                doc! { "createdAt": { "$gte": BsonDateTime::from_chrono(since) } },
            ));
        }

        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
        let documents: Vec<Document> = self
            .orders()
            .find(doc! { "$and": clauses }, options)
            .await
            .map_err(|e| db_error("Failed to list table orders", e))?
            .try_collect()
            .await
            .map_err(|e| db_error("Failed to collect table orders", e))?;

        timer.observe_duration();

        documents.iter().map(order_from_document).collect()
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.health_check().await
    }
}

#[async_trait]
impl MenuCatalog for SettlementDb {
    async fn lookup_item(&self, item_reference: &str) -> Result<Option<MenuItem>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lookup_item"])
            .start_timer();

        let document = self
            .menu_items()
            .find_one(doc! { "_id": id_value(item_reference) }, None)
            .await
            .map_err(|e| db_error("Failed to look up menu item", e))?;

        timer.observe_duration();

        Ok(document.map(|d| menu_item_from_document(&d)))
    }
}

#[async_trait]
impl InvoiceArchive for SettlementDb {
    #[instrument(skip_all, fields(invoice_number = %invoice.invoice_number))]
    async fn save_invoice(&self, mut invoice: Invoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_invoice"])
            .start_timer();

        let result = self
            .order_histories()
            .insert_one(invoice_to_document(&invoice), None)
            .await
            .map_err(|e| db_error("Failed to archive invoice", e))?;

        timer.observe_duration();

        invoice.id = Some(bson_id_string(&result.inserted_id));
        Ok(invoice)
    }

    #[instrument(skip_all, fields(restaurant_id = %restaurant_id))]
    async fn list_invoices(
        &self,
        restaurant_id: &str,
        limit: i64,
        offset: u64,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let options = FindOptions::builder()
            .sort(doc! { "timestamp": -1 })
            .limit(limit)
            .skip(offset)
            .build();

        let documents: Vec<Document> = self
            .order_histories()
            .find(restaurant_filter(restaurant_id), options)
            .await
            .map_err(|e| db_error("Failed to list invoices", e))?
            .try_collect()
            .await
            .map_err(|e| db_error("Failed to collect invoices", e))?;

        timer.observe_duration();

        Ok(documents.iter().map(invoice_from_document).collect())
    }
}

#[async_trait]
impl ReconciliationQueue for SettlementDb {
    async fn enqueue(&self, task: &ReconciliationTask) -> Result<(), AppError> {
        self.reconciliation_tasks()
            .insert_one(task, None)
            .await
            .map_err(|e| db_error("Failed to insert reconciliation task", e))?;
        Ok(())
    }

    async fn list_pending(&self, restaurant_id: &str) -> Result<Vec<ReconciliationTask>, AppError> {
        let options = FindOptions::builder().sort(doc! { "created_utc": -1 }).build();
        self.reconciliation_tasks()
            .find(
                doc! {
                    "restaurant_id": restaurant_id,
                    "status": ReconciliationStatus::Pending.to_string(),
                },
                options,
            )
            .await
            .map_err(|e| db_error("Failed to list reconciliation tasks", e))?
            .try_collect()
            .await
            .map_err(|e| db_error("Failed to collect reconciliation tasks", e))
    }

    async fn get(&self, task_id: &str) -> Result<Option<ReconciliationTask>, AppError> {
        self.reconciliation_tasks()
            .find_one(doc! { "task_id": task_id }, None)
            .await
            .map_err(|e| db_error("Failed to find reconciliation task", e))
    }

    async fn mark_resolved(&self, task: &ReconciliationTask) -> Result<(), AppError> {
        let mut set = doc! {
            "status": task.status.to_string(),
            "deleted_count": task.deleted_count.map(|n| n as i64),
        };
        if let Some(resolved) = task.resolved_utc {
            set.insert("resolved_utc", BsonDateTime::from_chrono(resolved));
        }

        let result = self
            .reconciliation_tasks()
            .update_one(doc! { "task_id": &task.task_id }, doc! { "$set": set }, None)
            .await
            .map_err(|e| db_error("Failed to update reconciliation task", e))?;

        if result.matched_count == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Reconciliation task not found: {}",
                task.task_id
            )));
        }
        Ok(())
    }
}

/// Ids written by the ordering backend are ObjectIds; fall back to the raw
/// string for anything else.
fn id_value(id: &str) -> Bson {
    match ObjectId::parse_str(id) {
        Ok(oid) => Bson::ObjectId(oid),
        Err(_) => Bson::String(id.to_string()),
    }
}

/// Match `restaurantId` whether it was stored as an ObjectId or a string.
fn restaurant_filter(restaurant_id: &str) -> Document {
    match ObjectId::parse_str(restaurant_id) {
        Ok(oid) => doc! { "restaurantId": { "$in": [oid, restaurant_id] } },
        Err(_) => doc! { "restaurantId": restaurant_id },
    }
}

fn order_filter(restaurant_id: &str, predicate: &MatchPredicate) -> Document {
    doc! { "$and": [restaurant_filter(restaurant_id), predicate.to_filter()] }
}

fn bson_id_string(value: &Bson) -> String {
    match value {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn bson_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(n) => Some(*n),
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bson_decimal(value: &Bson) -> Option<Decimal> {
    match value {
        Bson::String(s) => Decimal::from_str(s.trim()).ok(),
        other => bson_f64(other).filter(|n| n.is_finite()).map(to_decimal),
    }
}

fn decimal_field(doc: &Document, key: &str) -> Decimal {
    doc.get(key).and_then(bson_decimal).unwrap_or_default()
}

fn string_field(doc: &Document, key: &str) -> Option<String> {
    match doc.get(key)? {
        Bson::String(s) => Some(s.clone()),
        Bson::Null => None,
        other => Some(bson_id_string(other)),
    }
}

fn table_identifier(value: Option<&Bson>) -> Option<TableIdentifier> {
    match value? {
        Bson::String(s) => Some(TableIdentifier::Text(s.clone())),
        Bson::Null => None,
        other => bson_f64(other).map(TableIdentifier::Number),
    }
}

fn datetime_field(doc: &Document, key: &str) -> Option<DateTime<Utc>> {
    match doc.get(key)? {
        Bson::DateTime(dt) => Some(dt.to_chrono()),
        Bson::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

pub fn order_from_document(doc: &Document) -> Result<OpenOrder, AppError> {
    let id = doc
        .get("_id")
        .map(bson_id_string)
        .ok_or_else(|| AppError::DatabaseError(anyhow::anyhow!("Order document without _id")))?;

    let line_items = match doc.get("items") {
        Some(Bson::Array(items)) => items
            .iter()
            .filter_map(Bson::as_document)
            .map(|item| OrderLineItem {
                item_reference: string_field(item, "itemId").unwrap_or_default(),
                quantity: item
                    .get("quantity")
                    .and_then(bson_f64)
                    .filter(|q| q.is_finite() && *q > 0.0)
                    .map(|q| q.round() as u32)
                    .unwrap_or(0),
                unit_price: item.get("price").and_then(bson_decimal),
            })
            .collect(),
        _ => Vec::new(),
    };

    // Fall back to the ObjectId timestamp for documents without createdAt.
    let created_at = datetime_field(doc, "createdAt")
        .or_else(|| doc.get_object_id("_id").ok().map(|oid| oid.timestamp().to_chrono()))
        .unwrap_or_else(Utc::now);

    Ok(OpenOrder {
        id,
        restaurant_id: string_field(doc, "restaurantId").unwrap_or_default(),
        table_identifier: table_identifier(doc.get("tableNumber")),
        line_items,
        status: OrderStatus::from_string(
            string_field(doc, "status").as_deref().unwrap_or("pending"),
        ),
        created_at,
        customer_phone: string_field(doc, "wpno"),
        declared_total: doc.get("total").and_then(|total| match total {
            Bson::Null => None,
            Bson::String(s) => Some(s.clone()),
            other => bson_f64(other).map(|n| n.to_string()),
        }),
    })
}

fn menu_item_from_document(doc: &Document) -> MenuItem {
    MenuItem {
        id: doc.get("_id").map(bson_id_string).unwrap_or_default(),
        restaurant_id: string_field(doc, "restaurantId"),
        name: string_field(doc, "name").unwrap_or_default(),
        price: decimal_field(doc, "price"),
    }
}

pub fn invoice_to_document(invoice: &Invoice) -> Document {
    let items: Vec<Document> = invoice
        .line_items
        .iter()
        .map(|line| {
            doc! {
                "name": &line.name,
                "quantity": i64::from(line.quantity),
                "price": to_f64(line.unit_price),
                "billable": line.billable,
            }
        })
        .collect();

    doc! {
        "tableNumber": invoice.table_identifier.as_deref(),
        "restaurantId": id_value(&invoice.restaurant_id),
        "invoiceNumber": &invoice.invoice_number,
        "totalAmount": to_f64(invoice.total_amount),
        "orderItems": items,
        "subTotal": to_f64(invoice.sub_total),
        "taxRate": to_f64(invoice.tax_rate),
        "taxAmount": to_f64(invoice.tax_amount),
        "discountRate": to_f64(invoice.discount_rate),
        "discountAmount": to_f64(invoice.discount_amount),
        "additionalCharges": to_f64(invoice.additional_charges),
        "finalTotal": to_f64(invoice.final_total),
        "paymentMethod": &invoice.payment_method,
        "timestamp": BsonDateTime::from_chrono(invoice.timestamp),
        "orderCount": i64::from(invoice.order_count),
        "excludedOrderCount": i64::from(invoice.excluded_order_count),
    }
}

/// Older history documents predate the breakdown fields and the `billable`
/// flag; they read back as zero and billable respectively.
pub fn invoice_from_document(doc: &Document) -> Invoice {
    let line_items = match doc.get("orderItems") {
        Some(Bson::Array(items)) => items
            .iter()
            .filter_map(Bson::as_document)
            .map(|item| InvoiceLineItem {
                name: string_field(item, "name").unwrap_or_default(),
                quantity: item
                    .get("quantity")
                    .and_then(bson_f64)
                    .filter(|q| q.is_finite() && *q > 0.0)
                    .map(|q| q.round() as u32)
                    .unwrap_or(0),
                unit_price: decimal_field(item, "price"),
                billable: item.get_bool("billable").unwrap_or(true),
            })
            .collect(),
        _ => Vec::new(),
    };

    let count = |key: &str| {
        doc.get(key)
            .and_then(bson_f64)
            .filter(|n| *n >= 0.0)
            .map(|n| n as u32)
            .unwrap_or(0)
    };

    let total_amount = decimal_field(doc, "totalAmount");
    let final_total = doc
        .get("finalTotal")
        .and_then(bson_decimal)
        .unwrap_or(total_amount);

    Invoice {
        id: doc.get("_id").map(bson_id_string),
        restaurant_id: string_field(doc, "restaurantId").unwrap_or_default(),
        table_identifier: match doc.get("tableNumber") {
            Some(Bson::Null) | None => None,
            Some(other) => table_identifier(Some(other)).map(|t| t.to_string()),
        },
        invoice_number: string_field(doc, "invoiceNumber").unwrap_or_default(),
        line_items,
        sub_total: decimal_field(doc, "subTotal"),
        tax_rate: decimal_field(doc, "taxRate"),
        tax_amount: decimal_field(doc, "taxAmount"),
        discount_rate: decimal_field(doc, "discountRate"),
        discount_amount: decimal_field(doc, "discountAmount"),
        additional_charges: decimal_field(doc, "additionalCharges"),
        final_total,
        total_amount,
        payment_method: string_field(doc, "paymentMethod").unwrap_or_default(),
        timestamp: datetime_field(doc, "timestamp").unwrap_or_else(Utc::now),
        order_count: count("orderCount"),
        excluded_order_count: count("excludedOrderCount"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::identifier::IdentifierNormalizer;
    use chrono::TimeZone;

    fn d(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn reads_order_documents_written_by_the_ordering_backend() {
        let oid = ObjectId::new();
        let restaurant = ObjectId::new();
        let item = ObjectId::new();
        let created = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();

        let document = doc! {
            "_id": oid,
            "restaurantId": restaurant,
            "tableNumber": " Table 5",
            "items": [
                { "itemId": item, "quantity": 2, "price": 150.5 },
                { "itemId": "legacy", "quantity": 1.0 },
            ],
            "total": "301",
            "status": "Confirmed",
            "createdAt": BsonDateTime::from_chrono(created),
            "wpno": "919999999999",
        };

        let order = order_from_document(&document).unwrap();
        assert_eq!(order.id, oid.to_hex());
        assert_eq!(order.restaurant_id, restaurant.to_hex());
        assert_eq!(order.table_identifier, Some(TableIdentifier::from(" Table 5")));
        assert_eq!(order.line_items.len(), 2);
        assert_eq!(order.line_items[0].item_reference, item.to_hex());
        assert_eq!(order.line_items[0].quantity, 2);
        assert_eq!(order.line_items[0].unit_price, Some(d("150.5")));
        assert_eq!(order.line_items[1].unit_price, None);
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.created_at, created);
        assert_eq!(order.customer_phone.as_deref(), Some("919999999999"));
        assert_eq!(order.declared_total.as_deref(), Some("301"));
    }

    #[test]
    fn numeric_and_missing_table_numbers() {
        let numeric = order_from_document(&doc! { "_id": ObjectId::new(), "tableNumber": 7 }).unwrap();
        assert_eq!(numeric.table_identifier, Some(TableIdentifier::Number(7.0)));
        assert_eq!(numeric.status, OrderStatus::Pending);

        let missing = order_from_document(&doc! { "_id": ObjectId::new(), "tableNumber": Bson::Null })
            .unwrap();
        assert_eq!(missing.table_identifier, None);
    }

    #[test]
    fn order_without_id_is_rejected() {
        assert!(order_from_document(&doc! { "tableNumber": "1" }).is_err());
    }

    #[test]
    fn invoice_document_keeps_history_layout() {
        let restaurant = ObjectId::new();
        let invoice = Invoice {
            id: None,
            restaurant_id: restaurant.to_hex(),
            table_identifier: Some("5".to_string()),
            invoice_number: "INV-07032026210409".to_string(),
            line_items: vec![
                InvoiceLineItem {
                    name: "Burger".to_string(),
                    quantity: 2,
                    unit_price: d("150.00"),
                    billable: true,
                },
                InvoiceLineItem {
                    name: "Fries".to_string(),
                    quantity: 1,
                    unit_price: d("80.00"),
                    billable: false,
                },
            ],
            sub_total: d("300.00"),
            tax_rate: d("5"),
            tax_amount: d("15.00"),
            discount_rate: Decimal::ZERO,
            discount_amount: d("0.00"),
            additional_charges: d("20.00"),
            final_total: d("335.00"),
            total_amount: d("335.00"),
            payment_method: "Cash".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 7, 15, 34, 9).unwrap(),
            order_count: 2,
            excluded_order_count: 1,
        };

        let document = invoice_to_document(&invoice);
        assert_eq!(document.get_object_id("restaurantId").unwrap(), restaurant);
        assert_eq!(document.get_str("tableNumber").unwrap(), "5");
        assert_eq!(document.get_f64("finalTotal").unwrap(), 335.0);
        assert_eq!(document.get_f64("totalAmount").unwrap(), 335.0);
        let items = document.get_array("orderItems").unwrap();
        assert_eq!(items.len(), 2);
        assert!(!items[1].as_document().unwrap().get_bool("billable").unwrap());

        let mut stored = document.clone();
        stored.insert("_id", ObjectId::new());
        let read_back = invoice_from_document(&stored);
        assert_eq!(read_back.final_total, invoice.final_total);
        assert_eq!(read_back.line_items, invoice.line_items);
        assert_eq!(read_back.timestamp, invoice.timestamp);
        assert_eq!(read_back.excluded_order_count, 1);
    }

    #[test]
    fn legacy_history_documents_default_missing_fields() {
        let document = doc! {
            "_id": ObjectId::new(),
            "restaurantId": "r1",
            "tableNumber": "5",
            "invoiceNumber": "INV-01012025101010",
            "totalAmount": 450,
            "orderItems": [{ "name": "Thali", "quantity": 3, "price": 150 }],
            "timestamp": BsonDateTime::from_chrono(Utc::now()),
        };

        let invoice = invoice_from_document(&document);
        assert_eq!(invoice.final_total, d("450"));
        assert_eq!(invoice.sub_total, Decimal::ZERO);
        assert!(invoice.line_items[0].billable);
        assert_eq!(invoice.line_items[0].quantity, 3);
    }

    #[test]
    fn filters_scope_by_restaurant_in_either_id_form() {
        let restaurant = ObjectId::new();
        let predicate = IdentifierNormalizer::default().normalize(Some("5"));
        let filter = order_filter(&restaurant.to_hex(), &predicate);
        let clauses = filter.get_array("$and").unwrap();
        let restaurant_clause = clauses[0].as_document().unwrap();
        let alternatives = restaurant_clause
            .get_document("restaurantId")
            .unwrap()
            .get_array("$in")
            .unwrap();
        assert_eq!(alternatives[0], Bson::ObjectId(restaurant));
        assert_eq!(alternatives[1], Bson::String(restaurant.to_hex()));

        assert_eq!(
            restaurant_filter("not-an-oid"),
            doc! { "restaurantId": "not-an-oid" }
        );
    }
}
