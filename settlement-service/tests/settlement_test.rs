//! HTTP tests for table settlement, bill preview and the table order view.

mod common;

use common::{dec, TestApp, TEST_RESTAURANT_ID};
use serde_json::{json, Value};
use settlement_service::models::{OrderLineItem, OrderStatus, TableIdentifier};

#[tokio::test]
async fn settle_table_archives_invoice_and_clears_orders() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;

    let response = app
        .client
        .post(app.table_url("5", "settle"))
        .json(&json!({ "taxRate": 5, "discountRate": 0, "additionalCharges": 20 }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Table 5 cleared and orders archived.");
    assert_eq!(body["finalTotal"], 335.0);
    assert_eq!(body["clearedOrders"], 2);
    assert_eq!(body["unresolvedItems"], 0);
    assert_eq!(body["invoice"]["subTotal"], 300.0);
    assert_eq!(body["invoice"]["taxAmount"], 15.0);
    assert_eq!(body["invoice"]["paymentMethod"], "Cash");
    assert_eq!(body["invoice"]["tableNumber"], "5");
    assert!(body["invoiceNumber"].as_str().unwrap().starts_with("INV-"));

    let remaining = app.store.orders().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].table_identifier, Some(TableIdentifier::from("6")));
    assert_eq!(app.store.invoices().await.len(), 1);
}

#[tokio::test]
async fn settle_without_body_uses_defaults() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;

    let response = app
        .client
        .post(app.table_url("6", "settle"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["finalTotal"], 80.0);
    assert_eq!(body["invoice"]["taxRate"], 0.0);
}

#[tokio::test]
async fn second_settlement_of_same_table_is_not_found() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;

    let first = app
        .client
        .post(app.table_url("5", "settle"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status().as_u16(), 200);

    let second = app
        .client
        .post(app.table_url("5", "settle"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 404);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["kind"], "not_found");
    assert_eq!(app.store.invoices().await.len(), 1);
}

#[tokio::test]
async fn concurrent_settlements_produce_one_invoice() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;

    let (a, b) = tokio::join!(
        app.client.post(app.table_url("5", "settle")).send(),
        app.client.post(app.table_url("5", "settle")).send(),
    );
    let mut statuses = vec![a.unwrap().status().as_u16(), b.unwrap().status().as_u16()];
    statuses.sort();

    assert_eq!(statuses, vec![200, 404]);
    assert_eq!(app.store.invoices().await.len(), 1);
}

#[tokio::test]
async fn free_text_table_identifier_is_matched_case_insensitively() {
    let app = TestApp::spawn().await;
    app.add_order(
        Some(TableIdentifier::from("Patio  2")),
        vec![OrderLineItem::new("lemonade", 3, Some(dec("40")))],
        OrderStatus::Delivered,
    )
    .await;

    let response = app
        .client
        .post(app.table_url("patio%202", "settle"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["finalTotal"], 120.0);
    assert_eq!(body["invoice"]["tableNumber"], "Patio  2");
    assert!(app.store.orders().await.is_empty());
}

#[tokio::test]
async fn encoded_percent_in_table_name_is_decoded_once() {
    let app = TestApp::spawn().await;
    app.add_order(
        Some(TableIdentifier::from("A%41")),
        vec![OrderLineItem::new("tea", 2, Some(dec("25")))],
        OrderStatus::Delivered,
    )
    .await;
    app.add_order(
        Some(TableIdentifier::from("AA")),
        vec![OrderLineItem::new("tea", 1, Some(dec("25")))],
        OrderStatus::Delivered,
    )
    .await;

    let response = app
        .client
        .post(app.table_url("A%2541", "settle"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["invoice"]["tableNumber"], "A%41");
    assert_eq!(body["finalTotal"], 50.0);

    let remaining = app.store.orders().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].table_identifier, Some(TableIdentifier::from("AA")));
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;

    let response = app
        .client
        .post(app.table_url("5", "settle"))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(app.store.orders().await.len(), 3);
}

#[tokio::test]
async fn legacy_clear_table_reads_restaurant_from_body() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;

    let response = app
        .client
        .post(app.url("/api/clearTable/5"))
        .json(&json!({
            "restaurantId": TEST_RESTAURANT_ID,
            "taxRate": "5",
            "additionalCharges": "20",
            "paymentMethod": "UPI"
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["finalTotal"], 335.0);
    assert_eq!(body["invoice"]["paymentMethod"], "UPI");
}

#[tokio::test]
async fn legacy_clear_table_without_restaurant_is_bad_request() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;

    let response = app
        .client
        .post(app.url("/api/clearTable/5"))
        .json(&json!({ "taxRate": 5 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "invalid_input");
    assert_eq!(app.store.orders().await.len(), 3);
}

#[tokio::test]
async fn bill_preview_leaves_orders_in_place() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;

    let response = app
        .client
        .get(app.table_url("5", "bill"))
        .query(&[("taxRate", "5"), ("additionalCharges", "20")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["invoice"]["finalTotal"], 335.0);
    assert!(body["invoice"].get("id").is_none());
    assert_eq!(body["contributingOrderIds"].as_array().unwrap().len(), 2);
    assert_eq!(body["lines"].as_array().unwrap().len(), 2);

    assert_eq!(app.store.orders().await.len(), 3);
    assert!(app.store.invoices().await.is_empty());
}

#[tokio::test]
async fn table_orders_lists_open_orders_of_one_table() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;

    let response = app
        .client
        .get(app.table_url("5", "orders"))
        .query(&[("today", "true")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["count"], 2);
    for order in body["orders"].as_array().unwrap() {
        assert_eq!(order["restaurantId"], TEST_RESTAURANT_ID);
    }
}

#[tokio::test]
async fn failed_order_cleanup_queues_reconciliation_task() {
    let app = TestApp::spawn().await;
    app.seed_dinner_service().await;
    app.store.fail_order_deletes(true);

    let response = app
        .client
        .post(app.table_url("5", "settle"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "persistence_failure");

    let invoices = app.store.invoices().await;
    assert_eq!(invoices.len(), 1);
    let invoice_number = invoices[0].invoice_number.clone();
    assert!(body["details"].as_str().unwrap().contains(&invoice_number));
    assert_eq!(app.store.orders().await.len(), 3);

    let tasks: Value = app
        .client
        .get(app.url(&format!("/api/restaurants/{}/reconciliation", TEST_RESTAURANT_ID)))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tasks["count"], 1);
    let task = &tasks["tasks"][0];
    assert_eq!(task["invoice_number"], invoice_number.as_str());
    assert_eq!(task["status"], "pending");
    assert_eq!(task["order_ids"].as_array().unwrap().len(), 2);

    app.store.fail_order_deletes(false);
    let resolved = app
        .client
        .post(app.url(&format!(
            "/api/restaurants/{}/reconciliation/{}/resolve",
            TEST_RESTAURANT_ID,
            task["task_id"].as_str().unwrap()
        )))
        .send()
        .await
        .unwrap();

    assert_eq!(resolved.status().as_u16(), 200);
    let resolved: Value = resolved.json().await.unwrap();
    assert_eq!(resolved["status"], "resolved");
    assert_eq!(resolved["deleted_count"], 2);
    assert_eq!(app.store.orders().await.len(), 1);
}

#[tokio::test]
async fn resolving_unknown_task_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url(&format!(
            "/api/restaurants/{}/reconciliation/does-not-exist/resolve",
            TEST_RESTAURANT_ID
        )))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 404);
}
