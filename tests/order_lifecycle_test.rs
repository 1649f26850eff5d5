//! End-to-end tests for the order lifecycle.
//!
//! Orders are only ever born through checkout, which confirms them
//! before answering, so every order here starts at confirmed. From
//! there operators move them through fulfillment or cancel them; these
//! tests walk the status machine over the API and check the side
//! effects on inventory.

mod common;

use axum::http::{Method, StatusCode};
use common::{money, response_json, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

/// Place an order for `quantity` of a fresh variant and return the order
/// body from the checkout response.
async fn place_order(app: &TestApp, sku: &str, price: Decimal, quantity: i32) -> Value {
    let (_, variant_id) = app.seed_stocked_variant(sku, price, quantity + 10).await;
    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, quantity).await;
    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    body["data"]["order"].clone()
}

async fn set_status(app: &TestApp, order_id: &str, status: &str) -> (StatusCode, Value) {
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(json!({ "status": status })),
        )
        .await;
    let code = response.status();
    (code, response_json(response).await)
}

// ==================== Order Detail Tests ====================

#[tokio::test]
async fn order_lines_snapshot_the_catalog_at_purchase_time() {
    let app = TestApp::new().await;
    let (_, shirt) = app.seed_stocked_variant("SHIRT-L", dec!(35.00), 10).await;
    let (_, belt) = app.seed_stocked_variant("BELT-M", dec!(20.00), 10).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, shirt, 2).await;
    app.add_item(cart_id, belt, 1).await;
    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    let order_id = body["data"]["order"]["id"].as_str().expect("order id");

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{order_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = response_json(response).await["data"].clone();
    assert_eq!(order["email"], "shopper@example.com");
    assert!(order["placed_at"].is_string());

    let items = order["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    let shirt_line = items
        .iter()
        .find(|line| line["sku"] == "SHIRT-L")
        .expect("shirt line");
    assert_eq!(shirt_line["name"], "Variant SHIRT-L");
    assert_eq!(shirt_line["quantity"], 2);
    assert_eq!(money(&shirt_line["unit_price"]), dec!(35));
    assert_eq!(money(&shirt_line["line_total"]), dec!(70));
}

#[tokio::test]
async fn orders_can_be_fetched_by_number() {
    let app = TestApp::new().await;
    let order = place_order(&app, "BN-01", dec!(80.00), 1).await;
    let order_number = order["order_number"].as_str().expect("number");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/by-number/{order_number}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["id"], order["id"]);

    let response = app
        .request(Method::GET, "/api/v1/orders/by-number/ORD-DOESNOTEXIST", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================== Status Machine Tests ====================

#[tokio::test]
async fn orders_progress_through_fulfillment_to_delivered() {
    let app = TestApp::new().await;
    let order = place_order(&app, "FULFIL-01", dec!(45.00), 1).await;
    let order_id = order["id"].as_str().expect("id");
    assert_eq!(order["status"], "confirmed");

    for next in ["processing", "shipped", "delivered"] {
        let (status, body) = set_status(&app, order_id, next).await;
        assert_eq!(status, StatusCode::OK, "into {next}: {body}");
        assert_eq!(body["data"]["status"], next);
    }

    // Delivered is terminal
    let (status, _) = set_status(&app, order_id, "processing").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fulfillment_steps_cannot_be_skipped() {
    let app = TestApp::new().await;
    let order = place_order(&app, "SKIP-01", dec!(45.00), 1).await;
    let order_id = order["id"].as_str().expect("id");

    // Straight from confirmed to shipped skips processing
    let (status, body) = set_status(&app, order_id, "shipped").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().expect("message").contains("confirmed"));
}

#[tokio::test]
async fn unknown_status_values_are_rejected() {
    let app = TestApp::new().await;
    let order = place_order(&app, "WARP-01", dec!(45.00), 1).await;
    let order_id = order["id"].as_str().expect("id");

    let (status, _) = set_status(&app, order_id, "teleported").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_cannot_regress_to_pending() {
    let app = TestApp::new().await;
    let order = place_order(&app, "BACK-01", dec!(45.00), 1).await;
    let order_id = order["id"].as_str().expect("id");

    let (status, _) = set_status(&app, order_id, "pending").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ==================== Cancellation Tests ====================

#[tokio::test]
async fn cancelling_an_order_releases_its_reservation() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("CXL-01", dec!(25.00), 5).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 3).await;
    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    let order_id = body["data"]["order"]["id"].as_str().expect("id");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/variants/{variant_id}/inventory"),
            None,
        )
        .await;
    let level = response_json(response).await;
    assert_eq!(level["data"]["reserved"], 3);

    let response = app
        .request(Method::POST, &format!("/api/v1/orders/{order_id}/cancel"), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");

    // The reservation is gone
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/variants/{variant_id}/inventory"),
            None,
        )
        .await;
    let level = response_json(response).await;
    assert_eq!(level["data"]["reserved"], 0);
    assert_eq!(level["data"]["available"], 5);

    // Cancelled is terminal
    let response = app
        .request(Method::POST, &format!("/api/v1/orders/{order_id}/cancel"), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delivered_orders_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let order = place_order(&app, "DONE-01", dec!(45.00), 1).await;
    let order_id = order["id"].as_str().expect("id");

    for next in ["processing", "shipped", "delivered"] {
        let (status, _) = set_status(&app, order_id, next).await;
        assert_eq!(status, StatusCode::OK);
    }

    let response = app
        .request(Method::POST, &format!("/api/v1/orders/{order_id}/cancel"), None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ==================== Listing Tests ====================

#[tokio::test]
async fn orders_list_filters_by_status_and_customer() {
    let app = TestApp::new().await;
    let customer_id = app.seed_customer("buyer@example.com").await;

    // One order bound to the customer, one anonymous
    let (_, variant_id) = app.seed_stocked_variant("LIST-01", dec!(40.00), 20).await;
    let cart_id = app
        .create_cart_with(json!({ "customer_id": customer_id }))
        .await;
    app.add_item(cart_id, variant_id, 1).await;
    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    let customer_order_id = body["data"]["order"]["id"].as_str().expect("id").to_string();

    let anonymous = place_order(&app, "LIST-02", dec!(60.00), 1).await;
    let anonymous_id = anonymous["id"].as_str().expect("id");

    // Move the anonymous order forward so the statuses differ
    let (status, _) = set_status(&app, anonymous_id, "processing").await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .request(Method::GET, "/api/v1/orders?status=processing", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"].as_str(), Some(anonymous_id));

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders?customer_id={customer_id}"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(
        body["data"]["items"][0]["id"].as_str(),
        Some(customer_order_id.as_str())
    );

    let response = app
        .request(Method::GET, "/api/v1/orders?status=warehoused", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_list_newest_first_with_pagination() {
    let app = TestApp::new().await;

    let mut numbers = Vec::new();
    for sku in ["PAGE-01", "PAGE-02", "PAGE-03"] {
        let order = place_order(&app, sku, dec!(20.00), 1).await;
        numbers.push(order["order_number"].as_str().expect("number").to_string());
    }

    let response = app.request(Method::GET, "/api/v1/orders?limit=2", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 3);
    assert_eq!(body["data"]["total_pages"], 2);
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 2);
    // Most recent order first
    assert_eq!(
        items[0]["order_number"].as_str(),
        Some(numbers[2].as_str())
    );

    let response = app
        .request(Method::GET, "/api/v1/orders?limit=2&page=2", None)
        .await;
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().expect("items");
    assert_eq!(items.len(), 1);
    assert_eq!(
        items[0]["order_number"].as_str(),
        Some(numbers[0].as_str())
    );
}

#[tokio::test]
async fn unknown_order_ids_are_not_found() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();

    let response = app
        .request(Method::GET, &format!("/api/v1/orders/{missing}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let (status, _) = set_status(&app, &missing.to_string(), "processing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = app
        .request(Method::POST, &format!("/api/v1/orders/{missing}/cancel"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
