//! Integration tests for the checkout flow.
//!
//! Checkout is the only write path that talks to the payment gateway, so
//! these tests drive it end to end against a stub: totals on the happy
//! path, every rejection that must happen before the charge, and the
//! reconciliation path when order creation fails after a captured charge.

mod common;

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use common::{
    checkout_payload_to, fixed_code, free_shipping_code, money, ontario_address, percent_code,
    response_json, StubCharge, TestApp,
};
use rust_decimal_macros::dec;
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde_json::json;
use storefront_api::{
    entities::{
        discount_code, inventory_level, DiscountCode, InventoryLevel, Payment, PaymentStatus,
    },
    errors::ServiceError,
    services::discounts::CreateDiscountCodeRequest,
    services::payments::{ChargeRequest, GatewayCharge, GatewayChargeStatus, PaymentGateway},
};
use uuid::Uuid;

// ==================== Happy Path Tests ====================

#[tokio::test]
async fn percentage_code_checkout_produces_the_discounted_total() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("TEE-RED", dec!(40.00), 10).await;
    app.seed_code(percent_code("WELCOME20", dec!(20))).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 2).await;
    app.apply_code(cart_id, "WELCOME20").await;

    // Default payload ships to Ontario, which carries a 15% rate in the
    // test tax table
    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");

    let order = &body["data"]["order"];
    assert_eq!(money(&order["subtotal"]), dec!(80));
    assert_eq!(money(&order["discount_total"]), dec!(16));
    // 80.00 clears the free shipping threshold
    assert_eq!(money(&order["shipping_total"]), dec!(0));
    // Tax is charged on the undiscounted subtotal
    assert_eq!(money(&order["tax_total"]), dec!(12));
    assert_eq!(money(&order["total_amount"]), dec!(76));
    assert_eq!(order["currency"], "CAD");
    assert_eq!(order["status"], "confirmed");
    assert!(order["order_number"]
        .as_str()
        .expect("order number")
        .starts_with("ORD-"));
}

#[tokio::test]
async fn below_threshold_cart_pays_the_flat_shipping_fee() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("MUG-01", dec!(50.00), 5).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;

    // No tax table entry for US destinations
    let (status, body) = app
        .checkout_with(cart_id, checkout_payload_to("US", Some("NY")))
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");

    let order = &body["data"]["order"];
    assert_eq!(money(&order["subtotal"]), dec!(50));
    assert_eq!(money(&order["discount_total"]), dec!(0));
    assert_eq!(money(&order["shipping_total"]), dec!(9.99));
    assert_eq!(money(&order["tax_total"]), dec!(0));
    assert_eq!(money(&order["total_amount"]), dec!(59.99));
}

#[tokio::test]
async fn fixed_discount_is_capped_at_the_subtotal() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("PIN-01", dec!(20.00), 5).await;
    app.seed_code(fixed_code("THIRTY", dec!(30))).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;
    app.apply_code(cart_id, "THIRTY").await;

    let (status, body) = app
        .checkout_with(cart_id, checkout_payload_to("US", None))
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");

    let order = &body["data"]["order"];
    assert_eq!(money(&order["discount_total"]), dec!(20));
    // The items are free; the parcel is not
    assert_eq!(money(&order["total_amount"]), dec!(9.99));
}

#[tokio::test]
async fn successful_checkout_converts_the_cart_and_consumes_resources() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("BAG-01", dec!(100.00), 4).await;
    let code_id = app.seed_code(percent_code("TENOFF", dec!(10))).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 3).await;
    app.apply_code(cart_id, "TENOFF").await;

    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    let payment_id = body["data"]["payment_id"].as_str().expect("payment id");
    let order_id = body["data"]["order"]["id"].as_str().expect("order id");
    let order_number = body["data"]["order"]["order_number"]
        .as_str()
        .expect("order number");
    assert!(body["data"]["payment_intent_id"]
        .as_str()
        .expect("intent")
        .starts_with("pi_stub_"));

    // Cart is consumed
    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{cart_id}"), None)
        .await;
    let cart = response_json(response).await;
    assert_eq!(cart["data"]["status"], "converted");

    // Stock is reserved
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/variants/{variant_id}/inventory"),
            None,
        )
        .await;
    let level = response_json(response).await;
    assert_eq!(level["data"]["reserved"], 3);
    assert_eq!(level["data"]["available"], 1);

    // The code burned one use
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/discount-codes/{code_id}"),
            None,
        )
        .await;
    let code = response_json(response).await;
    assert_eq!(code["data"]["usage_count"], 1);

    // The payment is matched to the order
    let response = app
        .request(Method::GET, &format!("/api/v1/payments/{payment_id}"), None)
        .await;
    let payment = response_json(response).await;
    assert_eq!(payment["data"]["status"], "matched");
    assert_eq!(payment["data"]["order_id"].as_str(), Some(order_id));

    // And the order is findable by its number
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/by-number/{order_number}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(app.gateway.confirmations(), 1);
}

#[tokio::test]
async fn checkout_email_falls_back_to_the_cart_contact() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("CAP-01", dec!(18.00), 5).await;

    let cart_id = app
        .create_cart_with(json!({ "email": "cart-owner@example.com" }))
        .await;
    app.add_item(cart_id, variant_id, 1).await;

    let payload = json!({
        "payment_method": "pm_card_visa",
        "shipping_address": ontario_address(),
    });
    let (status, body) = app.checkout_with(cart_id, payload).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    assert_eq!(body["data"]["order"]["email"], "cart-owner@example.com");
}

#[tokio::test]
async fn free_shipping_code_waives_the_flat_fee() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("NOTE-01", dec!(30.00), 5).await;
    app.seed_code(free_shipping_code("SHIPFREE")).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;
    app.apply_code(cart_id, "SHIPFREE").await;

    let (status, body) = app
        .checkout_with(cart_id, checkout_payload_to("US", None))
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");

    let order = &body["data"]["order"];
    assert_eq!(money(&order["discount_total"]), dec!(0));
    assert_eq!(money(&order["shipping_total"]), dec!(0));
    assert_eq!(money(&order["total_amount"]), dec!(30));

    let applied = body["data"]["quote"]["applied_discounts"]
        .as_array()
        .expect("applied discounts");
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0]["free_shipping"], true);
    assert_eq!(money(&applied[0]["amount_off"]), dec!(0));
}

#[tokio::test]
async fn zero_total_checkout_still_runs_through_the_gateway() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("FLYER-01", dec!(0.00), 10).await;
    app.seed_code(free_shipping_code("SAMPLES")).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;
    app.apply_code(cart_id, "SAMPLES").await;

    let (status, body) = app
        .checkout_with(cart_id, checkout_payload_to("US", None))
        .await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    assert_eq!(money(&body["data"]["order"]["total_amount"]), dec!(0));
    // A zero amount still confirms through the gateway; skipping it would
    // skip the only authorization step
    assert_eq!(app.gateway.confirmations(), 1);
}

// ==================== Pre-Charge Rejection Tests ====================

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let app = TestApp::new().await;
    let cart_id = app.create_cart().await;

    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().expect("message").contains("empty"));
    assert_eq!(app.gateway.confirmations(), 0);

    // The failed attempt released the cart
    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{cart_id}"), None)
        .await;
    let cart = response_json(response).await;
    assert_eq!(cart["data"]["status"], "active");
}

#[tokio::test]
async fn checkout_without_any_email_is_rejected() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("KEY-01", dec!(9.00), 5).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;

    let payload = json!({ "payment_method": "pm_card_visa" });
    let (status, body) = app.checkout_with(cart_id, payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .expect("message")
        .to_lowercase()
        .contains("email"));
    assert_eq!(app.gateway.confirmations(), 0);
}

#[tokio::test]
async fn blank_payment_method_fails_validation_before_claiming_the_cart() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("PEN-01", dec!(5.00), 5).await;
    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;

    let payload = json!({
        "email": "shopper@example.com",
        "payment_method": "",
    });
    let (status, _) = app.checkout_with(cart_id, payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{cart_id}"), None)
        .await;
    let cart = response_json(response).await;
    assert_eq!(cart["data"]["status"], "active");
}

#[tokio::test]
async fn insufficient_stock_fails_before_the_charge() {
    let app = TestApp::new().await;
    let (product_id, variant_id) = app.seed_stocked_variant("LAMP-01", dec!(60.00), 1).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 3).await;

    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let details = body["details"].as_array().expect("per-line shortages");
    assert_eq!(details.len(), 1);
    assert_eq!(
        details[0]["variant_id"].as_str(),
        Some(variant_id.to_string().as_str())
    );
    assert_eq!(
        details[0]["product_id"].as_str(),
        Some(product_id.to_string().as_str())
    );
    assert_eq!(details[0]["requested"], 3);
    assert_eq!(details[0]["available"], 1);

    // The gateway was never asked for money
    assert_eq!(app.gateway.confirmations(), 0);
}

#[tokio::test]
async fn a_converted_cart_cannot_check_out_twice() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("DESK-01", dec!(200.00), 5).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;

    let (status, _) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("no longer active"));

    // Still exactly one order and one charge
    let response = app.request(Method::GET, "/api/v1/orders", None).await;
    let orders = response_json(response).await;
    assert_eq!(orders["data"]["total"], 1);
    assert_eq!(app.gateway.confirmations(), 1);
}

#[tokio::test]
async fn checkout_of_a_missing_cart_is_not_found() {
    let app = TestApp::new().await;
    let (status, body) = app.checkout(Uuid::new_v4()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
}

// ==================== Gateway Failure Tests ====================

#[tokio::test]
async fn declined_payment_returns_402_and_keeps_the_cart_open() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("HAT-01", dec!(25.00), 5).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;

    app.gateway.set_mode(StubCharge::Decline("card_declined"));
    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"], "Payment Required");
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("card_declined"));

    // Cart returns to shopping
    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{cart_id}"), None)
        .await;
    let cart = response_json(response).await;
    assert_eq!(cart["data"]["status"], "active");

    // No order was created
    let response = app.request(Method::GET, "/api/v1/orders", None).await;
    let orders = response_json(response).await;
    assert_eq!(orders["data"]["total"], 0);

    // The failed attempt left an audit row
    let payments = Payment::find().all(&*app.state.db).await.unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    assert_eq!(payments[0].failure_reason.as_deref(), Some("card_declined"));

    assert_eq!(app.gateway.confirmations(), 1);

    // A declined card is not a dead cart; the shopper can retry
    app.gateway.set_mode(StubCharge::Succeed);
    let (status, _) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn unreachable_gateway_maps_to_bad_gateway() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("SOCK-01", dec!(12.00), 5).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 2).await;

    app.gateway.set_mode(StubCharge::Unreachable);
    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "Bad Gateway");

    // Nothing was reserved and the cart is open again
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/variants/{variant_id}/inventory"),
            None,
        )
        .await;
    let level = response_json(response).await;
    assert_eq!(level["data"]["reserved"], 0);

    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{cart_id}"), None)
        .await;
    let cart = response_json(response).await;
    assert_eq!(cart["data"]["status"], "active");
}

// ==================== Reconciliation Tests ====================

/// Gateway that approves the charge and, before answering, burns the last
/// use of a discount code behind checkout's back. Order creation then hits
/// the usage guard inside its transaction, which is exactly the "money
/// taken, no order" situation the reconciliation worklist exists for.
#[derive(Default)]
struct LastUseBurningGateway {
    armed: StdMutex<Option<(Arc<DatabaseConnection>, Uuid)>>,
}

impl LastUseBurningGateway {
    fn arm(&self, db: Arc<DatabaseConnection>, discount_id: Uuid) {
        *self.armed.lock().unwrap() = Some((db, discount_id));
    }
}

#[async_trait]
impl PaymentGateway for LastUseBurningGateway {
    async fn confirm(&self, request: &ChargeRequest) -> Result<GatewayCharge, ServiceError> {
        let (db, discount_id) = self
            .armed
            .lock()
            .unwrap()
            .clone()
            .expect("gateway armed before checkout");

        DiscountCode::update_many()
            .col_expr(discount_code::Column::UsageCount, Expr::value(1))
            .filter(discount_code::Column::Id.eq(discount_id))
            .exec(&*db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(GatewayCharge {
            payment_intent_id: format!("pi_burned_{}", request.cart_id.simple()),
            status: GatewayChargeStatus::Succeeded,
            decline_reason: None,
        })
    }
}

#[tokio::test]
async fn order_creation_failure_after_capture_parks_the_payment() {
    let burner = Arc::new(LastUseBurningGateway::default());
    let app = TestApp::with_gateway(burner.clone()).await;

    let (_, variant_id) = app.seed_stocked_variant("RUG-01", dec!(80.00), 5).await;
    let code_id = app
        .seed_code(CreateDiscountCodeRequest {
            usage_limit: Some(1),
            ..percent_code("LASTONE", dec!(10))
        })
        .await;
    burner.arm(app.state.db.clone(), code_id);

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;
    app.apply_code(cart_id, "LASTONE").await;

    let (status, body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "body: {body}");

    // The shopper gets the payment reference to quote at support, and
    // nothing about what actually broke
    let message = body["message"].as_str().expect("message");
    assert!(message.contains("contact support"));
    assert!(message.contains("pi_burned_"));
    assert!(!message.contains("no longer available"));

    // The charge is parked for an operator, not refunded or retried
    let response = app
        .request(Method::GET, "/api/v1/payments/reconciliation", None)
        .await;
    let worklist = response_json(response).await;
    assert_eq!(worklist["data"]["total"], 1);
    let parked = &worklist["data"]["items"][0];
    assert_eq!(parked["status"], "needs_reconciliation");
    assert!(parked["payment_intent_id"]
        .as_str()
        .expect("intent")
        .starts_with("pi_burned_"));
    assert_eq!(
        parked["cart_id"].as_str(),
        Some(cart_id.to_string().as_str())
    );
    assert!(parked["order_id"].is_null());

    // No order row exists
    let response = app.request(Method::GET, "/api/v1/orders", None).await;
    let orders = response_json(response).await;
    assert_eq!(orders["data"]["total"], 0);

    // The cart is frozen mid-conversion rather than silently reopened
    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{cart_id}"), None)
        .await;
    let cart = response_json(response).await;
    assert_eq!(cart["data"]["status"], "converting");

    // The order transaction rolled its reservation back
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/products/variants/{variant_id}/inventory"),
            None,
        )
        .await;
    let level = response_json(response).await;
    assert_eq!(level["data"]["reserved"], 0);
}

/// A gateway that sells the cart's stock out from under the checkout
/// while confirming the charge. The pre-charge availability check passes,
/// the money is captured, and the order transaction then hits the
/// reservation guard.
#[derive(Default)]
struct StockDrainingGateway {
    armed: StdMutex<Option<(Arc<DatabaseConnection>, Uuid)>>,
}

impl StockDrainingGateway {
    fn arm(&self, db: Arc<DatabaseConnection>, variant_id: Uuid) {
        *self.armed.lock().unwrap() = Some((db, variant_id));
    }
}

#[async_trait]
impl PaymentGateway for StockDrainingGateway {
    async fn confirm(&self, request: &ChargeRequest) -> Result<GatewayCharge, ServiceError> {
        let (db, variant_id) = self
            .armed
            .lock()
            .unwrap()
            .clone()
            .expect("gateway armed before checkout");

        InventoryLevel::update_many()
            .col_expr(inventory_level::Column::OnHand, Expr::value(0))
            .filter(inventory_level::Column::VariantId.eq(variant_id))
            .exec(&*db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(GatewayCharge {
            payment_intent_id: format!("pi_drained_{}", request.cart_id.simple()),
            status: GatewayChargeStatus::Succeeded,
            decline_reason: None,
        })
    }
}

#[tokio::test]
async fn stock_drained_after_capture_surfaces_the_shortage_and_parks_the_payment() {
    let drainer = Arc::new(StockDrainingGateway::default());
    let app = TestApp::with_gateway(drainer.clone()).await;

    let (_, variant_id) = app.seed_stocked_variant("RUG-02", dec!(80.00), 3).await;
    drainer.arm(app.state.db.clone(), variant_id);

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 2).await;

    let (status, body) = app.checkout(cart_id).await;

    // The shopper is told to adjust the cart, not to call support
    assert_eq!(status, StatusCode::CONFLICT, "body: {body}");
    let message = body["message"].as_str().expect("message");
    assert!(message.contains("no longer available"));
    assert!(!message.contains("contact support"));

    // The per-line shortage detail survives the post-capture path
    let shortages = body["details"].as_array().expect("shortage list");
    assert_eq!(shortages.len(), 1);
    assert_eq!(
        shortages[0]["variant_id"].as_str(),
        Some(variant_id.to_string().as_str())
    );
    assert_eq!(shortages[0]["requested"], 2);
    assert_eq!(shortages[0]["available"], 0);

    // The captured charge still lands on the reconciliation worklist
    let response = app
        .request(Method::GET, "/api/v1/payments/reconciliation", None)
        .await;
    let worklist = response_json(response).await;
    assert_eq!(worklist["data"]["total"], 1);
    let parked = &worklist["data"]["items"][0];
    assert_eq!(parked["status"], "needs_reconciliation");
    assert!(parked["payment_intent_id"]
        .as_str()
        .expect("intent")
        .starts_with("pi_drained_"));

    // No order row exists
    let response = app.request(Method::GET, "/api/v1/orders", None).await;
    let orders = response_json(response).await;
    assert_eq!(orders["data"]["total"], 0);
}
