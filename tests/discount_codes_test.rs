//! Integration tests for discount code administration.
//!
//! Codes are created and managed by operators over the API; carts only
//! ever reference them. These tests cover the CRUD surface, input
//! validation, the scope payload round trip, per-code statistics, the
//! eligibility preview, and per-customer usage limits.

mod common;

use axum::http::{Method, StatusCode};
use common::{free_shipping_code, money, percent_code, response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use storefront_api::services::discounts::CreateDiscountCodeRequest;
use uuid::Uuid;

fn percentage_payload(code: &str, value: i32) -> Value {
    json!({
        "code": code,
        "discount_type": "percentage",
        "value": value,
    })
}

// ==================== Creation Tests ====================

#[tokio::test]
async fn created_codes_are_normalized_and_start_unused() {
    let app = TestApp::new().await;

    let payload = json!({
        "code": "summer25",
        "description": "Summer promotion",
        "discount_type": "percentage",
        "value": 25,
        "minimum_order_amount": 50,
        "maximum_discount": 40,
        "usage_limit": 500,
        "stackable": true,
        "priority": 80,
    });
    let response = app
        .request(Method::POST, "/api/v1/discount-codes", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let code = &body["data"];
    assert_eq!(code["code"], "SUMMER25");
    assert_eq!(code["discount_type"], "percentage");
    assert_eq!(code["usage_count"], 0);
    assert_eq!(code["is_active"], true);
    assert_eq!(code["stackable"], true);
    assert_eq!(code["priority"], 80);
    // Unscoped codes apply to every cart
    assert_eq!(code["applicable_to"]["type"], "all");
}

#[tokio::test]
async fn duplicate_codes_conflict() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes",
            Some(percentage_payload("TWICE", 10)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Same code modulo normalization
    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes",
            Some(percentage_payload("twice", 20)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn percentage_value_above_100_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes",
            Some(percentage_payload("TOOBIG", 150)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn fixed_amount_must_be_positive() {
    let app = TestApp::new().await;

    let payload = json!({
        "code": "FREEBIE",
        "discount_type": "fixed_amount",
        "value": 0,
    });
    let response = app
        .request(Method::POST, "/api/v1/discount-codes", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn usage_limit_zero_is_rejected() {
    let app = TestApp::new().await;

    let payload = json!({
        "code": "NOUSES",
        "discount_type": "percentage",
        "value": 10,
        "usage_limit": 0,
    });
    let response = app
        .request(Method::POST, "/api/v1/discount-codes", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn priority_above_100_is_rejected() {
    let app = TestApp::new().await;

    let payload = json!({
        "code": "LOUD",
        "discount_type": "percentage",
        "value": 10,
        "priority": 101,
    });
    let response = app
        .request(Method::POST, "/api/v1/discount-codes", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_discount_type_is_rejected() {
    let app = TestApp::new().await;

    let payload = json!({
        "code": "MYSTERY",
        "discount_type": "bogo",
        "value": 10,
    });
    let response = app
        .request(Method::POST, "/api/v1/discount-codes", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("Unknown discount type"));
}

#[tokio::test]
async fn code_format_is_validated() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes",
            Some(percentage_payload("BAD CODE!", 10)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ==================== Scope Tests ====================

#[tokio::test]
async fn scoped_code_round_trips_through_the_api() {
    let app = TestApp::new().await;
    let product_id = Uuid::new_v4();

    let payload = json!({
        "code": "SHOES10",
        "discount_type": "percentage",
        "value": 10,
        "applicable_to": { "type": "products", "ids": [product_id] },
    });
    let response = app
        .request(Method::POST, "/api/v1/discount-codes", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = response_json(response).await;
    let id = body["data"]["id"].as_str().expect("id");
    assert_eq!(body["data"]["applicable_to"]["type"], "products");

    let response = app
        .request(Method::GET, &format!("/api/v1/discount-codes/{id}"), None)
        .await;
    let body = response_json(response).await;
    let scope = &body["data"]["applicable_to"];
    assert_eq!(scope["type"], "products");
    assert_eq!(
        scope["ids"][0].as_str(),
        Some(product_id.to_string().as_str())
    );
}

#[tokio::test]
async fn untagged_scope_is_rejected() {
    let app = TestApp::new().await;

    let payload = json!({
        "code": "VAGUE",
        "discount_type": "percentage",
        "value": 10,
        "applicable_to": { "ids": [Uuid::new_v4()] },
    });
    let response = app
        .request(Method::POST, "/api/v1/discount-codes", Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("Scope is not valid"));
}

// ==================== Listing and Update Tests ====================

#[tokio::test]
async fn list_can_filter_to_active_codes() {
    let app = TestApp::new().await;

    for code in ["ALPHA", "BRAVO", "CHARLIE"] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/discount-codes",
                Some(percentage_payload(code, 10)),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    // Deactivate one
    let response = app.request(Method::GET, "/api/v1/discount-codes", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 3);
    let first_id = body["data"]["items"][0]["id"].as_str().expect("id").to_string();

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/discount-codes/{first_id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["is_active"], false);

    let response = app
        .request(Method::GET, "/api/v1/discount-codes?active=true", None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 2);

    let response = app.request(Method::GET, "/api/v1/discount-codes", None).await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 3);
}

#[tokio::test]
async fn update_changes_terms_but_never_the_code() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes",
            Some(percentage_payload("STEADY", 10)),
        )
        .await;
    let body = response_json(response).await;
    let id = body["data"]["id"].as_str().expect("id").to_string();

    let patch = json!({
        "value": 15,
        "stackable": true,
        "priority": 40,
        "usage_limit": 100,
    });
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/discount-codes/{id}"),
            Some(patch),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    let code = &body["data"];
    assert_eq!(code["code"], "STEADY");
    assert_eq!(money(&code["value"]), dec!(15));
    assert_eq!(code["stackable"], true);
    assert_eq!(code["priority"], 40);
    assert_eq!(code["usage_limit"], 100);
}

#[tokio::test]
async fn deactivated_code_can_no_longer_be_attached() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes",
            Some(percentage_payload("SUNSET", 10)),
        )
        .await;
    let body = response_json(response).await;
    let id = body["data"]["id"].as_str().expect("id").to_string();

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/discount-codes/{id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cart_id = app.create_cart().await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{cart_id}/discounts"),
            Some(json!({ "code": "SUNSET" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("not active"));
}

#[tokio::test]
async fn unknown_code_ids_are_not_found() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/discount-codes/{missing}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/discount-codes/{missing}"),
            Some(json!({ "value": 5 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/discount-codes/{missing}"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================== Lookup and Statistics Tests ====================

#[tokio::test]
async fn codes_are_findable_by_their_code_string() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes",
            Some(percentage_payload("FINDME", 10)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Lookup normalizes the same way attachment does
    let response = app
        .request(Method::GET, "/api/v1/discount-codes/by-code/findme", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["code"], "FINDME");
    assert_eq!(body["data"]["discount_type"], "percentage");

    let response = app
        .request(Method::GET, "/api/v1/discount-codes/by-code/NOSUCH", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn statistics_reflect_real_redemptions() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("STAT-01", dec!(100.00), 5).await;
    let code_id = app
        .seed_code(CreateDiscountCodeRequest {
            usage_limit: Some(5),
            ..percent_code("COUNTME", dec!(10))
        })
        .await;

    // Fresh code: nothing redeemed, the full allotment left
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/discount-codes/{code_id}/stats"),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["redemption_count"], 0);
    assert_eq!(money(&body["data"]["total_amount_applied"]), dec!(0));
    assert_eq!(body["data"]["remaining_uses"], 5);

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;
    app.apply_code(cart_id, "COUNTME").await;
    let (status, checkout_body) = app.checkout(cart_id).await;
    assert_eq!(status, StatusCode::CREATED, "body: {checkout_body}");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/discount-codes/{code_id}/stats"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["code"], "COUNTME");
    assert_eq!(body["data"]["redemption_count"], 1);
    assert_eq!(money(&body["data"]["total_amount_applied"]), dec!(10));
    assert_eq!(body["data"]["remaining_uses"], 4);

    // A code without a global limit has no remaining-uses figure
    let unlimited_id = app.seed_code(percent_code("NOLIMIT", dec!(5))).await;
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/discount-codes/{unlimited_id}/stats"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert!(body["data"]["remaining_uses"].is_null());

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/discount-codes/{}/stats", Uuid::new_v4()),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================== Eligibility Preview Tests ====================

#[tokio::test]
async fn validate_previews_a_code_without_attaching_it() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("PREV-01", dec!(60.00), 5).await;
    app.seed_code(percent_code("PREVIEW15", dec!(15))).await;
    app.seed_code(free_shipping_code("SHIPCHECK")).await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes/validate",
            Some(json!({ "code": "preview15", "cart_id": cart_id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["code"], "PREVIEW15");
    assert_eq!(body["data"]["eligible"], true);
    assert_eq!(money(&body["data"]["amount_off"]), dec!(9));
    assert_eq!(body["data"]["free_shipping"], false);
    assert!(body["data"]["reason"].is_null());

    // Free shipping codes take nothing off the items
    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes/validate",
            Some(json!({ "code": "SHIPCHECK", "cart_id": cart_id })),
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["eligible"], true);
    assert_eq!(money(&body["data"]["amount_off"]), dec!(0));
    assert_eq!(body["data"]["free_shipping"], true);

    // The preview attached nothing
    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{cart_id}"), None)
        .await;
    let cart = response_json(response).await;
    assert_eq!(cart["data"]["discounts"].as_array().expect("codes").len(), 0);
}

#[tokio::test]
async fn validate_reports_why_a_code_does_not_qualify() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("PREV-02", dec!(20.00), 5).await;
    app.seed_code(CreateDiscountCodeRequest {
        minimum_order_amount: Some(dec!(50)),
        ..percent_code("BIGSPEND", dec!(10))
    })
    .await;

    let cart_id = app.create_cart().await;
    app.add_item(cart_id, variant_id, 1).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes/validate",
            Some(json!({ "code": "BIGSPEND", "cart_id": cart_id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["eligible"], false);
    assert_eq!(money(&body["data"]["amount_off"]), dec!(0));
    assert!(body["data"]["reason"]
        .as_str()
        .expect("reason")
        .contains("below the minimum"));

    // Unknown codes are a lookup failure, not an ineligible preview
    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes/validate",
            Some(json!({ "code": "GHOST", "cart_id": cart_id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes/validate",
            Some(json!({ "code": "BIGSPEND", "cart_id": Uuid::new_v4() })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ==================== Per-Customer Limit Tests ====================

#[tokio::test]
async fn one_per_customer_codes_bind_to_the_account() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("ONCE-01", dec!(30.00), 10).await;
    let customer_id = app.seed_customer("regular@example.com").await;
    app.seed_code(CreateDiscountCodeRequest {
        user_usage_limit: Some(1),
        ..percent_code("ONEPER", dec!(10))
    })
    .await;

    let first_cart = app
        .create_cart_with(json!({ "customer_id": customer_id }))
        .await;
    app.add_item(first_cart, variant_id, 1).await;
    app.apply_code(first_cart, "ONEPER").await;
    let (status, body) = app.checkout(first_cart).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");

    // The same account cannot attach the code a second time
    let second_cart = app
        .create_cart_with(json!({ "customer_id": customer_id }))
        .await;
    app.add_item(second_cart, variant_id, 1).await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{second_cart}/discounts"),
            Some(json!({ "code": "ONEPER" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("already been used"));

    // A different account still qualifies
    let other_customer = app.seed_customer("someone-else@example.com").await;
    let other_cart = app
        .create_cart_with(json!({ "customer_id": other_customer }))
        .await;
    app.add_item(other_cart, variant_id, 1).await;
    app.apply_code(other_cart, "ONEPER").await;
}

#[tokio::test]
async fn one_per_customer_codes_count_guest_emails() {
    let app = TestApp::new().await;
    let (_, variant_id) = app.seed_stocked_variant("ONCE-02", dec!(45.00), 10).await;
    app.seed_code(CreateDiscountCodeRequest {
        user_usage_limit: Some(1),
        ..percent_code("ONCEEACH", dec!(10))
    })
    .await;

    // First guest checkout redeems under the payload email
    let first_cart = app.create_cart().await;
    app.add_item(first_cart, variant_id, 1).await;
    app.apply_code(first_cart, "ONCEEACH").await;
    let (status, body) = app.checkout(first_cart).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");

    // An anonymous cart has no identity yet, so the attach goes through;
    // checkout supplies the same email and is stopped before the charge
    let second_cart = app.create_cart().await;
    app.add_item(second_cart, variant_id, 1).await;
    app.apply_code(second_cart, "ONCEEACH").await;
    let (status, body) = app.checkout(second_cart).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .expect("message")
        .contains("already been used"));
    assert_eq!(app.gateway.confirmations(), 1);

    // The rejected cart went back to shopping
    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{second_cart}"), None)
        .await;
    let cart = response_json(response).await;
    assert_eq!(cart["data"]["status"], "active");

    // Re-casing the address does not mint a fresh identity; a cart that
    // carries the email is refused at attach time
    let recased_cart = app
        .create_cart_with(json!({ "email": "Shopper@Example.COM" }))
        .await;
    app.add_item(recased_cart, variant_id, 1).await;
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{recased_cart}/discounts"),
            Some(json!({ "code": "ONCEEACH" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The preview tells the same story instead of erroring
    let response = app
        .request(
            Method::POST,
            "/api/v1/discount-codes/validate",
            Some(json!({ "code": "ONCEEACH", "cart_id": recased_cart })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["eligible"], false);
    assert!(body["data"]["reason"]
        .as_str()
        .expect("reason")
        .contains("already been used"));
}
