//! Shared harness for the integration suite.
//!
//! Each `TestApp` owns a fresh on-disk SQLite database inside a temp
//! directory, the full service graph wired to a stub payment gateway, and
//! a router identical to the served API minus the HTTP middleware layers.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use storefront_api::{
    config::AppConfig,
    db,
    entities::DiscountType,
    errors::ServiceError,
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        catalog::{CreateProductInput, CreateVariantInput},
        customers::CreateCustomerRequest,
        discounts::CreateDiscountCodeRequest,
        payments::{ChargeRequest, GatewayCharge, GatewayChargeStatus, PaymentGateway},
    },
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// What the stub gateway should do with the next confirmation.
#[derive(Debug, Clone, Copy)]
pub enum StubCharge {
    Succeed,
    Decline(&'static str),
    Unreachable,
}

/// In-process stand-in for the payment collaborator.
///
/// Defaults to approving every charge; flip the mode per test. The
/// confirmation counter makes "the gateway was never called" and "the
/// gateway was called exactly once" assertable.
pub struct StubGateway {
    mode: Mutex<StubCharge>,
    confirmations: AtomicUsize,
}

impl StubGateway {
    pub fn new() -> Self {
        Self {
            mode: Mutex::new(StubCharge::Succeed),
            confirmations: AtomicUsize::new(0),
        }
    }

    pub fn set_mode(&self, mode: StubCharge) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn confirmations(&self) -> usize {
        self.confirmations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn confirm(&self, request: &ChargeRequest) -> Result<GatewayCharge, ServiceError> {
        self.confirmations.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().unwrap();
        match mode {
            StubCharge::Succeed => Ok(GatewayCharge {
                payment_intent_id: format!("pi_stub_{}", request.cart_id.simple()),
                status: GatewayChargeStatus::Succeeded,
                decline_reason: None,
            }),
            StubCharge::Decline(reason) => Ok(GatewayCharge {
                payment_intent_id: format!("pi_stub_{}", request.cart_id.simple()),
                status: GatewayChargeStatus::Declined,
                decline_reason: Some(reason.to_string()),
            }),
            StubCharge::Unreachable => Err(ServiceError::ExternalServiceError(
                "payment gateway unreachable".to_string(),
            )),
        }
    }
}

/// Test application with fresh database state.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    /// The default stub gateway. Unused when the app was built with
    /// [`TestApp::with_gateway`].
    pub gateway: Arc<StubGateway>,
    _db_dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Build the app around a caller-supplied gateway, e.g. a wiremock
    /// client or a deliberately misbehaving implementation.
    pub async fn with_gateway(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self::build(Some(gateway)).await
    }

    async fn build(gateway_override: Option<Arc<dyn PaymentGateway>>) -> Self {
        let db_dir = TempDir::new().expect("temp dir for sqlite");
        let db_path = db_dir.path().join("storefront_test.db");

        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A few writer connections so concurrent checkouts in the suite
        // actually interleave
        cfg.db_max_connections = 5;
        cfg.db_min_connections = 1;
        cfg.tax.rates.insert("CA-ON".to_string(), 0.15);
        cfg.tax.rates.insert("CA".to_string(), 0.05);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("sqlite should connect");
        db::run_migrations(&pool).await.expect("migrations apply");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let stub = Arc::new(StubGateway::new());
        let gateway: Arc<dyn PaymentGateway> = match gateway_override {
            Some(custom) => custom,
            None => stub.clone(),
        };

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), &cfg, gateway);
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .nest(
                "/health",
                storefront_api::handlers::health::health_routes(),
            )
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway: stub,
            _db_dir: db_dir,
            _event_task: event_task,
        }
    }

    /// Send a request to the app. A `Some` body goes out as JSON.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> axum::response::Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).expect("request builds");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router handles request")
    }

    // ==================== Seed helpers (straight through the services) ====================

    /// Create an active product with one variant and return
    /// `(product_id, variant_id)`. No stock is set.
    pub async fn seed_variant(&self, sku: &str, price: Decimal) -> (Uuid, Uuid) {
        let product = self
            .state
            .services
            .catalog
            .create_product(CreateProductInput {
                name: format!("Product {sku}"),
                slug: format!("product-{}", sku.to_lowercase()),
                description: None,
                category_id: None,
                active: true,
            })
            .await
            .expect("product seeds");

        let variant = self
            .state
            .services
            .catalog
            .create_variant(
                product.id,
                CreateVariantInput {
                    sku: sku.to_string(),
                    name: format!("Variant {sku}"),
                    price,
                    position: 0,
                },
            )
            .await
            .expect("variant seeds");

        (product.id, variant.id)
    }

    pub async fn set_stock(&self, variant_id: Uuid, on_hand: i32) {
        self.state
            .services
            .inventory
            .set_level(variant_id, on_hand)
            .await
            .expect("stock seeds");
    }

    /// Variant plus stock in one call.
    pub async fn seed_stocked_variant(
        &self,
        sku: &str,
        price: Decimal,
        on_hand: i32,
    ) -> (Uuid, Uuid) {
        let ids = self.seed_variant(sku, price).await;
        self.set_stock(ids.1, on_hand).await;
        ids
    }

    pub async fn seed_code(&self, request: CreateDiscountCodeRequest) -> Uuid {
        self.state
            .services
            .discounts
            .create_code(request)
            .await
            .expect("code seeds")
            .id
    }

    pub async fn seed_customer(&self, email: &str) -> Uuid {
        self.state
            .services
            .customers
            .create_customer(CreateCustomerRequest {
                email: email.to_string(),
                first_name: "Test".to_string(),
                last_name: "Shopper".to_string(),
                phone: None,
                accepts_marketing: false,
            })
            .await
            .expect("customer seeds")
            .id
    }

    // ==================== Cart helpers (over the API) ====================

    /// Create an anonymous cart and return its id.
    pub async fn create_cart(&self) -> Uuid {
        self.create_cart_with(json!({})).await
    }

    pub async fn create_cart_with(&self, body: Value) -> Uuid {
        let response = self
            .request(Method::POST, "/api/v1/carts", Some(body))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = response_json(response).await;
        Uuid::parse_str(json["data"]["id"].as_str().expect("cart id"))
            .expect("cart id parses")
    }

    pub async fn add_item(&self, cart_id: Uuid, variant_id: Uuid, quantity: i32) {
        let response = self
            .request(
                Method::POST,
                &format!("/api/v1/carts/{cart_id}/items"),
                Some(json!({ "variant_id": variant_id, "quantity": quantity })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    pub async fn apply_code(&self, cart_id: Uuid, code: &str) {
        let response = self
            .request(
                Method::POST,
                &format!("/api/v1/carts/{cart_id}/discounts"),
                Some(json!({ "code": code })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    /// Check a cart out with the default payload; returns `(status, body)`.
    pub async fn checkout(&self, cart_id: Uuid) -> (StatusCode, Value) {
        self.checkout_with(cart_id, checkout_payload()).await
    }

    pub async fn checkout_with(&self, cart_id: Uuid, payload: Value) -> (StatusCode, Value) {
        let response = self
            .request(
                Method::POST,
                &format!("/api/v1/carts/{cart_id}/checkout"),
                Some(payload),
            )
            .await;
        let status = response.status();
        (status, response_json(response).await)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Read a response body as JSON. Empty bodies (204s) come back as `Null`.
pub async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body reads");
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is JSON")
    }
}

/// Parse a serialized money field into a `Decimal`.
///
/// SQLite does not keep decimal scale, so `40.00` can come back as `"40"`;
/// comparing as `Decimal` asserts the value without pinning the rendering.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("money string parses"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("money number parses"),
        other => panic!("not a money value: {other:?}"),
    }
}

/// Checkout payload with an email and an Ontario shipping address.
pub fn checkout_payload() -> Value {
    json!({
        "email": "shopper@example.com",
        "payment_method": "pm_card_visa",
        "shipping_address": ontario_address(),
    })
}

/// Checkout payload shipping to an arbitrary destination.
pub fn checkout_payload_to(country: &str, state: Option<&str>) -> Value {
    json!({
        "email": "shopper@example.com",
        "payment_method": "pm_card_visa",
        "shipping_address": {
            "line1": "100 Front St",
            "city": "Somewhere",
            "state": state,
            "postal_code": "00000",
            "country": country,
        },
    })
}

pub fn ontario_address() -> Value {
    json!({
        "line1": "100 Front St W",
        "city": "Toronto",
        "state": "ON",
        "postal_code": "M5J 1E3",
        "country": "CA",
    })
}

// ==================== Discount code builders ====================

/// A percentage code that is live now. Adjust fields per test.
pub fn percent_code(code: &str, value: Decimal) -> CreateDiscountCodeRequest {
    CreateDiscountCodeRequest {
        code: code.to_string(),
        description: None,
        discount_type: DiscountType::Percentage,
        value,
        applicable_to: None,
        minimum_order_amount: None,
        maximum_discount: None,
        usage_limit: None,
        user_usage_limit: None,
        starts_at: None,
        expires_at: None,
        stackable: false,
        priority: 0,
    }
}

pub fn fixed_code(code: &str, value: Decimal) -> CreateDiscountCodeRequest {
    CreateDiscountCodeRequest {
        discount_type: DiscountType::FixedAmount,
        ..percent_code(code, value)
    }
}

pub fn free_shipping_code(code: &str) -> CreateDiscountCodeRequest {
    CreateDiscountCodeRequest {
        discount_type: DiscountType::FreeShipping,
        ..percent_code(code, Decimal::ZERO)
    }
}
