use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::handlers::orders::{map_order, OrderResponse};
use crate::services::checkout::{Address, CheckoutRequest};
use crate::services::pricing::PriceQuote;
use crate::{errors::ServiceError, ApiResponse, AppState};

/// Creates the router for checkout; merged into the carts router
pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/:id/checkout", post(checkout_cart))
}

// Checkout DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutAddress {
    #[validate(length(min = 1, message = "Street line is required"))]
    pub line1: String,
    pub line2: Option<String>,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    /// Subdivision code, e.g. `ON`
    pub state: Option<String>,
    pub postal_code: String,
    #[validate(length(min = 2, max = 2, message = "Country must be a two-letter code"))]
    pub country: String,
}

impl From<CheckoutAddress> for Address {
    fn from(address: CheckoutAddress) -> Self {
        Address {
            line1: address.line1,
            line2: address.line2,
            city: address.city,
            state: address.state,
            postal_code: address.postal_code,
            country: address.country,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CheckoutPayload {
    /// Falls back to the cart's email, then the customer's
    #[validate(email)]
    pub email: Option<String>,
    /// Opaque payment method token from the gateway's client SDK
    #[validate(length(min = 1, message = "A payment method is required"))]
    pub payment_method: String,
    #[validate]
    pub shipping_address: Option<CheckoutAddress>,
    #[validate]
    pub billing_address: Option<CheckoutAddress>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub payment_id: Uuid,
    /// Gateway reference for the captured charge
    pub payment_intent_id: String,
    pub quote: PriceQuote,
}

/// Check a cart out
#[utoipa::path(
    post,
    path = "/api/v1/carts/{id}/checkout",
    summary = "Checkout",
    description = "Charge the cart's total and create the order. The payment is confirmed \
                   first; an order only ever exists for a captured charge. A declined card \
                   returns 402 and leaves the cart open.",
    params(("id" = Uuid, Path, description = "Cart ID")),
    request_body = CheckoutPayload,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<CheckoutResponse>),
        (status = 400, description = "Cart not open, empty, or request invalid", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment declined", body = crate::errors::ErrorResponse),
        (status = 409, description = "Checkout already running or stock conflict", body = crate::errors::ErrorResponse),
        (status = 500, description = "Payment captured but order creation failed; response references the payment", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unreachable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn checkout_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CheckoutPayload>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutResponse>>), ServiceError> {
    payload
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let request = CheckoutRequest {
        email: payload.email,
        payment_method: payload.payment_method,
        shipping_address: payload.shipping_address.map(Address::from),
        billing_address: payload.billing_address.map(Address::from),
        notes: payload.notes,
    };

    let outcome = state.services.checkout.checkout(id, request).await?;
    let details = state.services.orders.get_order(outcome.order.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CheckoutResponse {
            order: map_order(&details.order, &details.items),
            payment_id: outcome.payment_id,
            payment_intent_id: outcome.payment_intent_id,
            quote: outcome.quote,
        })),
    ))
}
