use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{cart, cart_discount, cart_item, CartStatus};
use crate::services::carts::{AddItemRequest, CreateCartRequest, UpdateItemQuantityRequest};
use crate::services::pricing::PriceQuote;
use crate::services::tax::Destination;
use crate::{errors::ServiceError, ApiResponse, AppState};

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_cart))
        .route("/:id", get(get_cart))
        .route("/:id/quote", get(quote_cart))
        .route("/:id/items", post(add_item))
        .route("/:id/items/:item_id", put(update_item))
        .route("/:id/items/:item_id", delete(remove_item))
        .route("/:id/clear", post(clear_cart))
        .route("/:id/discounts", post(apply_discount))
        .route("/:id/discounts/:discount_id", delete(remove_discount))
}

fn cart_status_str(status: CartStatus) -> &'static str {
    match status {
        CartStatus::Active => "active",
        CartStatus::Converting => "converting",
        CartStatus::Converted => "converted",
        CartStatus::Expired => "expired",
    }
}

// Cart DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewCartRequest {
    pub customer_id: Option<Uuid>,
    /// Contact address for guest carts
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddCartItemRequest {
    pub variant_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    /// Zero removes the line
    #[validate(range(min = 0))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ApplyDiscountRequest {
    #[validate(length(min = 1, message = "A discount code is required"))]
    pub code: String,
}

/// Optional tax destination for a quote
#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub country: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    /// Price captured when the line was added
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppliedCodeResponse {
    pub discount_id: Uuid,
    pub code: String,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartResponse {
    pub id: Uuid,
    pub customer_id: Option<Uuid>,
    pub email: Option<String>,
    pub currency: String,
    pub status: String,
    pub items: Vec<CartItemResponse>,
    pub discounts: Vec<AppliedCodeResponse>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A cart with its current price quote
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CartQuoteResponse {
    pub cart_id: Uuid,
    pub items: Vec<CartItemResponse>,
    pub quote: PriceQuote,
}

fn map_item(model: &cart_item::Model) -> CartItemResponse {
    CartItemResponse {
        id: model.id,
        product_id: model.product_id,
        variant_id: model.variant_id,
        quantity: model.quantity,
        unit_price: model.unit_price,
        line_total: model.unit_price * Decimal::from(model.quantity),
    }
}

fn map_cart(
    model: &cart::Model,
    items: &[cart_item::Model],
    discounts: &[cart_discount::Model],
) -> CartResponse {
    CartResponse {
        id: model.id,
        customer_id: model.customer_id,
        email: model.email.clone(),
        currency: model.currency.clone(),
        status: cart_status_str(model.status).to_string(),
        items: items.iter().map(map_item).collect(),
        discounts: discounts
            .iter()
            .map(|attached| AppliedCodeResponse {
                discount_id: attached.discount_id,
                code: attached.code.clone(),
                applied_at: attached.applied_at,
            })
            .collect(),
        expires_at: model.expires_at,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// Create a new cart
#[utoipa::path(
    post,
    path = "/api/v1/carts",
    summary = "Create cart",
    description = "Create an empty cart, optionally bound to a customer",
    request_body = NewCartRequest,
    responses(
        (status = 201, description = "Cart created", body = ApiResponse<CartResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_cart(
    State(state): State<AppState>,
    Json(request): Json<NewCartRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CartResponse>>), ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let cart = state
        .services
        .carts
        .create_cart(CreateCartRequest {
            customer_id: request.customer_id,
            email: request.email,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_cart(&cart, &[], &[]))),
    ))
}

/// Get a cart with its lines and attached codes
#[utoipa::path(
    get,
    path = "/api/v1/carts/{id}",
    summary = "Get cart",
    params(("id" = Uuid, Path, description = "Cart ID")),
    responses(
        (status = 200, description = "Cart retrieved", body = ApiResponse<CartResponse>),
        (status = 404, description = "Cart not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartResponse>>, ServiceError> {
    let detail = state.services.carts.get_cart(id).await?;
    Ok(Json(ApiResponse::success(map_cart(
        &detail.cart,
        &detail.items,
        &detail.discounts,
    ))))
}

/// Price a cart
#[utoipa::path(
    get,
    path = "/api/v1/carts/{id}/quote",
    summary = "Quote cart",
    description = "Price the cart with discounts, shipping and tax. Pass a destination \
                   for a tax-accurate quote; without one the tax line is zero.",
    params(
        ("id" = Uuid, Path, description = "Cart ID"),
        ("country" = Option<String>, Query, description = "Destination country code"),
        ("state" = Option<String>, Query, description = "Destination subdivision code"),
    ),
    responses(
        (status = 200, description = "Quote computed", body = ApiResponse<CartQuoteResponse>),
        (status = 404, description = "Cart not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn quote_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<ApiResponse<CartQuoteResponse>>, ServiceError> {
    let destination = query
        .country
        .map(|country| Destination::new(country, query.state));

    let priced = state
        .services
        .carts
        .price(id, destination.as_ref())
        .await?;

    Ok(Json(ApiResponse::success(CartQuoteResponse {
        cart_id: priced.cart.id,
        items: priced.items.iter().map(map_item).collect(),
        quote: priced.quote,
    })))
}

/// Add an item to a cart
#[utoipa::path(
    post,
    path = "/api/v1/carts/{id}/items",
    summary = "Add cart item",
    description = "Add a variant to the cart; an existing line for the same variant grows instead",
    params(("id" = Uuid, Path, description = "Cart ID")),
    request_body = AddCartItemRequest,
    responses(
        (status = 200, description = "Item added", body = ApiResponse<CartItemResponse>),
        (status = 400, description = "Cart not open or product not sellable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart or variant not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn add_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AddCartItemRequest>,
) -> Result<Json<ApiResponse<CartItemResponse>>, ServiceError> {
    let item = state
        .services
        .carts
        .add_item(
            id,
            AddItemRequest {
                variant_id: request.variant_id,
                quantity: request.quantity,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(map_item(&item))))
}

/// Change a line's quantity
#[utoipa::path(
    put,
    path = "/api/v1/carts/{id}/items/{item_id}",
    summary = "Update cart item",
    description = "Set a line's quantity; zero removes the line",
    params(
        ("id" = Uuid, Path, description = "Cart ID"),
        ("item_id" = Uuid, Path, description = "Cart line ID"),
    ),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Item updated; data is null when the line was removed", body = ApiResponse<CartItemResponse>),
        (status = 400, description = "Cart not open", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart or line not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateCartItemRequest>,
) -> Result<Json<ApiResponse<Option<CartItemResponse>>>, ServiceError> {
    let item = state
        .services
        .carts
        .update_item_quantity(
            id,
            item_id,
            UpdateItemQuantityRequest {
                quantity: request.quantity,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(
        item.as_ref().map(map_item),
    )))
}

/// Remove a line from a cart
#[utoipa::path(
    delete,
    path = "/api/v1/carts/{id}/items/{item_id}",
    summary = "Remove cart item",
    params(
        ("id" = Uuid, Path, description = "Cart ID"),
        ("item_id" = Uuid, Path, description = "Cart line ID"),
    ),
    responses(
        (status = 204, description = "Item removed"),
        (status = 400, description = "Cart not open", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart or line not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn remove_item(
    State(state): State<AppState>,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    state.services.carts.remove_item(id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Empty a cart
#[utoipa::path(
    post,
    path = "/api/v1/carts/{id}/clear",
    summary = "Clear cart",
    description = "Remove every line; attached discount codes stay on the cart",
    params(("id" = Uuid, Path, description = "Cart ID")),
    responses(
        (status = 200, description = "Cart cleared", body = ApiResponse<CartResponse>),
        (status = 400, description = "Cart not open", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn clear_cart(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartResponse>>, ServiceError> {
    state.services.carts.clear_cart(id).await?;
    let detail = state.services.carts.get_cart(id).await?;
    Ok(Json(ApiResponse::success(map_cart(
        &detail.cart,
        &detail.items,
        &detail.discounts,
    ))))
}

/// Apply a discount code to a cart
#[utoipa::path(
    post,
    path = "/api/v1/carts/{id}/discounts",
    summary = "Apply discount code",
    description = "Attach a live discount code to the cart. Whether it actually reduces \
                   the total is decided when the cart is priced.",
    params(("id" = Uuid, Path, description = "Cart ID")),
    request_body = ApplyDiscountRequest,
    responses(
        (status = 200, description = "Code attached", body = ApiResponse<AppliedCodeResponse>),
        (status = 400, description = "Code not live or cart not open", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart or code not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already applied", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn apply_discount(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ApplyDiscountRequest>,
) -> Result<Json<ApiResponse<AppliedCodeResponse>>, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let attached = state.services.carts.apply_discount(id, &request.code).await?;
    Ok(Json(ApiResponse::success(AppliedCodeResponse {
        discount_id: attached.discount_id,
        code: attached.code,
        applied_at: attached.applied_at,
    })))
}

/// Detach a discount code from a cart
#[utoipa::path(
    delete,
    path = "/api/v1/carts/{id}/discounts/{discount_id}",
    summary = "Remove discount code",
    params(
        ("id" = Uuid, Path, description = "Cart ID"),
        ("discount_id" = Uuid, Path, description = "Discount code ID"),
    ),
    responses(
        (status = 204, description = "Code removed"),
        (status = 400, description = "Cart not open", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart or code not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn remove_discount(
    State(state): State<AppState>,
    Path((id, discount_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, ServiceError> {
    state.services.carts.remove_discount(id, discount_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
