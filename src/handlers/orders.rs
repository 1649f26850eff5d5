use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{order, order_item, OrderStatus};
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery, PaginatedResponse};

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
        .route("/by-number/:order_number", get(get_order_by_number))
        .route("/:id/status", put(update_order_status))
        .route("/:id/cancel", post(cancel_order))
}

pub(crate) fn parse_order_status(value: &str) -> Result<OrderStatus, ServiceError> {
    OrderStatus::from_str(&value.to_ascii_lowercase())
        .map_err(|_| ServiceError::InvalidStatus(format!("Unknown order status: {value}")))
}

// Order DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    /// Target status, e.g. `processing` or `shipped`
    #[validate(length(min = 1))]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderFilterQuery {
    pub status: Option<String>,
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub email: String,
    pub status: String,
    pub currency: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub total_amount: Decimal,
    /// Payment that funded this order
    pub payment_id: Uuid,
    pub cart_id: Uuid,
    pub shipping_address: Option<serde_json::Value>,
    pub billing_address: Option<serde_json::Value>,
    pub notes: Option<String>,
    pub items: Vec<OrderItemResponse>,
    pub placed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn parse_stored_address(raw: Option<&str>) -> Option<serde_json::Value> {
    raw.and_then(|text| serde_json::from_str(text).ok())
}

pub(crate) fn map_order_item(model: &order_item::Model) -> OrderItemResponse {
    OrderItemResponse {
        id: model.id,
        product_id: model.product_id,
        variant_id: model.variant_id,
        sku: model.sku.clone(),
        name: model.name.clone(),
        quantity: model.quantity,
        unit_price: model.unit_price,
        line_total: model.line_total,
    }
}

pub(crate) fn map_order(model: &order::Model, items: &[order_item::Model]) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number.clone(),
        customer_id: model.customer_id,
        email: model.email.clone(),
        status: model.status.to_string(),
        currency: model.currency.clone(),
        subtotal: model.subtotal,
        discount_total: model.discount_total,
        shipping_total: model.shipping_total,
        tax_total: model.tax_total,
        total_amount: model.total_amount,
        payment_id: model.payment_id,
        cart_id: model.cart_id,
        shipping_address: parse_stored_address(model.shipping_address.as_deref()),
        billing_address: parse_stored_address(model.billing_address.as_deref()),
        notes: model.notes.clone(),
        items: items.iter().map(map_order_item).collect(),
        placed_at: model.placed_at,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// List orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Get a paginated list of orders with optional filtering",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
        ("customer_id" = Option<Uuid>, Query, description = "Filter by customer ID"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<PaginatedResponse<OrderResponse>>),
        (status = 400, description = "Invalid request parameters", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<OrderFilterQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<OrderResponse>>>, ServiceError> {
    let status = filter
        .status
        .as_deref()
        .map(parse_order_status)
        .transpose()?;

    let limit = query.limit.clamp(1, state.config.api_max_page_size as u64);
    let (orders, total) = state
        .services
        .orders
        .list_orders(query.page, limit, status, filter.customer_id)
        .await?;

    let items: Vec<OrderResponse> = orders.iter().map(|order| map_order(order, &[])).collect();

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, query.page, limit,
    ))))
}

/// Get an order
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let details = state.services.orders.get_order(id).await?;
    Ok(Json(ApiResponse::success(map_order(
        &details.order,
        &details.items,
    ))))
}

/// Get an order by its customer-facing number
#[utoipa::path(
    get,
    path = "/api/v1/orders/by-number/{order_number}",
    summary = "Get order by number",
    params(("order_number" = String, Path, description = "Order number, e.g. ORD-1A2B3C4D")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_order_by_number(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let details = state.services.orders.get_by_number(&order_number).await?;
    Ok(Json(ApiResponse::success(map_order(
        &details.order,
        &details.items,
    ))))
}

/// Move an order along its lifecycle
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    summary = "Update order status",
    description = "Advance the order to a new status; illegal transitions are rejected",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Unknown status or illegal transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order changed concurrently", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let status = parse_order_status(&request.status)?;
    let order = state.services.orders.update_status(id, status).await?;
    Ok(Json(ApiResponse::success(map_order(&order, &[]))))
}

/// Cancel an order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    summary = "Cancel order",
    description = "Cancel an order that has not shipped and release its reserved stock",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order is past the point of cancellation", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.cancel_order(id).await?;
    Ok(Json(ApiResponse::success(map_order(&order, &[]))))
}
