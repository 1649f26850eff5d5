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

use crate::entities::{discount_code, DiscountScope, DiscountType};
use crate::services::discounts::{CreateDiscountCodeRequest, UpdateDiscountCodeRequest};
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery, PaginatedResponse};

/// Creates the router for discount code administration
pub fn discounts_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_discount_code))
        .route("/", get(list_discount_codes))
        .route("/validate", post(validate_discount_code))
        .route("/by-code/:code", get(get_discount_code_by_code))
        .route("/:id", get(get_discount_code))
        .route("/:id", put(update_discount_code))
        .route("/:id", delete(deactivate_discount_code))
        .route("/:id/stats", get(discount_code_statistics))
}

fn parse_discount_type(value: &str) -> Result<DiscountType, ServiceError> {
    match value.to_ascii_lowercase().as_str() {
        "percentage" => Ok(DiscountType::Percentage),
        "fixed_amount" => Ok(DiscountType::FixedAmount),
        "free_shipping" => Ok(DiscountType::FreeShipping),
        other => Err(ServiceError::ValidationError(format!(
            "Unknown discount type: {other}"
        ))),
    }
}

fn discount_type_str(discount_type: DiscountType) -> &'static str {
    match discount_type {
        DiscountType::Percentage => "percentage",
        DiscountType::FixedAmount => "fixed_amount",
        DiscountType::FreeShipping => "free_shipping",
    }
}

fn parse_scope(value: serde_json::Value) -> Result<DiscountScope, ServiceError> {
    serde_json::from_value(value)
        .map_err(|e| ServiceError::ValidationError(format!("Scope is not valid: {e}")))
}

// Discount code DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewDiscountCodeRequest {
    #[validate(length(min = 2, max = 64, message = "Code must be 2 to 64 characters"))]
    pub code: String,
    pub description: Option<String>,
    /// One of `percentage`, `fixed_amount`, `free_shipping`
    pub discount_type: String,
    /// Percent for percentage codes, money for fixed amounts
    pub value: Decimal,
    /// Tagged scope object, e.g. `{"type": "products", "ids": [...]}`.
    /// Omitted means every cart qualifies.
    pub applicable_to: Option<serde_json::Value>,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 1))]
    pub user_usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stackable: bool,
    #[validate(range(min = 0, max = 100))]
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate, ToSchema)]
pub struct PatchDiscountCodeRequest {
    pub description: Option<String>,
    pub value: Option<Decimal>,
    pub applicable_to: Option<serde_json::Value>,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 1))]
    pub user_usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub stackable: Option<bool>,
    #[validate(range(min = 0, max = 100))]
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct DiscountFilterQuery {
    /// When true only active codes are listed
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscountCodeResponse {
    pub id: Uuid,
    pub code: String,
    pub description: Option<String>,
    pub discount_type: String,
    pub value: Decimal,
    pub applicable_to: serde_json::Value,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub user_usage_limit: Option<i32>,
    pub usage_count: i32,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub stackable: bool,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn map_code(model: &discount_code::Model) -> DiscountCodeResponse {
    DiscountCodeResponse {
        id: model.id,
        code: model.code.clone(),
        description: model.description.clone(),
        discount_type: discount_type_str(model.discount_type).to_string(),
        value: model.value,
        applicable_to: model.applicable_to.clone(),
        minimum_order_amount: model.minimum_order_amount,
        maximum_discount: model.maximum_discount,
        usage_limit: model.usage_limit,
        user_usage_limit: model.user_usage_limit,
        usage_count: model.usage_count,
        starts_at: model.starts_at,
        expires_at: model.expires_at,
        is_active: model.is_active,
        stackable: model.stackable,
        priority: model.priority,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ValidateDiscountRequest {
    #[validate(length(min = 2, max = 64, message = "Code must be 2 to 64 characters"))]
    pub code: String,
    /// Cart the code would be applied to
    pub cart_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscountPreviewResponse {
    pub code: String,
    pub eligible: bool,
    pub amount_off: Decimal,
    pub free_shipping: bool,
    /// Shopper-facing explanation when the code does not qualify
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DiscountStatsResponse {
    pub discount_id: Uuid,
    pub code: String,
    pub redemption_count: u64,
    pub total_amount_applied: Decimal,
    /// Null when the code has no global limit
    pub remaining_uses: Option<i64>,
}

/// Create a discount code
#[utoipa::path(
    post,
    path = "/api/v1/discount-codes",
    summary = "Create discount code",
    request_body = NewDiscountCodeRequest,
    responses(
        (status = 201, description = "Code created", body = ApiResponse<DiscountCodeResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_discount_code(
    State(state): State<AppState>,
    Json(request): Json<NewDiscountCodeRequest>,
) -> Result<(StatusCode, Json<ApiResponse<DiscountCodeResponse>>), ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let discount_type = parse_discount_type(&request.discount_type)?;
    let applicable_to = request.applicable_to.map(parse_scope).transpose()?;

    let created = state
        .services
        .discounts
        .create_code(CreateDiscountCodeRequest {
            code: request.code,
            description: request.description,
            discount_type,
            value: request.value,
            applicable_to,
            minimum_order_amount: request.minimum_order_amount,
            maximum_discount: request.maximum_discount,
            usage_limit: request.usage_limit,
            user_usage_limit: request.user_usage_limit,
            starts_at: request.starts_at,
            expires_at: request.expires_at,
            stackable: request.stackable,
            priority: request.priority,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_code(&created))),
    ))
}

/// List discount codes
#[utoipa::path(
    get,
    path = "/api/v1/discount-codes",
    summary = "List discount codes",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("active" = Option<bool>, Query, description = "Only list active codes"),
    ),
    responses(
        (status = 200, description = "Codes retrieved", body = ApiResponse<PaginatedResponse<DiscountCodeResponse>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_discount_codes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<DiscountFilterQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<DiscountCodeResponse>>>, ServiceError> {
    let limit = query.limit.clamp(1, state.config.api_max_page_size as u64);
    let (codes, total) = state
        .services
        .discounts
        .list_codes(query.page, limit, filter.active)
        .await?;

    let items: Vec<DiscountCodeResponse> = codes.iter().map(map_code).collect();

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, query.page, limit,
    ))))
}

/// Get a discount code
#[utoipa::path(
    get,
    path = "/api/v1/discount-codes/{id}",
    summary = "Get discount code",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    responses(
        (status = 200, description = "Code retrieved", body = ApiResponse<DiscountCodeResponse>),
        (status = 404, description = "Code not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_discount_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DiscountCodeResponse>>, ServiceError> {
    let code = state
        .services
        .discounts
        .get_code(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", id)))?;

    Ok(Json(ApiResponse::success(map_code(&code))))
}

/// Update a discount code
#[utoipa::path(
    put,
    path = "/api/v1/discount-codes/{id}",
    summary = "Update discount code",
    description = "Update code fields; absent fields keep their value. The code string itself never changes.",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    request_body = PatchDiscountCodeRequest,
    responses(
        (status = 200, description = "Code updated", body = ApiResponse<DiscountCodeResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Code not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_discount_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<PatchDiscountCodeRequest>,
) -> Result<Json<ApiResponse<DiscountCodeResponse>>, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let applicable_to = request.applicable_to.map(parse_scope).transpose()?;
    let updated = state
        .services
        .discounts
        .update_code(
            id,
            UpdateDiscountCodeRequest {
                description: request.description,
                value: request.value,
                applicable_to,
                minimum_order_amount: request.minimum_order_amount,
                maximum_discount: request.maximum_discount,
                usage_limit: request.usage_limit,
                user_usage_limit: request.user_usage_limit,
                starts_at: request.starts_at,
                expires_at: request.expires_at,
                stackable: request.stackable,
                priority: request.priority,
                is_active: request.is_active,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(map_code(&updated))))
}

/// Deactivate a discount code
#[utoipa::path(
    delete,
    path = "/api/v1/discount-codes/{id}",
    summary = "Deactivate discount code",
    description = "Turn a code off. Carts holding it keep it attached but stop receiving \
                   the discount; deactivating an inactive code is a no-op.",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    responses(
        (status = 200, description = "Code deactivated", body = ApiResponse<DiscountCodeResponse>),
        (status = 404, description = "Code not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn deactivate_discount_code(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DiscountCodeResponse>>, ServiceError> {
    let updated = state.services.discounts.deactivate_code(id).await?;
    Ok(Json(ApiResponse::success(map_code(&updated))))
}

/// Get a discount code by its code string
#[utoipa::path(
    get,
    path = "/api/v1/discount-codes/by-code/{code}",
    summary = "Get discount code by code",
    params(("code" = String, Path, description = "Code string, matched case-insensitively")),
    responses(
        (status = 200, description = "Code retrieved", body = ApiResponse<DiscountCodeResponse>),
        (status = 404, description = "Code not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_discount_code_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<ApiResponse<DiscountCodeResponse>>, ServiceError> {
    let model = state
        .services
        .discounts
        .get_by_code(&code)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", code)))?;

    Ok(Json(ApiResponse::success(map_code(&model))))
}

/// Get redemption statistics for a discount code
#[utoipa::path(
    get,
    path = "/api/v1/discount-codes/{id}/stats",
    summary = "Get discount code statistics",
    description = "How often the code was redeemed, how much it has taken off in total and \
                   how many global uses remain.",
    params(("id" = Uuid, Path, description = "Discount code ID")),
    responses(
        (status = 200, description = "Statistics retrieved", body = ApiResponse<DiscountStatsResponse>),
        (status = 404, description = "Code not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn discount_code_statistics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<DiscountStatsResponse>>, ServiceError> {
    let stats = state.services.discounts.code_statistics(id).await?;

    Ok(Json(ApiResponse::success(DiscountStatsResponse {
        discount_id: stats.discount_id,
        code: stats.code,
        redemption_count: stats.redemption_count,
        total_amount_applied: stats.total_amount_applied,
        remaining_uses: stats.remaining_uses,
    })))
}

/// Preview a discount code against a cart
#[utoipa::path(
    post,
    path = "/api/v1/discount-codes/validate",
    summary = "Validate discount code against a cart",
    description = "Answers whether the code would qualify for the cart and what it would take \
                   off, without attaching it. Backs the storefront's apply-code box.",
    request_body = ValidateDiscountRequest,
    responses(
        (status = 200, description = "Preview computed", body = ApiResponse<DiscountPreviewResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart or code not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn validate_discount_code(
    State(state): State<AppState>,
    Json(request): Json<ValidateDiscountRequest>,
) -> Result<Json<ApiResponse<DiscountPreviewResponse>>, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let preview = state
        .services
        .carts
        .preview_discount(request.cart_id, &request.code)
        .await?;

    Ok(Json(ApiResponse::success(DiscountPreviewResponse {
        code: preview.code,
        eligible: preview.eligible,
        amount_off: preview.amount_off,
        free_shipping: preview.free_shipping,
        reason: preview.reason,
    })))
}
