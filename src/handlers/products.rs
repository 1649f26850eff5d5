use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{inventory_level, product, product_variant, ProductStatus};
use crate::services::catalog::{CreateProductInput, CreateVariantInput, UpdateProductInput};
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery, PaginatedResponse};

/// Creates the router for catalog endpoints
pub fn products_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .route("/:id", put(update_product))
        .route("/:id/variants", post(create_variant))
        .route("/variants/:variant_id", get(get_variant))
        .route("/variants/:variant_id/inventory", get(get_inventory_level))
        .route("/variants/:variant_id/inventory", put(set_inventory_level))
}

fn parse_product_status(value: &str) -> Result<ProductStatus, ServiceError> {
    match value.to_ascii_lowercase().as_str() {
        "draft" => Ok(ProductStatus::Draft),
        "active" => Ok(ProductStatus::Active),
        "archived" => Ok(ProductStatus::Archived),
        other => Err(ServiceError::InvalidStatus(format!(
            "Unknown product status: {other}"
        ))),
    }
}

fn product_status_str(status: ProductStatus) -> &'static str {
    match status {
        ProductStatus::Draft => "draft",
        ProductStatus::Active => "active",
        ProductStatus::Archived => "archived",
    }
}

// Catalog DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// URL-safe identifier, unique across the catalog
    #[validate(length(min = 1, max = 255))]
    pub slug: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    /// Created as a draft unless set
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    /// One of `draft`, `active`, `archived`
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateVariantRequest {
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub position: i32,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct SetInventoryLevelRequest {
    #[validate(range(min = 0, message = "Stock on hand cannot be negative"))]
    pub on_hand: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VariantResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub status: String,
    pub variants: Vec<VariantResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InventoryLevelResponse {
    pub variant_id: Uuid,
    pub on_hand: i32,
    pub reserved: i32,
    /// What a new order can still claim
    pub available: i32,
    pub updated_at: DateTime<Utc>,
}

fn map_variant(model: &product_variant::Model) -> VariantResponse {
    VariantResponse {
        id: model.id,
        product_id: model.product_id,
        sku: model.sku.clone(),
        name: model.name.clone(),
        price: model.price,
        position: model.position,
    }
}

fn map_product(model: &product::Model, variants: Option<&[product_variant::Model]>) -> ProductResponse {
    ProductResponse {
        id: model.id,
        name: model.name.clone(),
        slug: model.slug.clone(),
        description: model.description.clone(),
        category_id: model.category_id,
        status: product_status_str(model.status).to_string(),
        variants: variants
            .map(|models| models.iter().map(map_variant).collect())
            .unwrap_or_default(),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

fn map_inventory_level(model: &inventory_level::Model) -> InventoryLevelResponse {
    InventoryLevelResponse {
        variant_id: model.variant_id,
        on_hand: model.on_hand,
        reserved: model.reserved,
        available: model.on_hand - model.reserved,
        updated_at: model.updated_at,
    }
}

/// Create a new product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    summary = "Create product",
    description = "Create a new catalog product",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Slug already in use", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_product(
    State(state): State<AppState>,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<ProductResponse>>), ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let product = state
        .services
        .catalog
        .create_product(CreateProductInput {
            name: request.name,
            slug: request.slug,
            description: request.description,
            category_id: request.category_id,
            active: request.active,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_product(&product, None))),
    ))
}

/// List products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    summary = "List products",
    description = "Get a paginated list of products with optional status filtering",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("status" = Option<String>, Query, description = "Filter by product status"),
    ),
    responses(
        (status = 200, description = "Products retrieved", body = ApiResponse<PaginatedResponse<ProductResponse>>),
        (status = 400, description = "Invalid request parameters", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ProductFilterQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<ProductResponse>>>, ServiceError> {
    let status = filter
        .status
        .as_deref()
        .map(parse_product_status)
        .transpose()?;

    let limit = query.limit.clamp(1, state.config.api_max_page_size as u64);
    let (products, total) = state
        .services
        .catalog
        .list_products(query.page, limit, status)
        .await?;

    let items: Vec<ProductResponse> = products
        .iter()
        .map(|product| map_product(product, None))
        .collect();

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, query.page, limit,
    ))))
}

#[derive(Debug, Deserialize)]
pub struct ProductFilterQuery {
    pub status: Option<String>,
}

/// Get a product with its variants
#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    summary = "Get product",
    description = "Get a product and its sellable variants",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product retrieved", body = ApiResponse<ProductResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    let detail = state.services.catalog.get_product_with_variants(id).await?;
    Ok(Json(ApiResponse::success(map_product(
        &detail.product,
        Some(&detail.variants),
    ))))
}

/// Update a product
#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    summary = "Update product",
    description = "Update product fields; absent fields keep their value",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateProductRequest>,
) -> Result<Json<ApiResponse<ProductResponse>>, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let status = request.status.as_deref().map(parse_product_status).transpose()?;
    let product = state
        .services
        .catalog
        .update_product(
            id,
            UpdateProductInput {
                name: request.name,
                description: request.description,
                category_id: request.category_id,
                status,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(map_product(&product, None))))
}

/// Add a variant to a product
#[utoipa::path(
    post,
    path = "/api/v1/products/{id}/variants",
    summary = "Create variant",
    description = "Add a sellable variant to a product",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = CreateVariantRequest,
    responses(
        (status = 201, description = "Variant created", body = ApiResponse<VariantResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already in use", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_variant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<CreateVariantRequest>,
) -> Result<(StatusCode, Json<ApiResponse<VariantResponse>>), ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let variant = state
        .services
        .catalog
        .create_variant(
            id,
            CreateVariantInput {
                sku: request.sku,
                name: request.name,
                price: request.price,
                position: request.position,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_variant(&variant))),
    ))
}

/// Get a variant
#[utoipa::path(
    get,
    path = "/api/v1/products/variants/{variant_id}",
    summary = "Get variant",
    params(("variant_id" = Uuid, Path, description = "Variant ID")),
    responses(
        (status = 200, description = "Variant retrieved", body = ApiResponse<VariantResponse>),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_variant(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> Result<Json<ApiResponse<VariantResponse>>, ServiceError> {
    let variant = state.services.catalog.get_variant(variant_id).await?;
    Ok(Json(ApiResponse::success(map_variant(&variant))))
}

/// Get the stock level for a variant
#[utoipa::path(
    get,
    path = "/api/v1/products/variants/{variant_id}/inventory",
    summary = "Get inventory level",
    params(("variant_id" = Uuid, Path, description = "Variant ID")),
    responses(
        (status = 200, description = "Inventory level retrieved", body = ApiResponse<InventoryLevelResponse>),
        (status = 404, description = "No stock record for variant", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_inventory_level(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
) -> Result<Json<ApiResponse<InventoryLevelResponse>>, ServiceError> {
    let level = state
        .services
        .inventory
        .get_level(variant_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("No inventory record for variant {}", variant_id))
        })?;

    Ok(Json(ApiResponse::success(map_inventory_level(&level))))
}

/// Set the stock level for a variant
#[utoipa::path(
    put,
    path = "/api/v1/products/variants/{variant_id}/inventory",
    summary = "Set inventory level",
    description = "Set the on-hand stock count for a variant; reservations are untouched",
    params(("variant_id" = Uuid, Path, description = "Variant ID")),
    request_body = SetInventoryLevelRequest,
    responses(
        (status = 200, description = "Inventory level set", body = ApiResponse<InventoryLevelResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Variant not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn set_inventory_level(
    State(state): State<AppState>,
    Path(variant_id): Path<Uuid>,
    Json(request): Json<SetInventoryLevelRequest>,
) -> Result<Json<ApiResponse<InventoryLevelResponse>>, ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    // The variant must exist; stock records do not float free
    state.services.catalog.get_variant(variant_id).await?;

    let level = state
        .services
        .inventory
        .set_level(variant_id, request.on_hand)
        .await?;

    Ok(Json(ApiResponse::success(map_inventory_level(&level))))
}
