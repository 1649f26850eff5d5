use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{customer, CustomerStatus};
use crate::services::customers::CreateCustomerRequest;
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery, PaginatedResponse};

/// Creates the router for customer endpoints
pub fn customers_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_customer))
        .route("/", get(list_customers))
        .route("/:id", get(get_customer))
}

fn customer_status_str(status: CustomerStatus) -> &'static str {
    match status {
        CustomerStatus::Active => "active",
        CustomerStatus::Inactive => "inactive",
    }
}

// Customer DTOs

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewCustomerRequest {
    #[validate(email(message = "Email address is not valid"))]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub accepts_marketing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub accepts_marketing: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

fn map_customer(model: &customer::Model) -> CustomerResponse {
    CustomerResponse {
        id: model.id,
        email: model.email.clone(),
        first_name: model.first_name.clone(),
        last_name: model.last_name.clone(),
        phone: model.phone.clone(),
        accepts_marketing: model.accepts_marketing,
        status: customer_status_str(model.status).to_string(),
        created_at: model.created_at,
    }
}

/// Register a customer
#[utoipa::path(
    post,
    path = "/api/v1/customers",
    summary = "Create customer",
    request_body = NewCustomerRequest,
    responses(
        (status = 201, description = "Customer created", body = ApiResponse<CustomerResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_customer(
    State(state): State<AppState>,
    Json(request): Json<NewCustomerRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CustomerResponse>>), ServiceError> {
    request
        .validate()
        .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

    let created = state
        .services
        .customers
        .create_customer(CreateCustomerRequest {
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
            phone: request.phone,
            accepts_marketing: request.accepts_marketing,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_customer(&created))),
    ))
}

/// List customers
#[utoipa::path(
    get,
    path = "/api/v1/customers",
    summary = "List customers",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Customers retrieved", body = ApiResponse<PaginatedResponse<CustomerResponse>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_customers(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<CustomerResponse>>>, ServiceError> {
    let limit = query.limit.clamp(1, state.config.api_max_page_size as u64);
    let (customers, total) = state
        .services
        .customers
        .list_customers(query.page, limit)
        .await?;

    let items: Vec<CustomerResponse> = customers.iter().map(map_customer).collect();

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, query.page, limit,
    ))))
}

/// Get a customer
#[utoipa::path(
    get,
    path = "/api/v1/customers/{id}",
    summary = "Get customer",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer retrieved", body = ApiResponse<CustomerResponse>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CustomerResponse>>, ServiceError> {
    let customer = state.services.customers.get_customer(id).await?;
    Ok(Json(ApiResponse::success(map_customer(&customer))))
}
