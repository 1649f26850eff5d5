use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::payment;
use crate::{errors::ServiceError, ApiResponse, AppState, ListQuery, PaginatedResponse};

/// Creates the router for payment endpoints.
///
/// Payments are created by checkout, never through this API; these
/// endpoints exist for lookups and the operator reconciliation worklist.
pub fn payments_routes() -> Router<AppState> {
    Router::new()
        .route("/reconciliation", get(list_reconciliation_worklist))
        .route("/:id", get(get_payment))
}

// Payment DTOs

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub cart_id: Uuid,
    /// Set once the payment is matched to an order
    pub order_id: Option<Uuid>,
    /// Gateway reference; present from the first gateway response on
    pub payment_intent_id: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn map_payment(model: &payment::Model) -> PaymentResponse {
    PaymentResponse {
        id: model.id,
        cart_id: model.cart_id,
        order_id: model.order_id,
        payment_intent_id: model.payment_intent_id.clone(),
        amount: model.amount,
        currency: model.currency.clone(),
        status: model.status.to_string(),
        failure_reason: model.failure_reason.clone(),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}

/// Get a payment
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    summary = "Get payment",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment retrieved", body = ApiResponse<PaymentResponse>),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ServiceError> {
    let payment = state
        .services
        .payments
        .get(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", id)))?;

    Ok(Json(ApiResponse::success(map_payment(&payment))))
}

/// List payments waiting on an operator
#[utoipa::path(
    get,
    path = "/api/v1/payments/reconciliation",
    summary = "Reconciliation worklist",
    description = "Captured charges whose order could not be created. Each needs a human \
                   to either recreate the order or refund the charge at the gateway; \
                   nothing here is retried automatically.",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
    ),
    responses(
        (status = 200, description = "Worklist retrieved", body = ApiResponse<PaginatedResponse<PaymentResponse>>),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_reconciliation_worklist(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<PaymentResponse>>>, ServiceError> {
    let limit = query.limit.clamp(1, state.config.api_max_page_size as u64);
    let (payments, total) = state
        .services
        .payments
        .list_needing_reconciliation(query.page, limit)
        .await?;

    let items: Vec<PaymentResponse> = payments.iter().map(map_payment).collect();

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, query.page, limit,
    ))))
}

#[cfg(test)]
mod tests {
    use crate::entities::PaymentStatus;

    #[test]
    fn payment_status_renders_snake_case() {
        assert_eq!(PaymentStatus::NeedsReconciliation.to_string(), "needs_reconciliation");
        assert_eq!(PaymentStatus::Captured.to_string(), "captured");
    }
}
