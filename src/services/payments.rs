use crate::{
    config::PaymentConfig,
    db::DbPool,
    entities::{payment, Payment, PaymentModel, PaymentStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Confirmation request sent to the payment collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    pub cart_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    /// Opaque payment method token the storefront client obtained from the
    /// gateway
    pub payment_method: String,
}

/// Gateway verdict on a confirmation attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCharge {
    pub payment_intent_id: String,
    pub status: GatewayChargeStatus,
    #[serde(default)]
    pub decline_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayChargeStatus {
    Succeeded,
    Declined,
}

/// Payment confirmation collaborator.
///
/// Only a [`GatewayChargeStatus::Succeeded`] outcome may be followed by
/// order creation. A transport or service failure is an error distinct
/// from a decline; the caller treats both as terminal for the attempt.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn confirm(&self, request: &ChargeRequest) -> Result<GatewayCharge, ServiceError>;
}

/// JSON-over-HTTP payment gateway client.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(config: &PaymentConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.confirm_timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::InternalError(format!("Failed to build payment client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(cart_id = %request.cart_id, amount = %request.amount))]
    async fn confirm(&self, request: &ChargeRequest) -> Result<GatewayCharge, ServiceError> {
        let url = format!("{}/v1/charges/confirm", self.base_url);

        let mut call = self.client.post(&url).json(request);
        if let Some(key) = &self.api_key {
            call = call.bearer_auth(key);
        }

        let response = call.send().await.map_err(|e| {
            error!(error = %e, "Payment confirmation call failed");
            ServiceError::ExternalServiceError(format!("payment service unreachable: {}", e))
        })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Payment service answered with an error status");
            return Err(ServiceError::ExternalServiceError(format!(
                "payment service returned {}",
                status
            )));
        }

        response.json::<GatewayCharge>().await.map_err(|e| {
            error!(error = %e, "Payment confirmation response did not parse");
            ServiceError::ExternalServiceError(format!("payment service response invalid: {}", e))
        })
    }
}

/// Manages payment rows through their lifecycle.
///
/// A row is written as `pending` before the gateway is called, so a
/// captured charge always has a local record even if everything after the
/// capture falls over.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl PaymentService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Writes the pending payment row ahead of the gateway call.
    #[instrument(skip(self), fields(cart_id = %cart_id, amount = %amount))]
    pub async fn create_pending(
        &self,
        cart_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentModel, ServiceError> {
        let now = Utc::now();
        let model = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart_id),
            order_id: Set(None),
            payment_intent_id: Set(None),
            amount: Set(amount),
            currency: Set(currency.to_string()),
            status: Set(PaymentStatus::Pending),
            failure_reason: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;
        info!(payment_id = %created.id, "Payment row created");
        Ok(created)
    }

    /// Records a successful capture reported by the gateway.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn record_capture(
        &self,
        payment_id: Uuid,
        payment_intent_id: &str,
    ) -> Result<PaymentModel, ServiceError> {
        let current = self.load(payment_id).await?;
        self.ensure_transition(&current, PaymentStatus::Captured)?;

        let cart_id = current.cart_id;
        let mut active: payment::ActiveModel = current.into();
        active.status = Set(PaymentStatus::Captured);
        active.payment_intent_id = Set(Some(payment_intent_id.to_string()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentConfirmed {
                payment_id,
                cart_id,
            })
            .await;

        info!(payment_intent_id = %payment_intent_id, "Payment captured");
        Ok(updated)
    }

    /// Records a decline or gateway failure for a pending payment.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn record_failure(
        &self,
        payment_id: Uuid,
        payment_intent_id: Option<&str>,
        reason: &str,
    ) -> Result<PaymentModel, ServiceError> {
        let current = self.load(payment_id).await?;
        self.ensure_transition(&current, PaymentStatus::Failed)?;

        let cart_id = current.cart_id;
        let mut active: payment::ActiveModel = current.into();
        active.status = Set(PaymentStatus::Failed);
        active.payment_intent_id = Set(payment_intent_id.map(str::to_string));
        active.failure_reason = Set(Some(reason.to_string()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentFailed {
                payment_id,
                cart_id,
                reason: reason.to_string(),
            })
            .await;

        warn!(reason = %reason, "Payment failed");
        Ok(updated)
    }

    /// Parks a captured payment for operator review after the order could
    /// not be created. Nothing is refunded or retried from here.
    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn park_for_reconciliation(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<PaymentModel, ServiceError> {
        let current = self.load(payment_id).await?;
        self.ensure_transition(&current, PaymentStatus::NeedsReconciliation)?;

        let cart_id = current.cart_id;
        let mut active: payment::ActiveModel = current.into();
        active.status = Set(PaymentStatus::NeedsReconciliation);
        active.failure_reason = Set(Some(reason.to_string()));
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::PaymentNeedsReconciliation {
                payment_id,
                cart_id,
                reason: reason.to_string(),
            })
            .await;

        error!(reason = %reason, "Payment parked for reconciliation");
        Ok(updated)
    }

    /// Links a payment to its order and settles it. Runs on the caller's
    /// connection so the link commits atomically with the order insert.
    pub async fn mark_matched<C: ConnectionTrait>(
        &self,
        conn: &C,
        payment_id: Uuid,
        order_id: Uuid,
    ) -> Result<PaymentModel, ServiceError> {
        let current = Payment::find_by_id(payment_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;
        self.ensure_transition(&current, PaymentStatus::Matched)?;

        let mut active: payment::ActiveModel = current.into();
        active.status = Set(PaymentStatus::Matched);
        active.order_id = Set(Some(order_id));
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn get(&self, payment_id: Uuid) -> Result<Option<PaymentModel>, ServiceError> {
        Ok(Payment::find_by_id(payment_id).one(&*self.db).await?)
    }

    /// Captured charges with no order, oldest first. This is the operator's
    /// worklist.
    #[instrument(skip(self))]
    pub async fn list_needing_reconciliation(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<PaymentModel>, u64), ServiceError> {
        let paginator = Payment::find()
            .filter(payment::Column::Status.eq(PaymentStatus::NeedsReconciliation))
            .order_by_asc(payment::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let payments = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((payments, total))
    }

    async fn load(&self, payment_id: Uuid) -> Result<PaymentModel, ServiceError> {
        Payment::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
    }

    fn ensure_transition(
        &self,
        current: &PaymentModel,
        next: PaymentStatus,
    ) -> Result<(), ServiceError> {
        if !current.status.can_transition_to(next) {
            return Err(ServiceError::InvalidStatus(format!(
                "Payment {} cannot move from {} to {}",
                current.id, current.status, next
            )));
        }
        Ok(())
    }
}
