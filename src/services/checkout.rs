use crate::{
    db::DbPool,
    entities::{
        cart, cart_item, Cart, CartModel, CartStatus, Customer, OrderModel, OrderStatus,
        ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        carts::{ensure_open, CartService, PricedCart},
        discounts::DiscountService,
        inventory::{InventoryService, ReservationLine},
        orders::{NewOrder, NewOrderLine, OrderService},
        payments::{ChargeRequest, GatewayChargeStatus, PaymentGateway, PaymentService},
        pricing::PriceQuote,
        tax::Destination,
    },
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Postal address collected at checkout
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Address {
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

impl Address {
    pub fn destination(&self) -> Destination {
        Destination::new(self.country.clone(), self.state.clone())
    }

    fn to_stored_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutRequest {
    /// Falls back to the cart's email, then the customer's
    #[validate(email(message = "Email address is not valid"))]
    pub email: Option<String>,
    /// Opaque payment method token from the gateway's client SDK
    #[validate(length(min = 1, message = "A payment method is required"))]
    pub payment_method: String,
    #[validate]
    pub shipping_address: Option<Address>,
    #[validate]
    pub billing_address: Option<Address>,
    pub notes: Option<String>,
}

/// What the customer gets back from a completed checkout
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutOutcome {
    pub order: OrderModel,
    pub payment_id: Uuid,
    pub payment_intent_id: String,
    pub quote: PriceQuote,
}

/// Converts a cart into an order, strictly payment first.
///
/// The charge is confirmed before any order row exists. If the order
/// cannot be written afterwards, the captured payment is parked for
/// operator reconciliation; nothing is refunded or retried automatically.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    carts: CartService,
    discounts: DiscountService,
    inventory: InventoryService,
    orders: OrderService,
    payments: PaymentService,
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        carts: CartService,
        discounts: DiscountService,
        inventory: InventoryService,
        orders: OrderService,
        payments: PaymentService,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            db,
            event_sender,
            carts,
            discounts,
            inventory,
            orders,
            payments,
            gateway,
        }
    }

    /// Runs the whole checkout for a cart.
    ///
    /// Everything that can fail cheaply fails before the gateway is
    /// called: the cart must be open and non-empty, attached codes must
    /// still be within their per-customer allowance, and stock must look
    /// sufficient. Only then is the payment confirmed, and only after a
    /// captured payment does the order transaction run.
    #[instrument(skip(self, request), fields(cart_id = %cart_id))]
    pub async fn checkout(
        &self,
        cart_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let now = Utc::now();
        let cart = self.carts.get_cart_model(cart_id).await?;
        ensure_open(&cart, now)?;

        self.claim_cart(cart_id, now).await?;
        self.event_sender
            .send_or_log(Event::CheckoutStarted { cart_id })
            .await;

        match self.run_checkout(cart, request).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                // A payment parked for reconciliation keeps the cart
                // frozen; letting it check out again would charge twice.
                if !matches!(err, ServiceError::OrderCreationError { .. }) {
                    self.release_cart(cart_id).await;
                }
                Err(err)
            }
        }
    }

    async fn run_checkout(
        &self,
        cart: CartModel,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, ServiceError> {
        let cart_id = cart.id;
        let email = self.resolve_email(&cart, request.email.as_deref()).await?;
        let destination = request.shipping_address.as_ref().map(Address::destination);

        let priced = self.carts.price(cart_id, destination.as_ref()).await?;
        if priced.items.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let codes = self.carts.attached_codes(cart_id).await?;
        for applied in &priced.quote.applied_discounts {
            if let Some(code) = codes.iter().find(|c| c.id == applied.discount_id) {
                self.discounts
                    .ensure_customer_allowance(code, cart.customer_id, Some(&email))
                    .await?;
            }
        }

        let reservation_lines = reservation_lines(&priced.items);
        self.inventory.check_availability(&reservation_lines).await?;

        // Payment first; no order rows exist yet.
        let payment = self
            .payments
            .create_pending(cart_id, priced.quote.total, &cart.currency)
            .await?;

        let charge_request = ChargeRequest {
            cart_id,
            amount: priced.quote.total,
            currency: cart.currency.clone(),
            payment_method: request.payment_method.clone(),
        };
        let charge = match self.gateway.confirm(&charge_request).await {
            Ok(charge) => charge,
            Err(err) => {
                let reason = format!("Gateway call failed: {}", err);
                self.payments
                    .record_failure(payment.id, None, &reason)
                    .await?;
                return Err(err);
            }
        };

        if charge.status != GatewayChargeStatus::Succeeded {
            let reason = charge
                .decline_reason
                .unwrap_or_else(|| "declined".to_string());
            self.payments
                .record_failure(payment.id, Some(&charge.payment_intent_id), &reason)
                .await?;
            return Err(ServiceError::PaymentFailed(format!(
                "Payment was declined: {}",
                reason
            )));
        }

        self.payments
            .record_capture(payment.id, &charge.payment_intent_id)
            .await?;

        // The money is captured. Everything from here on must either
        // produce the order or hand the payment to an operator.
        let created = match self
            .create_order(&cart, &priced, &request, payment.id, &email, &reservation_lines)
            .await
        {
            Ok(order) => order,
            Err(err) => {
                let reason = format!("Order creation failed after capture: {}", err);
                error!(
                    payment_id = %payment.id,
                    payment_intent_id = %charge.payment_intent_id,
                    error = %err,
                    "Checkout failed after payment capture"
                );
                if let Err(park_err) = self
                    .payments
                    .park_for_reconciliation(payment.id, &reason)
                    .await
                {
                    error!(
                        payment_id = %payment.id,
                        error = %park_err,
                        "Could not park the captured payment for reconciliation"
                    );
                }
                // Stock that drained between the pre-charge check and the
                // order transaction is the shopper's problem to adjust, not
                // a support case; keep the per-line shortage detail.
                return Err(match err {
                    ServiceError::InventoryConflict(shortages) => {
                        ServiceError::InventoryConflict(shortages)
                    }
                    other => ServiceError::OrderCreationError {
                        message: other.to_string(),
                        payment_intent_id: charge.payment_intent_id,
                    },
                });
            }
        };

        self.announce_success(&created, &priced).await;

        // The explicit pending -> confirmed step; entering confirmed is
        // what requests the confirmation email.
        let order = self
            .orders
            .update_status(created.id, OrderStatus::Confirmed)
            .await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "Checkout completed"
        );
        Ok(CheckoutOutcome {
            order,
            payment_id: payment.id,
            payment_intent_id: charge.payment_intent_id,
            quote: priced.quote,
        })
    }

    /// The order transaction: reserve stock, write the order and its
    /// lines, consume discount uses, link the payment, convert the cart.
    /// All of it commits or none of it does.
    async fn create_order(
        &self,
        cart: &CartModel,
        priced: &PricedCart,
        request: &CheckoutRequest,
        payment_id: Uuid,
        email: &str,
        reservation_lines: &[ReservationLine],
    ) -> Result<OrderModel, ServiceError> {
        let order_lines = self.order_lines(&priced.items).await?;
        let now = Utc::now();

        let txn = self.db.begin().await?;

        self.inventory
            .reserve_in_txn(&txn, reservation_lines)
            .await?;

        let order = self
            .orders
            .create_in_txn(
                &txn,
                NewOrder {
                    customer_id: cart.customer_id,
                    email: email.to_string(),
                    currency: cart.currency.clone(),
                    subtotal: priced.quote.subtotal,
                    discount_total: priced.quote.discount_total,
                    shipping_total: priced.quote.shipping_total,
                    tax_total: priced.quote.tax_total,
                    total_amount: priced.quote.total,
                    payment_id,
                    cart_id: cart.id,
                    shipping_address: request
                        .shipping_address
                        .as_ref()
                        .and_then(Address::to_stored_json),
                    billing_address: request
                        .billing_address
                        .as_ref()
                        .and_then(Address::to_stored_json),
                    notes: request.notes.clone(),
                    lines: order_lines,
                },
            )
            .await?;

        for applied in &priced.quote.applied_discounts {
            self.discounts
                .redeem_in_txn(
                    &txn,
                    applied,
                    order.id,
                    cart.id,
                    cart.customer_id,
                    Some(email),
                    now,
                )
                .await?;
        }

        self.payments.mark_matched(&txn, payment_id, order.id).await?;
        self.carts.mark_converted_in_txn(&txn, cart.clone()).await?;

        txn.commit().await?;
        Ok(order)
    }

    async fn announce_success(&self, order: &OrderModel, priced: &PricedCart) {
        self.event_sender
            .send_or_log(Event::OrderCreated(order.id))
            .await;
        for applied in &priced.quote.applied_discounts {
            self.event_sender
                .send_or_log(Event::DiscountRedeemed {
                    discount_id: applied.discount_id,
                    order_id: order.id,
                    code: applied.code.clone(),
                })
                .await;
        }
        self.inventory
            .announce_reserved(&reservation_lines(&priced.items), order.id)
            .await;
    }

    /// Flips the cart from active to converting; losing this race means
    /// another checkout is already running.
    async fn claim_cart(&self, cart_id: Uuid, now: DateTime<Utc>) -> Result<(), ServiceError> {
        let claim = Cart::update_many()
            .col_expr(cart::Column::Status, Expr::value(CartStatus::Converting))
            .col_expr(cart::Column::UpdatedAt, Expr::value(now))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Status.eq(CartStatus::Active))
            .exec(&*self.db)
            .await?;

        if claim.rows_affected == 0 {
            warn!("Cart claim lost; a checkout is already running");
            return Err(ServiceError::Conflict(format!(
                "Cart {} is already being checked out",
                cart_id
            )));
        }
        Ok(())
    }

    /// Returns a claimed cart to active after a recoverable failure
    async fn release_cart(&self, cart_id: Uuid) {
        let release = Cart::update_many()
            .col_expr(cart::Column::Status, Expr::value(CartStatus::Active))
            .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(cart::Column::Id.eq(cart_id))
            .filter(cart::Column::Status.eq(CartStatus::Converting))
            .exec(&*self.db)
            .await;

        if let Err(e) = release {
            error!(cart_id = %cart_id, error = %e, "Could not release the cart claim");
        }
    }

    async fn resolve_email(
        &self,
        cart: &CartModel,
        requested: Option<&str>,
    ) -> Result<String, ServiceError> {
        if let Some(email) = requested {
            return Ok(email.to_string());
        }
        if let Some(email) = &cart.email {
            return Ok(email.clone());
        }
        if let Some(customer_id) = cart.customer_id {
            if let Some(customer) = Customer::find_by_id(customer_id).one(&*self.db).await? {
                return Ok(customer.email);
            }
        }
        Err(ServiceError::ValidationError(
            "An email address is required to place the order".to_string(),
        ))
    }

    /// Resolves sku and name snapshots for the order lines
    async fn order_lines(
        &self,
        items: &[cart_item::Model],
    ) -> Result<Vec<NewOrderLine>, ServiceError> {
        let variant_ids: Vec<Uuid> = items.iter().map(|item| item.variant_id).collect();
        let variants = ProductVariant::find()
            .filter(crate::entities::product_variant::Column::Id.is_in(variant_ids))
            .all(&*self.db)
            .await?;
        let by_id: HashMap<Uuid, &crate::entities::product_variant::Model> =
            variants.iter().map(|v| (v.id, v)).collect();

        items
            .iter()
            .map(|item| {
                let variant = by_id.get(&item.variant_id).ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Product variant {} no longer exists",
                        item.variant_id
                    ))
                })?;
                Ok(NewOrderLine {
                    product_id: item.product_id,
                    variant_id: item.variant_id,
                    sku: variant.sku.clone(),
                    name: variant.name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
            })
            .collect()
    }
}

fn reservation_lines(items: &[cart_item::Model]) -> Vec<ReservationLine> {
    items
        .iter()
        .map(|item| ReservationLine {
            product_id: item.product_id,
            variant_id: item.variant_id,
            quantity: item.quantity,
        })
        .collect()
}
