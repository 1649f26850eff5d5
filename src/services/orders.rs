use crate::{
    db::DbPool,
    entities::{order, order_item, Order, OrderModel, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory::{InventoryService, ReservationLine},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, ModelTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Everything checkout hands over to mint an order row
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Option<Uuid>,
    pub email: String,
    pub currency: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_total: Decimal,
    pub tax_total: Decimal,
    pub total_amount: Decimal,
    pub payment_id: Uuid,
    pub cart_id: Uuid,
    pub shipping_address: Option<String>,
    pub billing_address: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<NewOrderLine>,
}

#[derive(Debug, Clone)]
pub struct NewOrderLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub sku: String,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Order with its lines
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrderDetails {
    pub order: OrderModel,
    pub items: Vec<order_item::Model>,
}

/// Service for reading and steering orders after checkout created them.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    inventory: InventoryService,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        inventory: InventoryService,
    ) -> Self {
        Self {
            db,
            event_sender,
            inventory,
        }
    }

    /// Inserts the order and its lines on the caller's transaction.
    ///
    /// The row is born pending even though the payment is already
    /// captured; checkout moves it to confirmed with an explicit status
    /// update once the transaction holds, and that transition is what
    /// requests the confirmation email.
    pub async fn create_in_txn<C: ConnectionTrait>(
        &self,
        conn: &C,
        new_order: NewOrder,
    ) -> Result<OrderModel, ServiceError> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!("ORD-{}", order_id.to_string()[..8].to_uppercase())),
            customer_id: Set(new_order.customer_id),
            email: Set(new_order.email),
            status: Set(OrderStatus::Pending),
            currency: Set(new_order.currency),
            subtotal: Set(new_order.subtotal),
            discount_total: Set(new_order.discount_total),
            shipping_total: Set(new_order.shipping_total),
            tax_total: Set(new_order.tax_total),
            total_amount: Set(new_order.total_amount),
            payment_id: Set(new_order.payment_id),
            cart_id: Set(new_order.cart_id),
            shipping_address: Set(new_order.shipping_address),
            billing_address: Set(new_order.billing_address),
            notes: Set(new_order.notes),
            placed_at: Set(now),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };
        let created = model.insert(conn).await?;

        for line in new_order.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                sku: Set(line.sku),
                name: Set(line.name),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                line_total: Set(line.unit_price * Decimal::from(line.quantity)),
                created_at: Set(now),
            };
            item.insert(conn).await?;
        }

        Ok(created)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = self.load(order_id).await?;
        let items = self.items_of(&order).await?;
        Ok(OrderDetails { order, items })
    }

    /// Lookup by the human-facing order number
    #[instrument(skip(self))]
    pub async fn get_by_number(&self, order_number: &str) -> Result<OrderDetails, ServiceError> {
        let order = Order::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

        let items = self.items_of(&order).await?;
        Ok(OrderDetails { order, items })
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
        status: Option<OrderStatus>,
        customer_id: Option<Uuid>,
    ) -> Result<(Vec<OrderModel>, u64), ServiceError> {
        let mut query = Order::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }
        if let Some(customer_id) = customer_id {
            query = query.filter(order::Column::CustomerId.eq(customer_id));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((orders, total))
    }

    /// Moves an order along its lifecycle.
    ///
    /// The write is guarded on the row version, so two operators moving
    /// the same order at once cannot both win. Entering `confirmed`
    /// requests the confirmation email.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let current = self.load(order_id).await?;
        let old_status = current.status;

        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} cannot move from {} to {}",
                order_id, old_status, new_status
            )));
        }

        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(current.version))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            warn!("Order changed underneath the status update");
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;

        if new_status == OrderStatus::Confirmed {
            self.event_sender
                .send_or_log(Event::ConfirmationEmailRequested {
                    order_id,
                    email: current.email.clone(),
                })
                .await;
        }

        info!("Order status updated");
        self.load(order_id).await
    }

    /// Cancels an order and returns its reserved stock to the pool.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        let current = self.load(order_id).await?;
        if !current.status.is_cancellable() {
            return Err(ServiceError::InvalidStatus(format!(
                "Order {} can no longer be cancelled from {}",
                order_id, current.status
            )));
        }

        let items = self.items_of(&current).await?;
        let lines: Vec<ReservationLine> = items
            .iter()
            .map(|item| ReservationLine {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
            })
            .collect();

        let old_status = current.status;
        let txn = self.db.begin().await?;

        let result = Order::update_many()
            .col_expr(order::Column::Status, Expr::value(OrderStatus::Cancelled))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Some(Utc::now())))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Version.eq(current.version))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        self.inventory.release_in_txn(&txn, &lines).await?;
        txn.commit().await?;

        self.inventory.announce_released(&lines, order_id).await;
        self.event_sender
            .send_or_log(Event::OrderCancelled(order_id))
            .await;
        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: OrderStatus::Cancelled.to_string(),
            })
            .await;

        info!("Order cancelled");
        self.load(order_id).await
    }

    async fn load(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn items_of(&self, order: &OrderModel) -> Result<Vec<order_item::Model>, ServiceError> {
        Ok(order
            .find_related(crate::entities::OrderItem)
            .order_by_asc(order_item::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }
}
