use crate::{
    db::DbPool,
    entities::{inventory_level, InventoryLevel},
    errors::{LineShortage, ServiceError},
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    sea_query::{Expr, ExprTrait},
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// One variant an order wants reserved
#[derive(Debug, Clone)]
pub struct ReservationLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
}

/// Computes which lines cannot be covered by the given availability.
/// Variants with no level row count as zero available.
fn find_shortages(
    lines: &[ReservationLine],
    available_by_variant: &HashMap<Uuid, i32>,
) -> Vec<LineShortage> {
    lines
        .iter()
        .filter_map(|line| {
            let available = available_by_variant
                .get(&line.variant_id)
                .copied()
                .unwrap_or(0);
            (available < line.quantity).then(|| LineShortage {
                product_id: line.product_id,
                variant_id: line.variant_id,
                requested: line.quantity,
                available,
            })
        })
        .collect()
}

/// Tracks per-variant stock and hands it out to orders.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Sets the on-hand count for a variant, creating the level row if the
    /// variant has never been stocked.
    #[instrument(skip(self), fields(variant_id = %variant_id, on_hand = on_hand))]
    pub async fn set_level(
        &self,
        variant_id: Uuid,
        on_hand: i32,
    ) -> Result<inventory_level::Model, ServiceError> {
        if on_hand < 0 {
            return Err(ServiceError::ValidationError(
                "On-hand quantity cannot be negative".to_string(),
            ));
        }

        let now = Utc::now();
        let existing = InventoryLevel::find_by_id(variant_id).one(&*self.db).await?;

        let level = match existing {
            Some(level) => {
                let mut active: inventory_level::ActiveModel = level.into();
                active.on_hand = Set(on_hand);
                active.updated_at = Set(now);
                active.update(&*self.db).await?
            }
            None => {
                let model = inventory_level::ActiveModel {
                    variant_id: Set(variant_id),
                    on_hand: Set(on_hand),
                    reserved: Set(0),
                    version: Set(1),
                    updated_at: Set(now),
                };
                model.insert(&*self.db).await?
            }
        };

        info!("Inventory level set");
        Ok(level)
    }

    #[instrument(skip(self), fields(variant_id = %variant_id))]
    pub async fn get_level(
        &self,
        variant_id: Uuid,
    ) -> Result<Option<inventory_level::Model>, ServiceError> {
        Ok(InventoryLevel::find_by_id(variant_id).one(&*self.db).await?)
    }

    /// Checks whether every line could be reserved right now.
    ///
    /// A clean result is advisory only; stock can still disappear between
    /// this check and [`reserve_in_txn`]. The check exists so a checkout
    /// can fail before any money moves in the common case.
    ///
    /// [`reserve_in_txn`]: InventoryService::reserve_in_txn
    #[instrument(skip(self, lines))]
    pub async fn check_availability(&self, lines: &[ReservationLine]) -> Result<(), ServiceError> {
        if lines.is_empty() {
            return Ok(());
        }

        let variant_ids: Vec<Uuid> = lines.iter().map(|line| line.variant_id).collect();
        let levels = InventoryLevel::find()
            .filter(inventory_level::Column::VariantId.is_in(variant_ids))
            .all(&*self.db)
            .await?;

        let available_by_variant: HashMap<Uuid, i32> = levels
            .iter()
            .map(|level| (level.variant_id, level.available()))
            .collect();

        let shortages = find_shortages(lines, &available_by_variant);
        if !shortages.is_empty() {
            return Err(ServiceError::InventoryConflict(shortages));
        }
        Ok(())
    }

    /// Reserves stock for every line on the caller's transaction.
    ///
    /// Each line is taken with a guarded UPDATE that only matches while
    /// enough unreserved stock remains, so two orders cannot reserve the
    /// same unit. The first line that cannot be covered fails the whole
    /// call and the caller's transaction unwinds the earlier lines.
    pub async fn reserve_in_txn<C: ConnectionTrait>(
        &self,
        conn: &C,
        lines: &[ReservationLine],
    ) -> Result<(), ServiceError> {
        let now = Utc::now();

        for line in lines {
            if line.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "Reservation quantity must be positive".to_string(),
                ));
            }

            let enough_unreserved = Expr::col(inventory_level::Column::OnHand)
                .sub(Expr::col(inventory_level::Column::Reserved))
                .gte(line.quantity);

            let result = InventoryLevel::update_many()
                .col_expr(
                    inventory_level::Column::Reserved,
                    Expr::col(inventory_level::Column::Reserved).add(line.quantity),
                )
                .col_expr(
                    inventory_level::Column::Version,
                    Expr::col(inventory_level::Column::Version).add(1),
                )
                .col_expr(inventory_level::Column::UpdatedAt, Expr::value(now))
                .filter(inventory_level::Column::VariantId.eq(line.variant_id))
                .filter(enough_unreserved)
                .exec(conn)
                .await?;

            if result.rows_affected == 0 {
                let available = InventoryLevel::find_by_id(line.variant_id)
                    .one(conn)
                    .await?
                    .map(|level| level.available())
                    .unwrap_or(0);

                warn!(
                    variant_id = %line.variant_id,
                    requested = line.quantity,
                    available,
                    "Reservation lost the race for remaining stock"
                );
                return Err(ServiceError::InventoryConflict(vec![LineShortage {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                    requested: line.quantity,
                    available,
                }]));
            }
        }

        Ok(())
    }

    /// Returns reserved stock to the pool when an order is cancelled.
    pub async fn release_in_txn<C: ConnectionTrait>(
        &self,
        conn: &C,
        lines: &[ReservationLine],
    ) -> Result<(), ServiceError> {
        let now = Utc::now();

        for line in lines {
            // Clamp at zero; releasing more than is reserved indicates an
            // earlier bookkeeping bug but must not underflow the column.
            InventoryLevel::update_many()
                .col_expr(
                    inventory_level::Column::Reserved,
                    Expr::col(inventory_level::Column::Reserved).sub(line.quantity),
                )
                .col_expr(
                    inventory_level::Column::Version,
                    Expr::col(inventory_level::Column::Version).add(1),
                )
                .col_expr(inventory_level::Column::UpdatedAt, Expr::value(now))
                .filter(inventory_level::Column::VariantId.eq(line.variant_id))
                .filter(inventory_level::Column::Reserved.gte(line.quantity))
                .exec(conn)
                .await?;
        }

        Ok(())
    }

    /// Publishes reservation events once the owning transaction commits
    pub async fn announce_reserved(&self, lines: &[ReservationLine], order_id: Uuid) {
        for line in lines {
            self.event_sender
                .send_or_log(Event::InventoryReserved {
                    variant_id: line.variant_id,
                    quantity: line.quantity,
                    order_id,
                })
                .await;
        }
    }

    /// Publishes release events once the owning transaction commits
    pub async fn announce_released(&self, lines: &[ReservationLine], order_id: Uuid) {
        for line in lines {
            self.event_sender
                .send_or_log(Event::InventoryReleased {
                    variant_id: line.variant_id,
                    quantity: line.quantity,
                    order_id,
                })
                .await;
        }
    }
}
