use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One consumed use of a discount code, written in the same transaction
/// that increments the code's usage counter.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_redemptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub discount_id: Uuid,
    pub order_id: Uuid,
    pub cart_id: Uuid,
    #[sea_orm(nullable)]
    pub customer_id: Option<Uuid>,
    /// Lowercased checkout email, the guest-side identity for per-customer
    /// usage limits
    #[sea_orm(nullable)]
    pub customer_email: Option<String>,
    pub code: String,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount_applied: Decimal,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::discount_code::Entity",
        from = "Column::DiscountId",
        to = "super::discount_code::Column::Id"
    )]
    DiscountCode,
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::discount_code::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscountCode.def()
    }
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
