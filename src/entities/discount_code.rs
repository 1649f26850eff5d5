use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discount code entity.
///
/// `applicable_to` persists a [`DiscountScope`] as tagged JSON, so a scope
/// always says what kind of ids it holds. A bare list of ids with a
/// separate kind column cannot drift out of sync with this layout.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Stored uppercase; lookups normalize before comparing
    #[sea_orm(unique)]
    pub code: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    /// Percent points for percentage type, currency amount for fixed_amount,
    /// unused for free_shipping
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub value: Decimal,
    #[sea_orm(column_type = "Json")]
    pub applicable_to: Json,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub minimum_order_amount: Option<Decimal>,
    /// Cap for percentage discounts; absent means uncapped
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub maximum_discount: Option<Decimal>,
    #[sea_orm(nullable)]
    pub usage_limit: Option<i32>,
    /// How many times a single customer may redeem this code
    #[sea_orm(nullable)]
    pub user_usage_limit: Option<i32>,
    pub usage_count: i32,
    #[sea_orm(nullable)]
    pub starts_at: Option<DateTime<Utc>>,
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub stackable: bool,
    /// Higher wins when non-stackable codes compete
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Parses the persisted scope JSON
    pub fn scope(&self) -> Result<DiscountScope, serde_json::Error> {
        serde_json::from_value(self.applicable_to.clone())
    }

    /// True once the start boundary (inclusive) has passed
    pub fn is_started_by(&self, now: DateTime<Utc>) -> bool {
        self.starts_at.map_or(true, |starts| starts <= now)
    }

    /// True only after the expiry instant has passed; a code is still
    /// redeemable at exactly `expires_at`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires| now > expires)
    }

    pub fn has_remaining_uses(&self) -> bool {
        self.usage_limit
            .map_or(true, |limit| self.usage_count < limit)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::discount_redemption::Entity")]
    Redemptions,
    #[sea_orm(has_many = "super::cart_discount::Entity")]
    CartDiscounts,
}

impl Related<super::discount_redemption::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Redemptions.def()
    }
}

impl Related<super::cart_discount::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartDiscounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Discount type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed_amount")]
    FixedAmount,
    #[sea_orm(string_value = "free_shipping")]
    FreeShipping,
}

/// What a discount code can be applied to.
///
/// Serialized with an explicit `type` tag, e.g.
/// `{"type": "products", "ids": ["..."]}` or `{"type": "all"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscountScope {
    All,
    Products { ids: Vec<Uuid> },
    Variants { ids: Vec<Uuid> },
    Categories { ids: Vec<Uuid> },
    Customers { ids: Vec<Uuid> },
}

impl DiscountScope {
    pub fn is_all(&self) -> bool {
        matches!(self, DiscountScope::All)
    }

    /// Into the JSON shape the entity column stores
    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }
}

impl Default for DiscountScope {
    fn default() -> Self {
        DiscountScope::All
    }
}
