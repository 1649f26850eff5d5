use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Payment record.
///
/// Written before the gateway is called and updated with the outcome, so a
/// captured charge is never only in the gateway's hands. `order_id` stays
/// empty until the order row is created; a captured payment with no order
/// is parked in `needs_reconciliation` for an operator instead of being
/// refunded or retried automatically.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub cart_id: Uuid,
    #[sea_orm(nullable)]
    pub order_id: Option<Uuid>,
    /// Gateway-side reference the customer can quote to support; unset
    /// only while the confirmation call is still in flight
    #[sea_orm(nullable)]
    pub payment_intent_id: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    #[sea_orm(nullable)]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::cart::Entity",
        from = "Column::CartId",
        to = "super::cart::Column::Id"
    )]
    Cart,
}

impl Related<super::cart::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cart.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Payment lifecycle states
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    Display,
    EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "captured")]
    Captured,
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Charge succeeded but the order could not be written
    #[sea_orm(string_value = "needs_reconciliation")]
    NeedsReconciliation,
    /// Captured and linked to its order
    #[sea_orm(string_value = "matched")]
    Matched,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Captured)
                | (Pending, Failed)
                | (Captured, Matched)
                | (Captured, NeedsReconciliation)
                | (NeedsReconciliation, Matched)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_precedes_matching() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Captured));
        assert!(PaymentStatus::Captured.can_transition_to(PaymentStatus::Matched));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Matched));
    }

    #[test]
    fn reconciliation_resolves_to_matched_only() {
        assert!(PaymentStatus::Captured.can_transition_to(PaymentStatus::NeedsReconciliation));
        assert!(PaymentStatus::NeedsReconciliation.can_transition_to(PaymentStatus::Matched));
        assert!(!PaymentStatus::NeedsReconciliation.can_transition_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Failed.can_transition_to(PaymentStatus::Captured));
    }
}
