use crate::{
    db::DbPool,
    entities::{
        discount_code, discount_redemption, DiscountCode, DiscountCodeModel, DiscountRedemption,
        DiscountScope, DiscountType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::pricing::AppliedDiscount,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

static CODE_FORMAT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9][A-Z0-9_-]*$").unwrap());

/// Request to create a new discount code
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateDiscountCodeRequest {
    #[validate(length(min = 2, max = 64, message = "Code must be 2 to 64 characters"))]
    pub code: String,
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub value: Decimal,
    /// Defaults to every cart when omitted
    pub applicable_to: Option<DiscountScope>,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount: Option<Decimal>,
    #[validate(range(min = 1, message = "Usage limit must be at least 1"))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 1, message = "Per-customer limit must be at least 1"))]
    pub user_usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stackable: bool,
    #[validate(range(min = 0, max = 100, message = "Priority must be between 0 and 100"))]
    #[serde(default)]
    pub priority: i32,
}

/// Request to update an existing code. Absent fields keep their value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateDiscountCodeRequest {
    pub description: Option<String>,
    pub value: Option<Decimal>,
    pub applicable_to: Option<DiscountScope>,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount: Option<Decimal>,
    #[validate(range(min = 1, message = "Usage limit must be at least 1"))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 1, message = "Per-customer limit must be at least 1"))]
    pub user_usage_limit: Option<i32>,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub stackable: Option<bool>,
    #[validate(range(min = 0, max = 100, message = "Priority must be between 0 and 100"))]
    pub priority: Option<i32>,
    pub is_active: Option<bool>,
}

/// Aggregated redemption figures for one code
#[derive(Debug, Clone, Serialize)]
pub struct DiscountStatistics {
    pub discount_id: Uuid,
    pub code: String,
    pub redemption_count: u64,
    pub total_amount_applied: Decimal,
    /// None when the code has no global limit
    pub remaining_uses: Option<i64>,
}

/// Uppercases and trims a customer-entered code so `save20` and
/// `SAVE20 ` find the same row.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Lowercases and trims an email so per-customer counting treats
/// `Amy@Example.com` and `amy@example.com` as the same shopper.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_code_format(code: &str) -> Result<(), ServiceError> {
    if !CODE_FORMAT.is_match(code) {
        return Err(ServiceError::ValidationError(format!(
            "Code '{}' may only contain letters, digits, '-' and '_'",
            code
        )));
    }
    Ok(())
}

fn validate_value(discount_type: DiscountType, value: Decimal) -> Result<(), ServiceError> {
    match discount_type {
        DiscountType::Percentage => {
            if value < Decimal::ZERO || value > Decimal::from(100) {
                return Err(ServiceError::ValidationError(
                    "Percentage value must be between 0 and 100".to_string(),
                ));
            }
        }
        DiscountType::FixedAmount => {
            if value <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Fixed amount value must be positive".to_string(),
                ));
            }
        }
        // Value is unused for free shipping
        DiscountType::FreeShipping => {}
    }
    Ok(())
}

fn validate_amounts(
    minimum_order_amount: Option<Decimal>,
    maximum_discount: Option<Decimal>,
) -> Result<(), ServiceError> {
    if let Some(minimum) = minimum_order_amount {
        if minimum < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Minimum order amount cannot be negative".to_string(),
            ));
        }
    }
    if let Some(cap) = maximum_discount {
        if cap <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Maximum discount must be positive".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_window(
    starts_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), ServiceError> {
    if let (Some(starts), Some(expires)) = (starts_at, expires_at) {
        if starts >= expires {
            return Err(ServiceError::ValidationError(
                "Validity window must start before it expires".to_string(),
            ));
        }
    }
    Ok(())
}

/// Administers discount codes and consumes their uses.
#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl DiscountService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_code(
        &self,
        request: CreateDiscountCodeRequest,
    ) -> Result<DiscountCodeModel, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let code = normalize_code(&request.code);
        validate_code_format(&code)?;
        validate_value(request.discount_type, request.value)?;
        validate_amounts(request.minimum_order_amount, request.maximum_discount)?;
        validate_window(request.starts_at, request.expires_at)?;

        if self.get_by_code(&code).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Discount code {} already exists",
                code
            )));
        }

        let scope = request.applicable_to.unwrap_or_default();
        let now = Utc::now();
        let model = discount_code::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            description: Set(request.description),
            discount_type: Set(request.discount_type),
            value: Set(request.value),
            applicable_to: Set(scope.to_json()),
            minimum_order_amount: Set(request.minimum_order_amount),
            maximum_discount: Set(request.maximum_discount),
            usage_limit: Set(request.usage_limit),
            user_usage_limit: Set(request.user_usage_limit),
            usage_count: Set(0),
            starts_at: Set(request.starts_at),
            expires_at: Set(request.expires_at),
            is_active: Set(true),
            stackable: Set(request.stackable),
            priority: Set(request.priority),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::DiscountCodeCreated(created.id))
            .await;

        info!(discount_id = %created.id, "Discount code created");
        Ok(created)
    }

    #[instrument(skip(self, request), fields(discount_id = %discount_id))]
    pub async fn update_code(
        &self,
        discount_id: Uuid,
        request: UpdateDiscountCodeRequest,
    ) -> Result<DiscountCodeModel, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let current = self.load(discount_id).await?;

        let value = request.value.unwrap_or(current.value);
        validate_value(current.discount_type, value)?;
        validate_amounts(
            request.minimum_order_amount.or(current.minimum_order_amount),
            request.maximum_discount.or(current.maximum_discount),
        )?;
        validate_window(
            request.starts_at.or(current.starts_at),
            request.expires_at.or(current.expires_at),
        )?;

        let mut active: discount_code::ActiveModel = current.into();
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(value) = request.value {
            active.value = Set(value);
        }
        if let Some(scope) = request.applicable_to {
            active.applicable_to = Set(scope.to_json());
        }
        if let Some(minimum) = request.minimum_order_amount {
            active.minimum_order_amount = Set(Some(minimum));
        }
        if let Some(cap) = request.maximum_discount {
            active.maximum_discount = Set(Some(cap));
        }
        if let Some(limit) = request.usage_limit {
            active.usage_limit = Set(Some(limit));
        }
        if let Some(limit) = request.user_usage_limit {
            active.user_usage_limit = Set(Some(limit));
        }
        if let Some(starts) = request.starts_at {
            active.starts_at = Set(Some(starts));
        }
        if let Some(expires) = request.expires_at {
            active.expires_at = Set(Some(expires));
        }
        if let Some(stackable) = request.stackable {
            active.stackable = Set(stackable);
        }
        if let Some(priority) = request.priority {
            active.priority = Set(priority);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        info!("Discount code updated");
        Ok(updated)
    }

    /// Turns a code off. Carts holding it simply stop receiving the
    /// discount the next time they are priced.
    #[instrument(skip(self), fields(discount_id = %discount_id))]
    pub async fn deactivate_code(
        &self,
        discount_id: Uuid,
    ) -> Result<DiscountCodeModel, ServiceError> {
        let current = self.load(discount_id).await?;
        if !current.is_active {
            return Ok(current);
        }

        let mut active: discount_code::ActiveModel = current.into();
        active.is_active = Set(false);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::DiscountCodeDeactivated(discount_id))
            .await;

        info!("Discount code deactivated");
        Ok(updated)
    }

    #[instrument(skip(self), fields(discount_id = %discount_id))]
    pub async fn get_code(
        &self,
        discount_id: Uuid,
    ) -> Result<Option<DiscountCodeModel>, ServiceError> {
        Ok(DiscountCode::find_by_id(discount_id).one(&*self.db).await?)
    }

    /// Case-insensitive lookup by customer-entered code
    #[instrument(skip(self))]
    pub async fn get_by_code(&self, code: &str) -> Result<Option<DiscountCodeModel>, ServiceError> {
        let normalized = normalize_code(code);
        Ok(DiscountCode::find()
            .filter(discount_code::Column::Code.eq(normalized))
            .one(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn list_codes(
        &self,
        page: u64,
        per_page: u64,
        only_active: bool,
    ) -> Result<(Vec<DiscountCodeModel>, u64), ServiceError> {
        let mut query = DiscountCode::find().order_by_desc(discount_code::Column::CreatedAt);
        if only_active {
            query = query.filter(discount_code::Column::IsActive.eq(true));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let codes = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((codes, total))
    }

    /// Aggregates how a code has performed: how many times it was
    /// redeemed, how much money it gave away, how many uses remain.
    #[instrument(skip(self), fields(discount_id = %discount_id))]
    pub async fn code_statistics(
        &self,
        discount_id: Uuid,
    ) -> Result<DiscountStatistics, ServiceError> {
        let discount = self.load(discount_id).await?;
        let redemptions = DiscountRedemption::find()
            .filter(discount_redemption::Column::DiscountId.eq(discount_id))
            .all(&*self.db)
            .await?;

        let total_amount_applied: Decimal =
            redemptions.iter().map(|r| r.amount_applied).sum();

        Ok(DiscountStatistics {
            discount_id,
            code: discount.code,
            redemption_count: redemptions.len() as u64,
            total_amount_applied,
            remaining_uses: discount
                .usage_limit
                .map(|limit| (i64::from(limit) - i64::from(discount.usage_count)).max(0)),
        })
    }

    /// How often this shopper has already redeemed the code. Customers
    /// count by id; guests count by their checkout email.
    pub async fn identity_redemptions(
        &self,
        discount_id: Uuid,
        customer_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<u64, ServiceError> {
        if customer_id.is_none() && email.is_none() {
            return Ok(0);
        }

        let mut identity = Condition::any();
        if let Some(customer_id) = customer_id {
            identity = identity.add(discount_redemption::Column::CustomerId.eq(customer_id));
        }
        if let Some(email) = email {
            identity =
                identity.add(discount_redemption::Column::CustomerEmail.eq(normalize_email(email)));
        }

        Ok(DiscountRedemption::find()
            .filter(discount_redemption::Column::DiscountId.eq(discount_id))
            .filter(identity)
            .count(&*self.db)
            .await?)
    }

    /// Rejects a code this shopper has personally used up. Identity is the
    /// customer id when the cart has one, else the checkout email; a cart
    /// with neither has nothing to count against yet.
    pub async fn ensure_customer_allowance(
        &self,
        discount: &DiscountCodeModel,
        customer_id: Option<Uuid>,
        email: Option<&str>,
    ) -> Result<(), ServiceError> {
        let Some(limit) = discount.user_usage_limit else {
            return Ok(());
        };

        let used = self
            .identity_redemptions(discount.id, customer_id, email)
            .await?;
        if used >= limit as u64 {
            warn!(
                discount_id = %discount.id,
                "Shopper reached the per-customer limit for a code"
            );
            return Err(ServiceError::InvalidOperation(format!(
                "Code {} has already been used the maximum number of times on this account",
                discount.code
            )));
        }
        Ok(())
    }

    /// Consumes one use of a code and records the redemption, on the
    /// caller's transaction.
    ///
    /// The usage counter is advanced with a single guarded UPDATE, so two
    /// checkouts racing for the last use cannot both pass; the statement
    /// matches zero rows for the loser and the whole transaction rolls
    /// back.
    pub async fn redeem_in_txn<C: ConnectionTrait>(
        &self,
        conn: &C,
        applied: &AppliedDiscount,
        order_id: Uuid,
        cart_id: Uuid,
        customer_id: Option<Uuid>,
        customer_email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let within_limit = Condition::any()
            .add(discount_code::Column::UsageLimit.is_null())
            .add(
                Expr::col(discount_code::Column::UsageCount)
                    .lt(Expr::col(discount_code::Column::UsageLimit)),
            );

        let result = DiscountCode::update_many()
            .col_expr(
                discount_code::Column::UsageCount,
                Expr::col(discount_code::Column::UsageCount).add(1),
            )
            .col_expr(discount_code::Column::UpdatedAt, Expr::value(now))
            .filter(discount_code::Column::Id.eq(applied.discount_id))
            .filter(discount_code::Column::IsActive.eq(true))
            .filter(within_limit)
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            warn!(
                discount_id = %applied.discount_id,
                code = %applied.code,
                "Discount code was exhausted or deactivated mid-checkout"
            );
            return Err(ServiceError::Conflict(format!(
                "Discount code {} is no longer available",
                applied.code
            )));
        }

        let redemption = discount_redemption::ActiveModel {
            id: Set(Uuid::new_v4()),
            discount_id: Set(applied.discount_id),
            order_id: Set(order_id),
            cart_id: Set(cart_id),
            customer_id: Set(customer_id),
            customer_email: Set(customer_email.map(normalize_email)),
            code: Set(applied.code.clone()),
            amount_applied: Set(applied.amount_off),
            redeemed_at: Set(now),
        };
        redemption.insert(conn).await?;

        Ok(())
    }

    async fn load(&self, discount_id: Uuid) -> Result<DiscountCodeModel, ServiceError> {
        DiscountCode::find_by_id(discount_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Discount code {} not found", discount_id))
            })
    }
}
