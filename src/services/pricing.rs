use crate::{
    config::AppConfig,
    entities::{DiscountCodeModel, DiscountScope, DiscountType},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

use super::tax::{Destination, RegionTaxTable, TaxRateSource};

/// One cart line as the pricing engine sees it.
#[derive(Debug, Clone)]
pub struct PricingLine {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub category_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

impl PricingLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Cart contents plus shopper identity at quote time.
#[derive(Debug, Clone, Default)]
pub struct PricingInput {
    pub lines: Vec<PricingLine>,
    pub customer_id: Option<Uuid>,
}

impl PricingInput {
    /// Undiscounted sum of line totals.
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(PricingLine::line_total).sum()
    }
}

/// Why a discount code was not applied to a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    Inactive,
    NotYetStarted,
    Expired,
    UsageLimitReached,
    BelowMinimum,
    ScopeMismatch,
    MalformedScope,
    /// Lost the stacking contest to a higher priority code
    Superseded,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Inactive => "discount code is not active",
            Self::NotYetStarted => "discount code is not valid yet",
            Self::Expired => "discount code has expired",
            Self::UsageLimitReached => "discount code has reached its usage limit",
            Self::BelowMinimum => "cart subtotal is below the minimum for this discount",
            Self::ScopeMismatch => "discount code does not apply to anything in the cart",
            Self::MalformedScope => "discount code could not be read",
            Self::Superseded => "a higher priority discount was applied instead",
        };
        write!(f, "{}", text)
    }
}

/// Outcome of checking one discount code against one cart.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DiscountEvaluation {
    pub eligible: bool,
    pub amount_off: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectionReason>,
}

impl DiscountEvaluation {
    fn applied(amount_off: Decimal) -> Self {
        Self {
            eligible: true,
            amount_off,
            reason: None,
        }
    }

    fn rejected(reason: RejectionReason) -> Self {
        Self {
            eligible: false,
            amount_off: Decimal::ZERO,
            reason: Some(reason),
        }
    }
}

/// Checks a single discount code against a cart.
///
/// Liveness and window checks run before cart conditions, so the reason a
/// shopper sees names the first failing rule. Amounts are computed against
/// the undiscounted subtotal.
pub fn evaluate_discount(
    discount: &DiscountCodeModel,
    input: &PricingInput,
    now: DateTime<Utc>,
) -> DiscountEvaluation {
    if !discount.is_active {
        return DiscountEvaluation::rejected(RejectionReason::Inactive);
    }
    if !discount.is_started_by(now) {
        return DiscountEvaluation::rejected(RejectionReason::NotYetStarted);
    }
    if discount.is_expired_at(now) {
        return DiscountEvaluation::rejected(RejectionReason::Expired);
    }
    if !discount.has_remaining_uses() {
        return DiscountEvaluation::rejected(RejectionReason::UsageLimitReached);
    }

    let subtotal = input.subtotal();
    if let Some(minimum) = discount.minimum_order_amount {
        if subtotal < minimum {
            return DiscountEvaluation::rejected(RejectionReason::BelowMinimum);
        }
    }

    let scope = match discount.scope() {
        Ok(scope) => scope,
        Err(e) => {
            warn!(discount_id = %discount.id, error = %e, "Stored discount scope did not parse");
            return DiscountEvaluation::rejected(RejectionReason::MalformedScope);
        }
    };
    if !scope_covers(&scope, input) {
        return DiscountEvaluation::rejected(RejectionReason::ScopeMismatch);
    }

    DiscountEvaluation::applied(amount_off(discount, subtotal))
}

/// Amount a single eligible code takes off the undiscounted subtotal.
fn amount_off(discount: &DiscountCodeModel, subtotal: Decimal) -> Decimal {
    match discount.discount_type {
        DiscountType::Percentage => {
            let raw = subtotal * discount.value / Decimal::from(100);
            match discount.maximum_discount {
                Some(cap) => raw.min(cap),
                None => raw,
            }
        }
        // A fixed amount never takes off more than the cart is worth
        DiscountType::FixedAmount => discount.value.min(subtotal),
        // Waives the shipping line instead of reducing the subtotal
        DiscountType::FreeShipping => Decimal::ZERO,
    }
}

fn scope_covers(scope: &DiscountScope, input: &PricingInput) -> bool {
    match scope {
        DiscountScope::All => true,
        DiscountScope::Products { ids } => input
            .lines
            .iter()
            .any(|line| ids.contains(&line.product_id)),
        DiscountScope::Variants { ids } => input
            .lines
            .iter()
            .any(|line| ids.contains(&line.variant_id)),
        DiscountScope::Categories { ids } => input.lines.iter().any(|line| {
            line.category_id
                .map_or(false, |category| ids.contains(&category))
        }),
        DiscountScope::Customers { ids } => input
            .customer_id
            .map_or(false, |customer| ids.contains(&customer)),
    }
}

/// Flat-fee shipping with a free threshold.
#[derive(Debug, Clone)]
pub struct ShippingRates {
    pub free_threshold: Decimal,
    pub flat_fee: Decimal,
}

/// Threshold rule for the shipping line: orders at or above the free
/// threshold ship for nothing, everything else pays the flat fee.
pub fn shipping_cost(subtotal: Decimal, rates: &ShippingRates) -> Decimal {
    if subtotal >= rates.free_threshold {
        Decimal::ZERO
    } else {
        rates.flat_fee
    }
}

/// Rounds to cents, midpoint away from zero.
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// A discount that made it into a quote.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AppliedDiscount {
    pub discount_id: Uuid,
    pub code: String,
    pub amount_off: Decimal,
    /// True when this code waives the shipping line
    pub free_shipping: bool,
}

/// A discount that was attached to the cart but did not apply.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RejectedDiscount {
    pub discount_id: Uuid,
    pub code: String,
    pub reason: RejectionReason,
    /// Shopper-facing explanation of the reason
    pub message: String,
}

impl RejectedDiscount {
    fn new(discount: &DiscountCodeModel, reason: RejectionReason) -> Self {
        Self {
            discount_id: discount.id,
            code: discount.code.clone(),
            reason,
            message: reason.to_string(),
        }
    }
}

/// A fully priced cart.
///
/// Monetary fields are exact; rounding to cents happens only when a quote
/// is displayed or persisted, via [`PriceQuote::rounded`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PriceQuote {
    pub currency: String,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub shipping_total: Decimal,
    /// Fraction in [0, 1] the tax line was computed with
    pub tax_rate: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub applied_discounts: Vec<AppliedDiscount>,
    pub rejected_discounts: Vec<RejectedDiscount>,
}

impl PriceQuote {
    /// The same quote with every monetary field rounded to cents.
    ///
    /// The total is rounded from the exact total, not recomputed from the
    /// rounded parts.
    pub fn rounded(&self) -> PriceQuote {
        PriceQuote {
            currency: self.currency.clone(),
            subtotal: round2(self.subtotal),
            discount_total: round2(self.discount_total),
            shipping_total: round2(self.shipping_total),
            tax_rate: self.tax_rate,
            tax_total: round2(self.tax_total),
            total: round2(self.total),
            applied_discounts: self
                .applied_discounts
                .iter()
                .map(|applied| AppliedDiscount {
                    amount_off: round2(applied.amount_off),
                    ..applied.clone()
                })
                .collect(),
            rejected_discounts: self.rejected_discounts.clone(),
        }
    }
}

/// Prices carts: discount stacking, the shipping rule, tax, and the final
/// total.
///
/// The tax source is injected; everything else the engine needs arrives
/// with the call, so two engines built from the same configuration price
/// identically.
#[derive(Clone)]
pub struct PricingEngine {
    shipping: ShippingRates,
    currency: String,
    tax_source: Arc<dyn TaxRateSource>,
}

impl PricingEngine {
    pub fn new(
        shipping: ShippingRates,
        currency: impl Into<String>,
        tax_source: Arc<dyn TaxRateSource>,
    ) -> Self {
        Self {
            shipping,
            currency: currency.into(),
            tax_source,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            ShippingRates {
                free_threshold: config.free_shipping_threshold(),
                flat_fee: config.shipping_flat_fee(),
            },
            config.currency.clone(),
            Arc::new(RegionTaxTable::from(&config.tax)),
        )
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Produces a quote for a cart with the given discount codes attached.
    ///
    /// Stacking policy: when every eligible code is stackable their amounts
    /// sum, each computed against the original subtotal. When any eligible
    /// code is not stackable, only the highest priority code applies; ties
    /// break on code, alphabetically. The summed discount never exceeds the
    /// subtotal.
    ///
    /// Tax is charged on the undiscounted subtotal. No destination or a
    /// failed rate lookup prices the tax line at zero rather than failing
    /// the quote.
    pub async fn quote(
        &self,
        input: &PricingInput,
        discounts: &[DiscountCodeModel],
        destination: Option<&Destination>,
        now: DateTime<Utc>,
    ) -> PriceQuote {
        let subtotal = input.subtotal();

        let mut eligible: Vec<(&DiscountCodeModel, DiscountEvaluation)> = Vec::new();
        let mut rejected: Vec<RejectedDiscount> = Vec::new();
        for discount in discounts {
            let evaluation = evaluate_discount(discount, input, now);
            if evaluation.eligible {
                eligible.push((discount, evaluation));
            } else {
                let reason = evaluation.reason.unwrap_or(RejectionReason::ScopeMismatch);
                rejected.push(RejectedDiscount::new(discount, reason));
            }
        }

        // Non-stackable codes are exclusive: if any eligible code refuses to
        // stack, only the single highest priority code survives.
        if eligible.len() > 1 && eligible.iter().any(|(discount, _)| !discount.stackable) {
            eligible.sort_by(|(a, _), (b, _)| {
                b.priority
                    .cmp(&a.priority)
                    .then_with(|| a.code.cmp(&b.code))
            });
            for (loser, _) in eligible.split_off(1) {
                rejected.push(RejectedDiscount::new(loser, RejectionReason::Superseded));
            }
        }

        let mut applied = Vec::with_capacity(eligible.len());
        let mut discount_total = Decimal::ZERO;
        let mut shipping_waived = false;
        for (discount, evaluation) in &eligible {
            let free_shipping = discount.discount_type == DiscountType::FreeShipping;
            shipping_waived |= free_shipping;
            discount_total += evaluation.amount_off;
            applied.push(AppliedDiscount {
                discount_id: discount.id,
                code: discount.code.clone(),
                amount_off: evaluation.amount_off,
                free_shipping,
            });
        }
        // Stacked amounts are each computed against the full subtotal and
        // can overshoot it in aggregate; the cart never goes negative.
        discount_total = discount_total.min(subtotal);

        let shipping_total = if shipping_waived {
            Decimal::ZERO
        } else {
            shipping_cost(subtotal, &self.shipping)
        };

        let tax_rate = match destination {
            Some(destination) => match self.tax_source.rate_for(destination).await {
                Ok(rate) => rate,
                Err(e) => {
                    warn!(
                        country = %destination.country,
                        error = %e,
                        "Tax rate lookup failed; pricing with rate 0"
                    );
                    Decimal::ZERO
                }
            },
            None => Decimal::ZERO,
        };
        // Tax on the undiscounted subtotal; discounts do not shrink the
        // taxable base.
        let tax_total = subtotal * tax_rate;

        let total = subtotal - discount_total + shipping_total + tax_total;

        PriceQuote {
            currency: self.currency.clone(),
            subtotal,
            discount_total,
            shipping_total,
            tax_rate,
            tax_total,
            total,
            applied_discounts: applied,
            rejected_discounts: rejected,
        }
    }
}
