use crate::{
    db::DbPool,
    entities::{
        cart, cart_discount, cart_item, product, Cart, CartDiscount, CartItem, CartModel,
        CartStatus, Customer, DiscountCode, DiscountCodeModel, DiscountType, Product,
        ProductStatus, ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        discounts::DiscountService,
        pricing::{evaluate_discount, PriceQuote, PricingEngine, PricingInput, PricingLine},
        tax::Destination,
    },
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use sea_orm::{ConnectionTrait, Set};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCartRequest {
    pub customer_id: Option<Uuid>,
    /// Contact email for guest checkouts
    #[validate(email(message = "Email address is not valid"))]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddItemRequest {
    pub variant_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateItemQuantityRequest {
    /// Zero removes the line
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: i32,
}

/// Cart with its lines and attached codes
#[derive(Debug, Clone, Serialize)]
pub struct CartWithItems {
    pub cart: CartModel,
    pub items: Vec<cart_item::Model>,
    pub discounts: Vec<cart_discount::Model>,
}

/// Cart together with the totals it would check out at right now
#[derive(Debug, Clone, Serialize)]
pub struct PricedCart {
    pub cart: CartModel,
    pub items: Vec<cart_item::Model>,
    pub quote: PriceQuote,
}

/// What a single code would do to a cart, judged in isolation
#[derive(Debug, Clone, Serialize)]
pub struct DiscountPreview {
    pub code: String,
    pub eligible: bool,
    pub amount_off: Decimal,
    pub free_shipping: bool,
    /// Shopper-facing explanation when the code does not qualify
    pub reason: Option<String>,
}

/// Rejects mutations against a cart that already checked out or sat idle
/// past its expiry.
pub(crate) fn ensure_open(cart: &CartModel, now: DateTime<Utc>) -> Result<(), ServiceError> {
    if cart.status != CartStatus::Active {
        return Err(ServiceError::InvalidOperation(format!(
            "Cart {} is no longer active",
            cart.id
        )));
    }
    if cart.expires_at <= now {
        return Err(ServiceError::InvalidOperation(format!(
            "Cart {} has expired",
            cart.id
        )));
    }
    Ok(())
}

/// Service for managing shopping carts.
///
/// Carts never persist totals; [`CartService::price`] recomputes them
/// from the lines, the attached codes and the current shipping and tax
/// policy on every call.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    discounts: DiscountService,
    pricing: Arc<PricingEngine>,
    cart_expiry_days: i64,
}

impl CartService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        discounts: DiscountService,
        pricing: Arc<PricingEngine>,
        cart_expiry_days: i64,
    ) -> Self {
        Self {
            db,
            event_sender,
            discounts,
            pricing,
            cart_expiry_days,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn create_cart(&self, request: CreateCartRequest) -> Result<CartModel, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        if let Some(customer_id) = request.customer_id {
            Customer::find_by_id(customer_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Customer {} not found", customer_id))
                })?;
        }

        let now = Utc::now();
        let model = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(request.customer_id),
            email: Set(request.email),
            currency: Set(self.pricing.currency().to_string()),
            status: Set(CartStatus::Active),
            expires_at: Set(now + Duration::days(self.cart_expiry_days)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartCreated(created.id))
            .await;

        info!(cart_id = %created.id, "Cart created");
        Ok(created)
    }

    /// Retrieves a cart with its lines and attached discount codes.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let cart = self.get_cart_model(cart_id).await?;
        let items = self.items_of(&cart).await?;
        let discounts = self.attached_discounts(cart_id).await?;

        Ok(CartWithItems {
            cart,
            items,
            discounts,
        })
    }

    /// Retrieves a cart without loading its items.
    pub async fn get_cart_model(&self, cart_id: Uuid) -> Result<CartModel, ServiceError> {
        Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))
    }

    /// Adds a variant to the cart, merging into an existing line.
    ///
    /// The variant's current price is snapshotted onto the line the first
    /// time it is added; merging more quantity keeps that snapshot.
    #[instrument(skip(self, request), fields(cart_id = %cart_id, variant_id = %request.variant_id))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        request: AddItemRequest,
    ) -> Result<cart_item::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let now = Utc::now();
        let cart = self.get_cart_model(cart_id).await?;
        ensure_open(&cart, now)?;

        let variant = ProductVariant::find_by_id(request.variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product variant {} not found", request.variant_id))
            })?;

        let parent = Product::find_by_id(variant.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", variant.product_id))
            })?;
        if parent.status != ProductStatus::Active {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is not available for purchase",
                parent.name
            )));
        }

        let txn = self.db.begin().await?;

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .filter(cart_item::Column::VariantId.eq(request.variant_id))
            .one(&txn)
            .await?;

        let item = match existing {
            Some(item) => {
                let quantity = item.quantity + request.quantity;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(quantity);
                active.updated_at = Set(now);
                active.update(&txn).await?
            }
            None => {
                let model = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart_id),
                    product_id: Set(variant.product_id),
                    variant_id: Set(variant.id),
                    quantity: Set(request.quantity),
                    unit_price: Set(variant.price),
                    created_at: Set(now),
                    updated_at: Set(now),
                };
                model.insert(&txn).await?
            }
        };

        self.touch(&txn, cart, now).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id,
                variant_id: request.variant_id,
            })
            .await;

        info!(item_id = %item.id, quantity = item.quantity, "Cart item added");
        Ok(item)
    }

    /// Changes a line's quantity; zero removes the line entirely.
    #[instrument(skip(self, request), fields(cart_id = %cart_id, item_id = %item_id))]
    pub async fn update_item_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        request: UpdateItemQuantityRequest,
    ) -> Result<Option<cart_item::Model>, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let now = Utc::now();
        let cart = self.get_cart_model(cart_id).await?;
        ensure_open(&cart, now)?;
        let item = self.get_item(cart_id, item_id).await?;

        if request.quantity == 0 {
            let txn = self.db.begin().await?;
            item.delete(&txn).await?;
            self.touch(&txn, cart, now).await?;
            txn.commit().await?;

            self.event_sender
                .send_or_log(Event::CartItemRemoved { cart_id, item_id })
                .await;
            return Ok(None);
        }

        let txn = self.db.begin().await?;
        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(request.quantity);
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;
        self.touch(&txn, cart, now).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated { cart_id, item_id })
            .await;

        Ok(Some(updated))
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, item_id = %item_id))]
    pub async fn remove_item(&self, cart_id: Uuid, item_id: Uuid) -> Result<(), ServiceError> {
        let now = Utc::now();
        let cart = self.get_cart_model(cart_id).await?;
        ensure_open(&cart, now)?;
        let item = self.get_item(cart_id, item_id).await?;

        let txn = self.db.begin().await?;
        item.delete(&txn).await?;
        self.touch(&txn, cart, now).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { cart_id, item_id })
            .await;

        info!("Cart item removed");
        Ok(())
    }

    /// Empties the cart. Attached discount codes stay attached; whether
    /// they still apply is decided when the cart is priced again.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        let now = Utc::now();
        let cart = self.get_cart_model(cart_id).await?;
        ensure_open(&cart, now)?;

        let txn = self.db.begin().await?;
        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(cart_id))
            .exec(&txn)
            .await?;
        self.touch(&txn, cart, now).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart_id))
            .await;

        info!("Cart cleared");
        Ok(())
    }

    /// Attaches a discount code to the cart.
    ///
    /// Liveness is checked here so the customer hears about a dead code
    /// right away: the code must exist, be active, be inside its validity
    /// window, and have redemptions left both globally and for this
    /// customer. Whether the cart actually qualifies (minimum purchase,
    /// scope) is evaluated at pricing time, because the answer changes as
    /// the cart changes.
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn apply_discount(
        &self,
        cart_id: Uuid,
        code: &str,
    ) -> Result<cart_discount::Model, ServiceError> {
        let now = Utc::now();
        let cart = self.get_cart_model(cart_id).await?;
        ensure_open(&cart, now)?;

        let discount = self
            .discounts
            .get_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", code)))?;

        if !discount.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Code {} is not active",
                discount.code
            )));
        }
        if !discount.is_started_by(now) {
            return Err(ServiceError::InvalidOperation(format!(
                "Code {} is not active yet",
                discount.code
            )));
        }
        if discount.is_expired_at(now) {
            return Err(ServiceError::InvalidOperation(format!(
                "Code {} has expired",
                discount.code
            )));
        }
        if !discount.has_remaining_uses() {
            return Err(ServiceError::InvalidOperation(format!(
                "Code {} has been fully redeemed",
                discount.code
            )));
        }
        self.discounts
            .ensure_customer_allowance(&discount, cart.customer_id, cart.email.as_deref())
            .await?;

        let already_attached = CartDiscount::find()
            .filter(cart_discount::Column::CartId.eq(cart_id))
            .filter(cart_discount::Column::DiscountId.eq(discount.id))
            .one(&*self.db)
            .await?;
        if already_attached.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Code {} is already applied to this cart",
                discount.code
            )));
        }

        let txn = self.db.begin().await?;
        let model = cart_discount::ActiveModel {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart_id),
            discount_id: Set(discount.id),
            code: Set(discount.code.clone()),
            applied_at: Set(now),
        };
        let attached = model.insert(&txn).await?;
        self.touch(&txn, cart, now).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::DiscountApplied {
                cart_id,
                discount_id: discount.id,
                code: discount.code.clone(),
            })
            .await;

        info!(discount_id = %discount.id, code = %discount.code, "Discount applied to cart");
        Ok(attached)
    }

    #[instrument(skip(self), fields(cart_id = %cart_id, discount_id = %discount_id))]
    pub async fn remove_discount(
        &self,
        cart_id: Uuid,
        discount_id: Uuid,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let cart = self.get_cart_model(cart_id).await?;
        ensure_open(&cart, now)?;

        let attached = CartDiscount::find()
            .filter(cart_discount::Column::CartId.eq(cart_id))
            .filter(cart_discount::Column::DiscountId.eq(discount_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Discount {} is not applied to cart {}",
                    discount_id, cart_id
                ))
            })?;

        let txn = self.db.begin().await?;
        attached.delete(&txn).await?;
        self.touch(&txn, cart, now).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::DiscountRemoved {
                cart_id,
                discount_id,
            })
            .await;

        info!("Discount removed from cart");
        Ok(())
    }

    /// Answers what a code would do to this cart without attaching it.
    ///
    /// The code is judged on its own, not against the other attached
    /// codes, so the answer is "would this code qualify", not "would it
    /// win the stacking contest".
    #[instrument(skip(self), fields(cart_id = %cart_id))]
    pub async fn preview_discount(
        &self,
        cart_id: Uuid,
        code: &str,
    ) -> Result<DiscountPreview, ServiceError> {
        let now = Utc::now();
        let cart = self.get_cart_model(cart_id).await?;

        let discount = self
            .discounts
            .get_by_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Discount code {} not found", code)))?;

        if let Err(err) = self
            .discounts
            .ensure_customer_allowance(&discount, cart.customer_id, cart.email.as_deref())
            .await
        {
            let reason = match err {
                ServiceError::InvalidOperation(message) => message,
                other => return Err(other),
            };
            return Ok(DiscountPreview {
                code: discount.code,
                eligible: false,
                amount_off: Decimal::ZERO,
                free_shipping: false,
                reason: Some(reason),
            });
        }

        let items = self.items_of(&cart).await?;
        let input = self.pricing_input(&cart, &items).await?;
        let evaluation = evaluate_discount(&discount, &input, now);

        Ok(DiscountPreview {
            code: discount.code,
            eligible: evaluation.eligible,
            amount_off: evaluation.amount_off,
            free_shipping: evaluation.eligible
                && discount.discount_type == DiscountType::FreeShipping,
            reason: evaluation.reason.map(|reason| reason.to_string()),
        })
    }

    /// Prices the cart as it stands.
    ///
    /// Attached codes that no longer qualify show up in the quote's
    /// rejected list with the reason; they are not silently dropped from
    /// the cart.
    #[instrument(skip(self, destination), fields(cart_id = %cart_id))]
    pub async fn price(
        &self,
        cart_id: Uuid,
        destination: Option<&Destination>,
    ) -> Result<PricedCart, ServiceError> {
        let cart = self.get_cart_model(cart_id).await?;
        let items = self.items_of(&cart).await?;
        let codes = self.attached_codes(cart_id).await?;
        let input = self.pricing_input(&cart, &items).await?;

        // Rounding happens here, at the display and persistence boundary;
        // the engine itself works on exact values.
        let quote = self
            .pricing
            .quote(&input, &codes, destination, Utc::now())
            .await
            .rounded();

        Ok(PricedCart {
            cart,
            items,
            quote,
        })
    }

    /// Marks a cart converted on the caller's transaction, as part of
    /// turning it into an order.
    pub async fn mark_converted_in_txn<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: CartModel,
    ) -> Result<CartModel, ServiceError> {
        let mut active: cart::ActiveModel = cart.into();
        active.status = Set(CartStatus::Converted);
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }

    /// The discount code rows attached to a cart
    pub async fn attached_codes(
        &self,
        cart_id: Uuid,
    ) -> Result<Vec<DiscountCodeModel>, ServiceError> {
        let attached = self.attached_discounts(cart_id).await?;
        if attached.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = attached.iter().map(|a| a.discount_id).collect();
        Ok(DiscountCode::find()
            .filter(crate::entities::discount_code::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?)
    }

    /// Builds the pricing view of the cart's lines. Category ids come from
    /// the parent products so category-scoped codes can match.
    pub async fn pricing_input(
        &self,
        cart: &CartModel,
        items: &[cart_item::Model],
    ) -> Result<PricingInput, ServiceError> {
        let product_ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
        let products = Product::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&*self.db)
            .await?;
        let category_by_product: HashMap<Uuid, Option<Uuid>> = products
            .iter()
            .map(|product| (product.id, product.category_id))
            .collect();

        let lines = items
            .iter()
            .map(|item| PricingLine {
                product_id: item.product_id,
                variant_id: item.variant_id,
                category_id: category_by_product
                    .get(&item.product_id)
                    .copied()
                    .flatten(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        Ok(PricingInput {
            lines,
            customer_id: cart.customer_id,
        })
    }

    async fn items_of(&self, cart: &CartModel) -> Result<Vec<cart_item::Model>, ServiceError> {
        Ok(cart
            .find_related(CartItem)
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn attached_discounts(
        &self,
        cart_id: Uuid,
    ) -> Result<Vec<cart_discount::Model>, ServiceError> {
        Ok(CartDiscount::find()
            .filter(cart_discount::Column::CartId.eq(cart_id))
            .order_by_asc(cart_discount::Column::AppliedAt)
            .all(&*self.db)
            .await?)
    }

    async fn get_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<cart_item::Model, ServiceError> {
        CartItem::find_by_id(item_id)
            .filter(cart_item::Column::CartId.eq(cart_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Item {} not found in cart {}", item_id, cart_id))
            })
    }

    /// Bumps the activity timestamps; every touch pushes expiry out again
    async fn touch<C: ConnectionTrait>(
        &self,
        conn: &C,
        cart: CartModel,
        now: DateTime<Utc>,
    ) -> Result<CartModel, ServiceError> {
        let mut active: cart::ActiveModel = cart.into();
        active.updated_at = Set(now);
        active.expires_at = Set(now + Duration::days(self.cart_expiry_days));
        Ok(active.update(conn).await?)
    }
}
