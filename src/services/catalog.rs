use crate::{
    db::DbPool,
    entities::{
        product, product_variant, Product, ProductStatus, ProductVariant,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 255, message = "Slug must be 1 to 255 characters"))]
    pub slug: String,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    /// Products start as drafts unless created active
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub category_id: Option<Uuid>,
    pub status: Option<ProductStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateVariantInput {
    #[validate(length(min = 1, max = 64, message = "SKU must be 1 to 64 characters"))]
    pub sku: String,
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub position: i32,
}

/// Product with its sellable variants
#[derive(Debug, Clone, Serialize)]
pub struct ProductWithVariants {
    pub product: product::Model,
    pub variants: Vec<product_variant::Model>,
}

/// Service for managing the product catalog.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CatalogService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(slug = %input.slug))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let existing = Product::find()
            .filter(product::Column::Slug.eq(input.slug.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A product with slug {} already exists",
                input.slug
            )));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            slug: Set(input.slug),
            description: Set(input.description),
            category_id: Set(input.category_id),
            status: Set(if input.active {
                ProductStatus::Active
            } else {
                ProductStatus::Draft
            }),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;

        info!(product_id = %created.id, "Product created");
        Ok(created)
    }

    #[instrument(skip(self, input), fields(product_id = %product_id))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let current = self.get_product(product_id).await?;
        let mut active: product::ActiveModel = current.into();

        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(category_id) = input.category_id {
            active.category_id = Set(Some(category_id));
        }
        if let Some(status) = input.status {
            active.status = Set(status);
        }

        let updated = active.update(&*self.db).await?;
        info!("Product updated");
        Ok(updated)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get_product_with_variants(
        &self,
        product_id: Uuid,
    ) -> Result<ProductWithVariants, ServiceError> {
        let product = self.get_product(product_id).await?;
        let variants = product
            .find_related(ProductVariant)
            .order_by_asc(product_variant::Column::Position)
            .all(&*self.db)
            .await?;

        Ok(ProductWithVariants { product, variants })
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
        status: Option<ProductStatus>,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(product::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    /// Adds a sellable variant to a product.
    #[instrument(skip(self, input), fields(product_id = %product_id, sku = %input.sku))]
    pub async fn create_variant(
        &self,
        product_id: Uuid,
        input: CreateVariantInput,
    ) -> Result<product_variant::Model, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price cannot be negative".to_string(),
            ));
        }

        // Parent must exist before hanging a variant off it
        self.get_product(product_id).await?;
        self.ensure_unique_sku(&input.sku).await?;

        let now = Utc::now();
        let model = product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            sku: Set(input.sku),
            name: Set(input.name),
            price: Set(input.price),
            position: Set(input.position),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductVariantCreated {
                product_id,
                variant_id: created.id,
            })
            .await;

        info!(variant_id = %created.id, "Product variant created");
        Ok(created)
    }

    pub async fn get_variant(
        &self,
        variant_id: Uuid,
    ) -> Result<product_variant::Model, ServiceError> {
        ProductVariant::find_by_id(variant_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product variant {} not found", variant_id))
            })
    }

    async fn ensure_unique_sku(&self, sku: &str) -> Result<(), ServiceError> {
        let existing = ProductVariant::find()
            .filter(product_variant::Column::Sku.eq(sku))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "SKU {} is already in use",
                sku
            )));
        }
        Ok(())
    }
}
