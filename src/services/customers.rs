use crate::{
    db::DbPool,
    entities::{customer, Customer, CustomerStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(email(message = "Email address is not valid"))]
    pub email: String,
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    pub last_name: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub accepts_marketing: bool,
}

/// Service for managing customer accounts.
#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let email = request.email.trim().to_lowercase();
        let existing = Customer::find()
            .filter(customer::Column::Email.eq(email.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "A customer with email {} already exists",
                email
            )));
        }

        let now = Utc::now();
        let model = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            email: Set(email),
            first_name: Set(request.first_name),
            last_name: Set(request.last_name),
            phone: Set(request.phone),
            accepts_marketing: Set(request.accepts_marketing),
            status: Set(CustomerStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CustomerCreated(created.id))
            .await;

        info!(customer_id = %created.id, "Customer created");
        Ok(created)
    }

    pub async fn get_customer(&self, customer_id: Uuid) -> Result<customer::Model, ServiceError> {
        Customer::find_by_id(customer_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Customer {} not found", customer_id)))
    }

    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<customer::Model>, u64), ServiceError> {
        let paginator = Customer::find()
            .order_by_desc(customer::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let customers = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((customers, total))
    }
}
