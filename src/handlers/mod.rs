pub mod carts;
pub mod checkout;
pub mod customers;
pub mod discounts;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::carts::CartService;
use crate::services::catalog::CatalogService;
use crate::services::checkout::CheckoutService;
use crate::services::customers::CustomerService;
use crate::services::discounts::DiscountService;
use crate::services::inventory::InventoryService;
use crate::services::orders::OrderService;
use crate::services::payments::{PaymentGateway, PaymentService};
use crate::services::pricing::PricingEngine;
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub customers: Arc<CustomerService>,
    pub discounts: Arc<DiscountService>,
    pub inventory: Arc<InventoryService>,
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub checkout: Arc<CheckoutService>,
}

impl AppServices {
    /// Builds the service graph.
    ///
    /// The payment gateway is injected rather than constructed here so
    /// tests can point checkout at a stub without standing up HTTP.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: &AppConfig,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let pricing = Arc::new(PricingEngine::from_config(config));

        let catalog = CatalogService::new(db_pool.clone(), event_sender.clone());
        let customers = CustomerService::new(db_pool.clone(), event_sender.clone());
        let discounts = DiscountService::new(db_pool.clone(), event_sender.clone());
        let inventory = InventoryService::new(db_pool.clone(), event_sender.clone());
        let carts = CartService::new(
            db_pool.clone(),
            event_sender.clone(),
            discounts.clone(),
            pricing,
            config.cart_expiry_days,
        );
        let orders = OrderService::new(db_pool.clone(), event_sender.clone(), inventory.clone());
        let payments = PaymentService::new(db_pool.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            db_pool,
            event_sender,
            carts.clone(),
            discounts.clone(),
            inventory.clone(),
            orders.clone(),
            payments.clone(),
            gateway,
        );

        Self {
            catalog: Arc::new(catalog),
            customers: Arc::new(customers),
            discounts: Arc::new(discounts),
            inventory: Arc::new(inventory),
            carts: Arc::new(carts),
            orders: Arc::new(orders),
            payments: Arc::new(payments),
            checkout: Arc::new(checkout),
        }
    }
}
