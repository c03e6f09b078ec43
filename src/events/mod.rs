use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::errors::ServiceError;

/// Domain events published by the cart, checkout and order services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated { cart_id: Uuid, user_id: Uuid },
    CartItemAdded { cart_id: Uuid, product_id: Uuid, quantity: i32 },
    CartItemUpdated { cart_id: Uuid, product_id: Uuid, quantity: i32 },
    CartItemRemoved { cart_id: Uuid, product_id: Uuid },
    CartCleared(Uuid),

    // Product events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),

    // Stock events
    StockDecremented { product_id: Uuid, quantity: i32, order_id: Uuid },
    StockRestored { product_id: Uuid, quantity: i32, order_id: Uuid },

    // Order events
    OrderCreated(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderRolledBack(Uuid),
    OrderFlaggedForReconciliation(Uuid),
    CheckoutFailed { user_id: Uuid, reason: String },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a bounded channel and returns both ends
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    /// Event delivery never decides the outcome of a business operation.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Background consumer for domain events.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderFlaggedForReconciliation(order_id) => {
                error!(%order_id, "order requires manual reconciliation");
            }
            Event::CheckoutFailed { user_id, reason } => {
                warn!(%user_id, %reason, "checkout failed");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            other => {
                info!(event = ?other, "received event");
            }
        }
    }

    info!("Event processing loop stopped");
}
