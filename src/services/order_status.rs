use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::{order, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{OrderWithItems, StoreContext},
};

/// Drives orders through `pending → processing → shipped → delivered`, with
/// `cancelled` reachable from every state before delivery.
#[derive(Clone)]
pub struct OrderStatusService {
    store: StoreContext,
    event_sender: Arc<EventSender>,
}

impl OrderStatusService {
    pub fn new(store: StoreContext, event_sender: Arc<EventSender>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    /// Fetches an order for its owner, or for any admin
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        requester: Uuid,
        is_admin: bool,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = self.load(order_id).await?;

        if order.order.user_id != requester && !is_admin {
            warn!(%order_id, %requester, "order access denied");
            return Err(ServiceError::Forbidden(format!(
                "Not allowed to view order {}",
                order_id
            )));
        }

        Ok(order)
    }

    /// Orders placed by a user, newest first
    #[instrument(skip(self))]
    pub async fn list_orders_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<order::Model>, ServiceError> {
        self.store.orders.find_by_user(user_id).await
    }

    /// Records payment and moves the order to processing
    #[instrument(skip(self))]
    pub async fn mark_paid(
        &self,
        order_id: Uuid,
        payment_reference: String,
    ) -> Result<order::Model, ServiceError> {
        if payment_reference.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Payment reference cannot be blank".to_string(),
            ));
        }

        let current = self.load(order_id).await?.order;
        if current.is_paid {
            return Err(ServiceError::InvalidStatusTransition {
                from: current.status,
                to: OrderStatus::Processing,
            });
        }

        let paid = order::Model {
            is_paid: true,
            paid_at: Some(Utc::now()),
            payment_reference: Some(payment_reference),
            ..current.clone()
        };
        self.transition(current, OrderStatus::Processing, paid)
            .await
    }

    #[instrument(skip(self))]
    pub async fn mark_shipped(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let current = self.load(order_id).await?.order;
        let unchanged = current.clone();
        self.transition(current, OrderStatus::Shipped, unchanged).await
    }

    /// Final state: sets the delivery flag and timestamp
    #[instrument(skip(self))]
    pub async fn mark_delivered(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let current = self.load(order_id).await?.order;
        let delivered = order::Model {
            is_delivered: true,
            delivered_at: Some(Utc::now()),
            ..current.clone()
        };
        self.transition(current, OrderStatus::Delivered, delivered)
            .await
    }

    /// Cancels an order. Stock is returned when the goods have not left the warehouse.
    #[instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        let OrderWithItems { order, items } = self.load(order_id).await?;
        let had_shipped = order.status == OrderStatus::Shipped;
        let unchanged = order.clone();

        let mut cancelled = self
            .transition(order, OrderStatus::Cancelled, unchanged)
            .await?;

        if had_shipped {
            return Ok(cancelled);
        }

        let mut restored_all = true;
        for item in &items {
            match self
                .store
                .products
                .restore_stock(item.product_id, item.quantity)
                .await
            {
                Ok(()) => {
                    self.event_sender
                        .send_or_log(Event::StockRestored {
                            product_id: item.product_id,
                            quantity: item.quantity,
                            order_id,
                        })
                        .await;
                }
                Err(e) => {
                    restored_all = false;
                    error!(%order_id, product_id = %item.product_id, error = %e, "failed to restore stock for cancelled order");
                }
            }
        }

        if !restored_all {
            match self
                .store
                .orders
                .update_if_status(
                    order::Model {
                        requires_reconciliation: true,
                        ..cancelled.clone()
                    },
                    OrderStatus::Cancelled,
                )
                .await?
            {
                Some(flagged) => cancelled = flagged,
                None => error!(%order_id, "cancelled order disappeared before it could be flagged"),
            }
            self.event_sender
                .send_or_log(Event::OrderFlaggedForReconciliation(order_id))
                .await;
        }

        Ok(cancelled)
    }

    async fn load(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        self.store
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Applies `changes` (status, payment and delivery columns) if `current` may move to
    /// `to` and nobody has moved it since it was read.
    async fn transition(
        &self,
        current: order::Model,
        to: OrderStatus,
        changes: order::Model,
    ) -> Result<order::Model, ServiceError> {
        let from = current.status;
        if !from.can_transition_to(to) {
            warn!(order_id = %current.id, %from, %to, "rejected status transition");
            return Err(ServiceError::InvalidStatusTransition { from, to });
        }

        let updated = self
            .store
            .orders
            .update_if_status(
                order::Model {
                    id: current.id,
                    status: to,
                    ..changes
                },
                from,
            )
            .await?;

        // Another caller moved the order first; report against the state it is in now.
        let Some(updated) = updated else {
            let latest = self.load(current.id).await?.order.status;
            warn!(order_id = %current.id, %from, current = %latest, %to, "order status changed concurrently");
            return Err(ServiceError::InvalidStatusTransition { from: latest, to });
        };

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id: updated.id,
                old_status: from,
                new_status: to,
            })
            .await;

        info!(order_id = %updated.id, %from, %to, "order status updated");
        Ok(updated)
    }
}
