use crate::{
    config::PricingConfig,
    entities::{order, OrderStatus, PaymentMethod},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{
        CartWithItems, NewOrder, NewOrderLine, OrderWithItems, StockDecrement, StoreContext,
    },
    services::commerce::pricing_service::calculate_totals,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Turns a user's cart into an order.
///
/// The pipeline runs strictly in order: input validation, cart read, per-line
/// availability check, pricing, order write, stock decrement, cart clear. The availability
/// check is only a pre-check; the decrement itself is conditional at the storage layer, and
/// an order whose stock cannot be reserved is compensated away before the error is returned.
#[derive(Clone)]
pub struct CheckoutService {
    store: StoreContext,
    event_sender: Arc<EventSender>,
    pricing: PricingConfig,
}

impl CheckoutService {
    pub fn new(store: StoreContext, event_sender: Arc<EventSender>, pricing: PricingConfig) -> Self {
        Self {
            store,
            event_sender,
            pricing,
        }
    }

    /// Place an order from the user's cart
    #[instrument(skip(self, input))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<OrderWithItems, ServiceError> {
        let result = self.run_pipeline(user_id, input).await;

        if let Err(e) = &result {
            warn!(error = %e, "checkout failed");
            self.event_sender
                .send_or_log(Event::CheckoutFailed {
                    user_id,
                    reason: e.code().to_string(),
                })
                .await;
        }

        result
    }

    async fn run_pipeline(
        &self,
        user_id: Uuid,
        input: PlaceOrderInput,
    ) -> Result<OrderWithItems, ServiceError> {
        input.shipping_address.check()?;
        let payment_method = parse_payment_method(&input.payment_method)?;

        let cart = match self.store.carts.find_by_user(user_id).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(ServiceError::EmptyCart),
        };

        let lines = self.validate_lines(&cart).await?;
        let totals = calculate_totals(lines.iter().map(|l| (l.price, l.quantity)), &self.pricing)?;

        let created = self
            .store
            .orders
            .create(NewOrder {
                user_id,
                payment_method,
                shipping_address: input.shipping_address,
                totals,
                lines: lines.clone(),
            })
            .await?;
        let order_id = created.order.id;

        self.reserve_stock(&created.order, &lines).await?;

        self.event_sender
            .send_or_log(Event::OrderCreated(order_id))
            .await;

        self.clear_purchased_lines(user_id, order_id, &lines).await;

        info!(
            %order_id,
            order_number = %created.order.order_number,
            total = %created.order.total_price,
            "order placed"
        );
        Ok(created)
    }

    /// Resolves every cart line against current product data
    async fn validate_lines(&self, cart: &CartWithItems) -> Result<Vec<NewOrderLine>, ServiceError> {
        let mut lines = Vec::with_capacity(cart.items.len());

        for item in &cart.items {
            let product = match self.store.products.find_by_id(item.product_id).await? {
                Some(product) if product.is_active => product,
                _ => {
                    return Err(ServiceError::ProductUnavailable {
                        product_id: item.product_id,
                    })
                }
            };

            if product.stock < item.quantity {
                return Err(ServiceError::InsufficientStock {
                    product_id: product.id,
                    requested: item.quantity,
                    available: product.stock,
                });
            }

            lines.push(NewOrderLine {
                product_id: product.id,
                name: product.name,
                quantity: item.quantity,
                price: item.unit_price,
                image_url: product.image_url,
            });
        }

        Ok(lines)
    }

    /// Takes the purchased quantities out of the user's current cart. Anything added while
    /// the order was being placed stays. The order stands even if this fails.
    async fn clear_purchased_lines(&self, user_id: Uuid, order_id: Uuid, purchased: &[NewOrderLine]) {
        let result: Result<Option<CartWithItems>, ServiceError> = async {
            let Some(mut cart) = self.store.carts.find_by_user(user_id).await? else {
                return Ok(None);
            };

            cart.items.retain_mut(|item| {
                match purchased.iter().find(|line| line.product_id == item.product_id) {
                    Some(line) if item.quantity > line.quantity => {
                        item.quantity -= line.quantity;
                        true
                    }
                    Some(_) => false,
                    None => true,
                }
            });

            self.store.carts.save(&cart).await.map(Some)
        }
        .await;

        match result {
            Ok(Some(cart)) => {
                self.event_sender
                    .send_or_log(Event::CartCleared(cart.cart.id))
                    .await;
            }
            Ok(None) => {}
            Err(e) => {
                error!(%order_id, %user_id, error = %e, "failed to clear cart after checkout");
            }
        }
    }

    /// Decrements stock line by line. The first rejection (or storage failure) undoes the
    /// decrements already applied and removes the order.
    async fn reserve_stock(
        &self,
        order: &order::Model,
        lines: &[NewOrderLine],
    ) -> Result<(), ServiceError> {
        let mut applied: Vec<&NewOrderLine> = Vec::with_capacity(lines.len());

        for line in lines {
            let failure = match self
                .store
                .products
                .conditionally_decrement_stock(line.product_id, line.quantity)
                .await
            {
                Ok(StockDecrement::Applied) => {
                    applied.push(line);
                    continue;
                }
                Ok(StockDecrement::Rejected) => ServiceError::StockConflict {
                    product_id: line.product_id,
                    requested: line.quantity,
                },
                Err(e) => e,
            };

            warn!(
                order_id = %order.id,
                product_id = %line.product_id,
                error = %failure,
                "stock reservation failed, compensating"
            );
            self.compensate(order, &applied).await;
            return Err(failure);
        }

        for line in applied {
            self.event_sender
                .send_or_log(Event::StockDecremented {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    order_id: order.id,
                })
                .await;
        }

        Ok(())
    }

    async fn compensate(&self, order: &order::Model, applied: &[&NewOrderLine]) {
        let mut restored_all = true;

        for line in applied.iter().rev() {
            match self
                .store
                .products
                .restore_stock(line.product_id, line.quantity)
                .await
            {
                Ok(()) => {
                    self.event_sender
                        .send_or_log(Event::StockRestored {
                            product_id: line.product_id,
                            quantity: line.quantity,
                            order_id: order.id,
                        })
                        .await;
                }
                Err(e) => {
                    restored_all = false;
                    error!(
                        order_id = %order.id,
                        product_id = %line.product_id,
                        quantity = line.quantity,
                        error = %e,
                        "failed to restore stock"
                    );
                }
            }
        }

        if restored_all {
            match self.store.orders.delete(order.id).await {
                Ok(()) => {
                    warn!(order_id = %order.id, "order rolled back");
                    self.event_sender
                        .send_or_log(Event::OrderRolledBack(order.id))
                        .await;
                    return;
                }
                Err(e) => {
                    error!(order_id = %order.id, error = %e, "failed to delete order during rollback");
                }
            }
        }

        self.flag_for_reconciliation(order).await;
    }

    async fn flag_for_reconciliation(&self, order: &order::Model) {
        let flagged = order::Model {
            status: OrderStatus::Cancelled,
            requires_reconciliation: true,
            ..order.clone()
        };

        match self.store.orders.update_if_status(flagged, order.status).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                error!(order_id = %order.id, "order changed before it could be flagged for reconciliation");
            }
            Err(e) => {
                error!(order_id = %order.id, error = %e, "failed to flag order for reconciliation");
            }
        }

        error!(order_id = %order.id, "order requires reconciliation");
        self.event_sender
            .send_or_log(Event::OrderFlaggedForReconciliation(order.id))
            .await;
    }
}

fn parse_payment_method(raw: &str) -> Result<PaymentMethod, ServiceError> {
    PaymentMethod::from_str(raw.trim())
        .map_err(|_| ServiceError::InvalidPaymentMethod(raw.to_string()))
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Destination copied onto the order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ShippingAddress {
    #[validate(custom = "validate_not_blank")]
    pub full_name: String,
    #[validate(custom = "validate_not_blank")]
    pub address: String,
    #[validate(custom = "validate_not_blank")]
    pub city: String,
    #[validate(custom = "validate_not_blank")]
    pub postal_code: String,
    #[validate(custom = "validate_not_blank")]
    pub country: String,
}

impl ShippingAddress {
    /// Validates every field, naming the blank ones in the error
    pub fn check(&self) -> Result<(), ServiceError> {
        self.validate().map_err(|errors| {
            let mut fields: Vec<&str> = errors.field_errors().keys().copied().collect();
            fields.sort_unstable();
            ServiceError::InvalidShippingAddress(format!(
                "missing or blank: {}",
                fields.join(", ")
            ))
        })
    }
}

/// Checkout request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderInput {
    pub shipping_address: ShippingAddress,
    /// One of `card`, `paypal`, `stripe`, `cash_on_delivery`
    pub payment_method: String,
}
