//! In-process repositories backed by `DashMap`.
//!
//! Each map entry is guarded by its shard lock, so a check-and-write performed while
//! holding `get_mut` is atomic with respect to every other caller. That is the property
//! the conditional stock decrement relies on.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{cart, cart_item, order, order_item, product, OrderStatus};
use crate::errors::ServiceError;

use super::{
    order_number_for, CartRepository, CartWithItems, NewOrder, OrderRepository, OrderWithItems,
    ProductRepository, StockDecrement,
};

/// Carts keyed by owning user
#[derive(Debug, Default)]
pub struct InMemoryCartRepository {
    carts: DashMap<Uuid, CartWithItems>,
}

impl InMemoryCartRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<CartWithItems>, ServiceError> {
        Ok(self.carts.get(&user_id).map(|entry| entry.value().clone()))
    }

    async fn create(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let entry = self.carts.entry(user_id).or_insert_with(|| {
            let now = Utc::now();
            CartWithItems {
                cart: cart::Model {
                    id: Uuid::new_v4(),
                    user_id,
                    created_at: now,
                    updated_at: now,
                },
                items: Vec::new(),
            }
        });
        Ok(entry.value().clone())
    }

    async fn save(&self, cart: &CartWithItems) -> Result<CartWithItems, ServiceError> {
        let mut entry = self
            .carts
            .get_mut(&cart.cart.user_id)
            .filter(|entry| entry.cart.id == cart.cart.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart.cart.id)))?;

        let now = Utc::now();
        let header = cart::Model {
            updated_at: now,
            ..cart.cart.clone()
        };
        let items = cart
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| cart_item::Model {
                cart_id: header.id,
                position: position as i32,
                ..item.clone()
            })
            .collect();

        *entry = CartWithItems {
            cart: header,
            items,
        };
        Ok(entry.clone())
    }
}

/// Products keyed by id
#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    products: DashMap<Uuid, product::Model>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(self.products.get(&id).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, model: product::Model) -> Result<product::Model, ServiceError> {
        model.validate()?;

        match self.products.entry(model.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ServiceError::ValidationError(
                format!("Product {} already exists", model.id),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => Ok(slot.insert(model).clone()),
        }
    }

    async fn update(&self, model: product::Model) -> Result<product::Model, ServiceError> {
        let mut entry = self
            .products
            .get_mut(&model.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", model.id)))?;

        let updated = product::Model {
            stock: entry.stock,
            created_at: entry.created_at,
            updated_at: Utc::now(),
            ..model
        };
        *entry = updated.clone();
        Ok(updated)
    }

    async fn conditionally_decrement_stock(
        &self,
        id: Uuid,
        quantity: i32,
    ) -> Result<StockDecrement, ServiceError> {
        match self.products.get_mut(&id) {
            Some(mut entry) if entry.stock >= quantity => {
                entry.stock -= quantity;
                entry.updated_at = Utc::now();
                Ok(StockDecrement::Applied)
            }
            _ => Ok(StockDecrement::Rejected),
        }
    }

    async fn restore_stock(&self, id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let mut entry = self
            .products
            .get_mut(&id)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;
        entry.stock = entry.stock.checked_add(quantity).ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "Restoring {} units would overflow stock of product {}",
                quantity, id
            ))
        })?;
        entry.updated_at = Utc::now();
        Ok(())
    }
}

/// Orders keyed by id
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<Uuid, OrderWithItems>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, new_order: NewOrder) -> Result<OrderWithItems, ServiceError> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let address = new_order.shipping_address;
        let totals = new_order.totals;

        let order = order::Model {
            id: order_id,
            order_number: order_number_for(order_id),
            user_id: new_order.user_id,
            status: OrderStatus::Pending,
            payment_method: new_order.payment_method,
            shipping_full_name: address.full_name,
            shipping_address: address.address,
            shipping_city: address.city,
            shipping_postal_code: address.postal_code,
            shipping_country: address.country,
            items_price: totals.items_price,
            tax_price: totals.tax_price,
            shipping_price: totals.shipping_price,
            total_price: totals.total_price,
            is_paid: false,
            paid_at: None,
            payment_reference: None,
            is_delivered: false,
            delivered_at: None,
            requires_reconciliation: false,
            created_at: now,
            updated_at: now,
        };

        let items = new_order
            .lines
            .into_iter()
            .enumerate()
            .map(|(position, line)| order_item::Model {
                id: Uuid::new_v4(),
                order_id,
                product_id: line.product_id,
                name: line.name,
                quantity: line.quantity,
                price: line.price,
                image_url: line.image_url,
                position: position as i32,
                created_at: now,
            })
            .collect();

        let created = OrderWithItems { order, items };
        self.orders.insert(order_id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderWithItems>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        let mut orders: Vec<order::Model> = self
            .orders
            .iter()
            .filter(|entry| entry.order.user_id == user_id)
            .map(|entry| entry.order.clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_if_status(
        &self,
        model: order::Model,
        expected_status: OrderStatus,
    ) -> Result<Option<order::Model>, ServiceError> {
        let Some(mut entry) = self.orders.get_mut(&model.id) else {
            return Ok(None);
        };

        let current = &mut entry.order;
        if current.status != expected_status {
            return Ok(None);
        }

        current.status = model.status;
        current.is_paid = model.is_paid;
        current.paid_at = model.paid_at;
        current.payment_reference = model.payment_reference;
        current.is_delivered = model.is_delivered;
        current.delivered_at = model.delivered_at;
        current.requires_reconciliation = model.requires_reconciliation;
        current.updated_at = Utc::now();

        Ok(Some(current.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.orders
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }
}
