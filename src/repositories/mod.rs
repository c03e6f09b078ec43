//! Storage capabilities consumed by the services.
//!
//! Every service receives a [`StoreContext`] explicitly; nothing here is global. Two
//! backends implement the traits: SeaORM (`*_repository` modules) and an in-process map
//! store ([`in_memory`]) used by tests and local runs.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::{cart, cart_item, order, order_item, product, OrderStatus, PaymentMethod};
use crate::errors::ServiceError;
use crate::services::commerce::{OrderTotals, ShippingAddress};

pub mod cart_repository;
pub mod in_memory;
pub mod order_repository;
pub mod product_repository;

pub use cart_repository::SeaOrmCartRepository;
pub use in_memory::{InMemoryCartRepository, InMemoryOrderRepository, InMemoryProductRepository};
pub use order_repository::SeaOrmOrderRepository;
pub use product_repository::SeaOrmProductRepository;

/// Cart with its line items in display order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartWithItems {
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
}

impl CartWithItems {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item_for(&self, product_id: Uuid) -> Option<&cart_item::Model> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// Sum of price snapshot × quantity over all lines, unrounded
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(cart_item::Model::line_total).sum()
    }
}

/// Order header with its line snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

/// Snapshot of one purchased line, captured before the order is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrderLine {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub price: Decimal,
    pub image_url: Option<String>,
}

/// Everything needed to persist an order; the store assigns ids and timestamps
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub payment_method: PaymentMethod,
    pub shipping_address: ShippingAddress,
    pub totals: OrderTotals,
    pub lines: Vec<NewOrderLine>,
}

/// Outcome of the conditional stock decrement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDecrement {
    /// Stock was at least the requested quantity and has been reduced
    Applied,
    /// Stock was below the requested quantity (or the product is gone); nothing changed
    Rejected,
}

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<CartWithItems>, ServiceError>;

    async fn create(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError>;

    /// Persists the cart and replaces its line items with `cart.items`, renumbering
    /// positions in vector order.
    async fn save(&self, cart: &CartWithItems) -> Result<CartWithItems, ServiceError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError>;

    async fn insert(&self, product: product::Model) -> Result<product::Model, ServiceError>;

    /// Updates descriptive fields and the active flag. Stock is left untouched; it only
    /// moves through the two stock primitives below.
    async fn update(&self, product: product::Model) -> Result<product::Model, ServiceError>;

    /// Atomically: if stock >= quantity, stock -= quantity.
    async fn conditionally_decrement_stock(
        &self,
        id: Uuid,
        quantity: i32,
    ) -> Result<StockDecrement, ServiceError>;

    /// Atomically adds `quantity` back. Used for compensation and restocking.
    async fn restore_stock(&self, id: Uuid, quantity: i32) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: NewOrder) -> Result<OrderWithItems, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderWithItems>, ServiceError>;

    /// Orders for a user, newest first
    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError>;

    /// Writes the mutable columns (status, payment, delivery and reconciliation fields),
    /// but only while the stored status still equals `expected_status`. Returns `None`
    /// when the order is gone or its status has moved on; nothing is written then.
    async fn update_if_status(
        &self,
        order: order::Model,
        expected_status: OrderStatus,
    ) -> Result<Option<order::Model>, ServiceError>;

    /// Removes an order and its lines. Only used to roll back a failed checkout.
    async fn delete(&self, id: Uuid) -> Result<(), ServiceError>;
}

/// Storage handle threaded through every service
#[derive(Clone)]
pub struct StoreContext {
    pub carts: Arc<dyn CartRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
}

impl StoreContext {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
    ) -> Self {
        Self {
            carts,
            products,
            orders,
        }
    }

    /// Repositories backed by a SeaORM connection pool
    pub fn sea_orm(db: Arc<DatabaseConnection>) -> Self {
        Self::new(
            Arc::new(SeaOrmCartRepository::new(db.clone())),
            Arc::new(SeaOrmProductRepository::new(db.clone())),
            Arc::new(SeaOrmOrderRepository::new(db)),
        )
    }

    /// Fresh, empty in-process repositories
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryCartRepository::new()),
            Arc::new(InMemoryProductRepository::new()),
            Arc::new(InMemoryOrderRepository::new()),
        )
    }
}

/// Human-facing order number derived from the order id
pub(crate) fn order_number_for(order_id: Uuid) -> String {
    let simple = order_id.simple().to_string();
    format!("ORD-{}", simple[..8].to_uppercase())
}
