#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use storefront_api::{
    config::AppConfig,
    entities::{cart_item, order, product, OrderStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{
        CartRepository, CartWithItems, InMemoryCartRepository, InMemoryOrderRepository,
        InMemoryProductRepository, NewOrder, OrderRepository, OrderWithItems, ProductRepository,
        StockDecrement, StoreContext,
    },
    services::commerce::{AddToCartInput, CreateProductInput, PlaceOrderInput, ShippingAddress},
    AppServices,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Services wired to fresh in-memory repositories, with the event stream kept for
/// assertions.
pub struct TestApp {
    pub store: StoreContext,
    pub services: AppServices,
    events: mpsc::Receiver<Event>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(StoreContext::in_memory())
    }

    /// In-memory carts and orders around a custom product repository
    pub fn with_products(products: Arc<dyn ProductRepository>) -> Self {
        Self::with_store(StoreContext::new(
            Arc::new(InMemoryCartRepository::new()),
            products,
            Arc::new(InMemoryOrderRepository::new()),
        ))
    }

    /// In-memory products and orders around a custom cart repository
    pub fn with_carts(carts: Arc<dyn CartRepository>) -> Self {
        Self::with_store(StoreContext::new(
            carts,
            Arc::new(InMemoryProductRepository::new()),
            Arc::new(InMemoryOrderRepository::new()),
        ))
    }

    /// In-memory carts and products around a custom order repository
    pub fn with_orders(orders: Arc<dyn OrderRepository>) -> Self {
        Self::with_store(StoreContext::new(
            Arc::new(InMemoryCartRepository::new()),
            Arc::new(InMemoryProductRepository::new()),
            orders,
        ))
    }

    pub fn with_store(store: StoreContext) -> Self {
        let cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        let (sender, events) = EventSender::channel(1024);
        let services = AppServices::new(store.clone(), sender, &cfg);
        Self {
            store,
            services,
            events,
        }
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        self.services
            .catalog
            .create_product(CreateProductInput {
                name: name.to_string(),
                description: None,
                price,
                stock,
                is_active: true,
                image_url: Some(format!("/images/{}.jpg", product::slugify(name))),
            })
            .await
            .expect("seed product")
    }

    pub async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, quantity: i32) {
        self.services
            .carts
            .add_item(user_id, AddToCartInput { product_id, quantity })
            .await
            .expect("add to cart");
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        self.store
            .products
            .find_by_id(product_id)
            .await
            .expect("find product")
            .expect("product exists")
            .stock
    }

    /// Everything published so far
    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }
}

pub fn shipping_address() -> ShippingAddress {
    ShippingAddress {
        full_name: "Grace Hopper".to_string(),
        address: "1 Navy Yard".to_string(),
        city: "Arlington".to_string(),
        postal_code: "22202".to_string(),
        country: "US".to_string(),
    }
}

pub fn place_order_input(payment_method: &str) -> PlaceOrderInput {
    PlaceOrderInput {
        shipping_address: shipping_address(),
        payment_method: payment_method.to_string(),
    }
}

/// Wraps the in-memory product store and lets a test interfere with stock between the
/// checkout's availability check and its decrement.
#[derive(Default)]
pub struct InterferingProductRepository {
    pub inner: InMemoryProductRepository,
    /// Units taken by a simulated competing buyer right before this product is decremented
    steal: Mutex<Option<(Uuid, i32)>>,
    fail_restores: AtomicBool,
}

impl InterferingProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next decrement of `product_id` is preceded by a competing purchase of
    /// `quantity` units.
    pub fn steal_before_decrement(&self, product_id: Uuid, quantity: i32) {
        *self.steal.lock().unwrap() = Some((product_id, quantity));
    }

    pub fn fail_restores(&self) {
        self.fail_restores.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProductRepository for InterferingProductRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        self.inner.find_by_id(id).await
    }

    async fn insert(&self, model: product::Model) -> Result<product::Model, ServiceError> {
        self.inner.insert(model).await
    }

    async fn update(&self, model: product::Model) -> Result<product::Model, ServiceError> {
        self.inner.update(model).await
    }

    async fn conditionally_decrement_stock(
        &self,
        id: Uuid,
        quantity: i32,
    ) -> Result<StockDecrement, ServiceError> {
        let steal = {
            let mut guard = self.steal.lock().unwrap();
            match *guard {
                Some((target, stolen)) if target == id => {
                    *guard = None;
                    Some(stolen)
                }
                _ => None,
            }
        };

        if let Some(stolen) = steal {
            self.inner.conditionally_decrement_stock(id, stolen).await?;
        }
        self.inner.conditionally_decrement_stock(id, quantity).await
    }

    async fn restore_stock(&self, id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        if self.fail_restores.load(Ordering::SeqCst) {
            return Err(ServiceError::InternalError(
                "stock store unavailable".to_string(),
            ));
        }
        self.inner.restore_stock(id, quantity).await
    }
}

/// Cart store where the user adds a line between checkout reading the cart and clearing it
#[derive(Default)]
pub struct LateAdditionCartRepository {
    pub inner: InMemoryCartRepository,
    late_line: Mutex<Option<(Uuid, i32, Decimal)>>,
    reads: AtomicUsize,
}

impl LateAdditionCartRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// On the second cart read, `quantity` of `product_id` is appended to the cart first.
    pub fn add_after_first_read(&self, product_id: Uuid, quantity: i32, unit_price: Decimal) {
        self.reads.store(0, Ordering::SeqCst);
        *self.late_line.lock().unwrap() = Some((product_id, quantity, unit_price));
    }
}

#[async_trait]
impl CartRepository for LateAdditionCartRepository {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<CartWithItems>, ServiceError> {
        let late = if self.reads.fetch_add(1, Ordering::SeqCst) == 1 {
            self.late_line.lock().unwrap().take()
        } else {
            None
        };

        if let Some((product_id, quantity, unit_price)) = late {
            if let Some(mut cart) = self.inner.find_by_user(user_id).await? {
                cart.items.push(cart_item::Model {
                    id: Uuid::new_v4(),
                    cart_id: cart.cart.id,
                    product_id,
                    position: 0,
                    quantity,
                    unit_price,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                });
                self.inner.save(&cart).await?;
            }
        }

        self.inner.find_by_user(user_id).await
    }

    async fn create(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        self.inner.create(user_id).await
    }

    async fn save(&self, cart: &CartWithItems) -> Result<CartWithItems, ServiceError> {
        self.inner.save(cart).await
    }
}

/// Order store whose reads are slow enough for two status changes to overlap
pub struct SlowOrderRepository {
    pub inner: InMemoryOrderRepository,
    read_delay: Duration,
}

impl SlowOrderRepository {
    pub fn new(read_delay: Duration) -> Self {
        Self {
            inner: InMemoryOrderRepository::new(),
            read_delay,
        }
    }
}

#[async_trait]
impl OrderRepository for SlowOrderRepository {
    async fn create(&self, order: NewOrder) -> Result<OrderWithItems, ServiceError> {
        self.inner.create(order).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderWithItems>, ServiceError> {
        let found = self.inner.find_by_id(id).await;
        tokio::time::sleep(self.read_delay).await;
        found
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        self.inner.find_by_user(user_id).await
    }

    async fn update_if_status(
        &self,
        order: order::Model,
        expected_status: OrderStatus,
    ) -> Result<Option<order::Model>, ServiceError> {
        self.inner.update_if_status(order, expected_status).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        self.inner.delete(id).await
    }
}
