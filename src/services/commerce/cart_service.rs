use crate::{
    entities::{cart_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::{CartWithItems, StoreContext},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Shopping cart service.
///
/// Every user owns exactly one cart. It is created lazily on first access and is never
/// deleted; checkout empties it and the same cart is reused afterwards.
///
/// Each line keeps the product price captured when the line was last added, and that
/// snapshot is what checkout charges.
///
/// # Examples
///
/// ```ignore
/// use storefront_api::services::commerce::{AddToCartInput, CartService};
///
/// let cart_service = CartService::new(store, event_sender);
///
/// let cart = cart_service
///     .add_item(user_id, AddToCartInput { product_id, quantity: 2 })
///     .await?;
/// ```
#[derive(Clone)]
pub struct CartService {
    store: StoreContext,
    event_sender: Arc<EventSender>,
}

impl CartService {
    /// Creates a new `CartService` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - Repositories for carts and products
    /// * `event_sender` - Event sender for publishing cart events
    pub fn new(store: StoreContext, event_sender: Arc<EventSender>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    /// Returns the user's cart, creating an empty one on first access.
    ///
    /// Publishes `CartCreated` when a cart had to be created.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        if let Some(cart) = self.store.carts.find_by_user(user_id).await? {
            return Ok(cart);
        }

        let cart = match self.store.carts.create(user_id).await {
            Ok(cart) => cart,
            // Another request created the cart between our read and insert.
            Err(create_err) => match self.store.carts.find_by_user(user_id).await? {
                Some(cart) => return Ok(cart),
                None => return Err(create_err),
            },
        };

        self.event_sender
            .send_or_log(Event::CartCreated {
                cart_id: cart.cart.id,
                user_id,
            })
            .await;

        info!(cart_id = %cart.cart.id, %user_id, "created cart");
        Ok(cart)
    }

    /// Adds a product to the cart, or increases the quantity of an existing line.
    ///
    /// The line's price snapshot is refreshed to the product's current price.
    ///
    /// # Returns
    ///
    /// * `Ok(CartWithItems)` - The updated cart
    /// * `Err(ServiceError::ValidationError)` - Quantity below 1
    /// * `Err(ServiceError::ProductUnavailable)` - Product missing or inactive
    /// * `Err(ServiceError::InsufficientStock)` - Merged quantity exceeds stock
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        input: AddToCartInput,
    ) -> Result<CartWithItems, ServiceError> {
        input.validate()?;

        let product = self.available_product(input.product_id).await?;
        let mut cart = self.get_cart(user_id).await?;
        let now = Utc::now();

        let quantity = match cart
            .items
            .iter_mut()
            .find(|item| item.product_id == input.product_id)
        {
            Some(item) => {
                let merged = item.quantity.saturating_add(input.quantity);
                ensure_in_stock(&product, merged)?;
                item.quantity = merged;
                item.unit_price = product.price;
                item.updated_at = now;
                merged
            }
            None => {
                ensure_in_stock(&product, input.quantity)?;
                let position = cart.items.len() as i32;
                cart.items.push(cart_item::Model {
                    id: Uuid::new_v4(),
                    cart_id: cart.cart.id,
                    product_id: product.id,
                    position,
                    quantity: input.quantity,
                    unit_price: product.price,
                    created_at: now,
                    updated_at: now,
                });
                input.quantity
            }
        };

        let cart = self.store.carts.save(&cart).await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                cart_id: cart.cart.id,
                product_id: product.id,
                quantity,
            })
            .await;

        info!(cart_id = %cart.cart.id, product_id = %product.id, quantity, "added item to cart");
        Ok(cart)
    }

    /// Sets the quantity of an existing line. The quantity must be at least 1 and within
    /// current stock; use [`remove_item`](Self::remove_item) to drop a line.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let mut cart = self.get_cart(user_id).await?;
        let item = cart
            .items
            .iter_mut()
            .find(|item| item.product_id == product_id)
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        let product = self.available_product(product_id).await?;
        ensure_in_stock(&product, quantity)?;

        item.quantity = quantity;
        item.updated_at = Utc::now();

        let cart = self.store.carts.save(&cart).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated {
                cart_id: cart.cart.id,
                product_id,
                quantity,
            })
            .await;

        Ok(cart)
    }

    /// Removes a line from the cart
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let mut cart = self.get_cart(user_id).await?;
        let before = cart.items.len();
        cart.items.retain(|item| item.product_id != product_id);

        if cart.items.len() == before {
            return Err(ServiceError::NotFound(format!(
                "Product {} is not in the cart",
                product_id
            )));
        }

        let cart = self.store.carts.save(&cart).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved {
                cart_id: cart.cart.id,
                product_id,
            })
            .await;

        Ok(cart)
    }

    /// Empties the cart; the cart itself persists
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let mut cart = self.get_cart(user_id).await?;
        cart.items.clear();

        let cart = self.store.carts.save(&cart).await?;

        self.event_sender
            .send_or_log(Event::CartCleared(cart.cart.id))
            .await;

        info!(cart_id = %cart.cart.id, "cleared cart");
        Ok(cart)
    }

    async fn available_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        match self.store.products.find_by_id(product_id).await? {
            Some(product) if product.is_active => Ok(product),
            Some(_) => {
                warn!(%product_id, "attempt to add inactive product to cart");
                Err(ServiceError::ProductUnavailable { product_id })
            }
            None => Err(ServiceError::ProductUnavailable { product_id }),
        }
    }
}

fn ensure_in_stock(product: &product::Model, requested: i32) -> Result<(), ServiceError> {
    if requested > product.stock {
        return Err(ServiceError::InsufficientStock {
            product_id: product.id,
            requested,
            available: product.stock,
        });
    }
    Ok(())
}

/// Input for adding a product to the cart
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}
