use crate::{
    entities::product::{self, slugify, validate_price},
    errors::ServiceError,
    events::{Event, EventSender},
    repositories::StoreContext,
};
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Product catalog service.
///
/// Stock is never written directly here: new stock arrives through `restock`, which uses
/// the same atomic increment as checkout compensation.
#[derive(Clone)]
pub struct ProductCatalogService {
    store: StoreContext,
    event_sender: Arc<EventSender>,
}

impl ProductCatalogService {
    pub fn new(store: StoreContext, event_sender: Arc<EventSender>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    /// Create a new product
    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let name = input.name.trim().to_string();
        let product = product::Model {
            id: Uuid::new_v4(),
            slug: slugify(&name),
            name,
            description: input.description,
            price: input.price,
            stock: input.stock,
            is_active: input.is_active,
            image_url: input.image_url,
            created_at: now,
            updated_at: now,
        };

        let product = self.store.products.insert(product).await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(product.id))
            .await;

        info!(product_id = %product.id, slug = %product.slug, "created product");
        Ok(product)
    }

    /// Get a product by ID
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        self.store
            .products
            .find_by_id(product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    /// Update descriptive fields; the slug follows the name
    #[instrument(skip(self))]
    pub async fn update_product(
        &self,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let mut product = self.get_product(product_id).await?;

        if let Some(name) = input.name {
            product.name = name.trim().to_string();
            product.slug = slugify(&product.name);
        }
        if let Some(description) = input.description {
            product.description = Some(description);
        }
        if let Some(price) = input.price {
            product.price = price;
        }
        if let Some(image_url) = input.image_url {
            product.image_url = Some(image_url);
        }

        let product = self.store.products.update(product).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product.id))
            .await;

        Ok(product)
    }

    /// Activate or deactivate a product. Inactive products cannot be added to carts or
    /// checked out.
    #[instrument(skip(self))]
    pub async fn set_active(
        &self,
        product_id: Uuid,
        is_active: bool,
    ) -> Result<product::Model, ServiceError> {
        let product = self.get_product(product_id).await?;
        let product = self
            .store
            .products
            .update(product::Model {
                is_active,
                ..product
            })
            .await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product.id))
            .await;

        info!(%product_id, is_active, "product availability changed");
        Ok(product)
    }

    /// Add units to stock
    #[instrument(skip(self))]
    pub async fn restock(
        &self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<product::Model, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::ValidationError(
                "Restock quantity must be at least 1".to_string(),
            ));
        }

        self.store.products.restore_stock(product_id, quantity).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;

        self.get_product(product_id).await
    }
}

fn validate_product_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        let mut err = ValidationError::new("name");
        err.message = Some("Product name cannot be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Input for creating a product
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(
        length(max = 255, message = "Product name cannot exceed 255 characters"),
        custom = "validate_product_name"
    )]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub image_url: Option<String>,
}

fn default_active() -> bool {
    true
}

/// Partial update of a product's descriptive fields
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(
        length(max = 255, message = "Product name cannot exceed 255 characters"),
        custom = "validate_product_name"
    )]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    pub price: Option<Decimal>,
    pub image_url: Option<String>,
}
