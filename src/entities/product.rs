use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Product entity
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, Validate)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Product name
    #[validate(length(
        min = 1,
        max = 255,
        message = "Product name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// URL-safe identifier derived from the name
    pub slug: String,

    pub description: Option<String>,

    /// Current list price
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    #[validate(custom = "validate_price")]
    pub price: Decimal,

    /// Units available for purchase
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,

    /// Inactive products stay referenced by carts and orders but cannot be bought
    pub is_active: bool,

    /// Primary image, copied into order lines at purchase time
    pub image_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.is_active {
                active_model.is_active = Set(true);
            }

            let model: Model = active_model.clone().try_into().map_err(|_| {
                DbErr::Custom("Failed to convert ActiveModel to Model for validation".to_string())
            })?;

            if let Err(err) = model.validate() {
                return Err(DbErr::Custom(format!("Validation error: {}", err)));
            }
        }

        active_model.updated_at = Set(Utc::now());

        Ok(active_model)
    }
}

/// Largest accepted list price. Keeps `price × quantity` summed over a cart well inside
/// both `Decimal` and the `(16, 4)` money columns.
pub const MAX_PRICE: Decimal = dec!(1000000000);

/// Prices are whole cents in `[0, MAX_PRICE]`, so line snapshots sum exactly to the
/// rounded items price.
pub fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    let message = if price.is_sign_negative() && !price.is_zero() {
        "Price cannot be negative"
    } else if *price > MAX_PRICE {
        "Price exceeds the maximum of 1000000000"
    } else if price.normalize().scale() > 2 {
        "Price cannot have more than two decimal places"
    } else {
        return Ok(());
    };

    let mut err = ValidationError::new("price");
    err.message = Some(message.into());
    Err(err)
}

/// Lowercase, ASCII-alphanumeric words joined by single hyphens.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}
