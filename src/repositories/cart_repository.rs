use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{cart, cart_item, Cart, CartItem};
use crate::errors::ServiceError;

use super::{CartRepository, CartWithItems};

/// Cart storage on top of SeaORM
#[derive(Debug, Clone)]
pub struct SeaOrmCartRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCartRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CartRepository for SeaOrmCartRepository {
    async fn find_by_user(&self, user_id: Uuid) -> Result<Option<CartWithItems>, ServiceError> {
        let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let items = cart
            .find_related(CartItem)
            .order_by_asc(cart_item::Column::Position)
            .all(&*self.db)
            .await?;

        Ok(Some(CartWithItems { cart, items }))
    }

    async fn create(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let now = Utc::now();
        let cart = cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        Ok(CartWithItems {
            cart,
            items: Vec::new(),
        })
    }

    async fn save(&self, cart: &CartWithItems) -> Result<CartWithItems, ServiceError> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let mut header: cart::ActiveModel = cart.cart.clone().into();
        header.updated_at = Set(now);
        let header = header.update(&txn).await?;

        CartItem::delete_many()
            .filter(cart_item::Column::CartId.eq(header.id))
            .exec(&txn)
            .await?;

        let items: Vec<cart_item::Model> = cart
            .items
            .iter()
            .enumerate()
            .map(|(position, item)| cart_item::Model {
                cart_id: header.id,
                position: position as i32,
                ..item.clone()
            })
            .collect();

        if !items.is_empty() {
            let rows = items.iter().cloned().map(|item| cart_item::ActiveModel {
                id: Set(item.id),
                cart_id: Set(item.cart_id),
                product_id: Set(item.product_id),
                position: Set(item.position),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                created_at: Set(item.created_at),
                updated_at: Set(item.updated_at),
            });
            CartItem::insert_many(rows).exec(&txn).await?;
        }

        txn.commit().await?;

        debug!(cart_id = %header.id, lines = items.len(), "saved cart");
        Ok(CartWithItems {
            cart: header,
            items,
        })
    }
}
