use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Set,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{product, Product};
use crate::errors::ServiceError;

use super::{ProductRepository, StockDecrement};

/// Product storage on top of SeaORM
#[derive(Debug, Clone)]
pub struct SeaOrmProductRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmProductRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductRepository for SeaOrmProductRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<product::Model>, ServiceError> {
        Ok(Product::find_by_id(id).one(&*self.db).await?)
    }

    async fn insert(&self, model: product::Model) -> Result<product::Model, ServiceError> {
        let active = product::ActiveModel {
            id: Set(model.id),
            name: Set(model.name),
            slug: Set(model.slug),
            description: Set(model.description),
            price: Set(model.price),
            stock: Set(model.stock),
            is_active: Set(model.is_active),
            image_url: Set(model.image_url),
            created_at: Set(model.created_at),
            updated_at: Set(model.updated_at),
        };

        Ok(active.insert(&*self.db).await?)
    }

    async fn update(&self, model: product::Model) -> Result<product::Model, ServiceError> {
        let active = product::ActiveModel {
            id: Unchanged(model.id),
            name: Set(model.name),
            slug: Set(model.slug),
            description: Set(model.description),
            price: Set(model.price),
            stock: Unchanged(model.stock),
            is_active: Set(model.is_active),
            image_url: Set(model.image_url),
            created_at: Unchanged(model.created_at),
            updated_at: Set(Utc::now()),
        };

        Ok(active.update(&*self.db).await?)
    }

    async fn conditionally_decrement_stock(
        &self,
        id: Uuid,
        quantity: i32,
    ) -> Result<StockDecrement, ServiceError> {
        // Single guarded UPDATE; the row either had enough stock and was reduced, or
        // nothing happened.
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(&*self.db)
            .await?;

        debug!(product_id = %id, quantity, rows = result.rows_affected, "conditional stock decrement");

        Ok(if result.rows_affected == 1 {
            StockDecrement::Applied
        } else {
            StockDecrement::Rejected
        })
    }

    async fn restore_stock(&self, id: Uuid, quantity: i32) -> Result<(), ServiceError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(id))
            .filter(product::Column::Stock.lte(i32::MAX.saturating_sub(quantity)))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return match self.find_by_id(id).await? {
                Some(_) => Err(ServiceError::ValidationError(format!(
                    "Restoring {} units would overflow stock of product {}",
                    quantity, id
                ))),
                None => Err(ServiceError::NotFound(format!("Product {} not found", id))),
            };
        }
        Ok(())
    }
}
