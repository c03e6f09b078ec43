use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::{order, order_item, Order, OrderItem, OrderStatus};
use crate::errors::ServiceError;

use super::{order_number_for, NewOrder, OrderRepository, OrderWithItems};

/// Order storage on top of SeaORM
#[derive(Debug, Clone)]
pub struct SeaOrmOrderRepository {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderRepository for SeaOrmOrderRepository {
    async fn create(&self, new_order: NewOrder) -> Result<OrderWithItems, ServiceError> {
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let address = new_order.shipping_address;
        let totals = new_order.totals;

        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number_for(order_id)),
            user_id: Set(new_order.user_id),
            status: Set(OrderStatus::Pending),
            payment_method: Set(new_order.payment_method),
            shipping_full_name: Set(address.full_name),
            shipping_address: Set(address.address),
            shipping_city: Set(address.city),
            shipping_postal_code: Set(address.postal_code),
            shipping_country: Set(address.country),
            items_price: Set(totals.items_price),
            tax_price: Set(totals.tax_price),
            shipping_price: Set(totals.shipping_price),
            total_price: Set(totals.total_price),
            is_paid: Set(false),
            paid_at: Set(None),
            payment_reference: Set(None),
            is_delivered: Set(false),
            delivered_at: Set(None),
            requires_reconciliation: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(new_order.lines.len());
        for (position, line) in new_order.lines.into_iter().enumerate() {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                name: Set(line.name),
                quantity: Set(line.quantity),
                price: Set(line.price),
                image_url: Set(line.image_url),
                position: Set(position as i32),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);
        }

        txn.commit().await?;

        Ok(OrderWithItems { order, items })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<OrderWithItems>, ServiceError> {
        let Some(order) = Order::find_by_id(id).one(&*self.db).await? else {
            return Ok(None);
        };

        let items = order
            .find_related(OrderItem)
            .order_by_asc(order_item::Column::Position)
            .all(&*self.db)
            .await?;

        Ok(Some(OrderWithItems { order, items }))
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<order::Model>, ServiceError> {
        Ok(Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    async fn update_if_status(
        &self,
        model: order::Model,
        expected_status: OrderStatus,
    ) -> Result<Option<order::Model>, ServiceError> {
        let changes = order::ActiveModel {
            status: Set(model.status),
            is_paid: Set(model.is_paid),
            paid_at: Set(model.paid_at),
            payment_reference: Set(model.payment_reference),
            is_delivered: Set(model.is_delivered),
            delivered_at: Set(model.delivered_at),
            requires_reconciliation: Set(model.requires_reconciliation),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };

        // Guarded on the status read by the caller; a concurrent transition leaves
        // this UPDATE matching no rows.
        let result = Order::update_many()
            .set(changes)
            .filter(order::Column::Id.eq(model.id))
            .filter(order::Column::Status.eq(expected_status))
            .exec(&*self.db)
            .await?;

        debug!(order_id = %model.id, %expected_status, rows = result.rows_affected, "guarded order update");

        if result.rows_affected == 0 {
            return Ok(None);
        }
        Ok(Order::find_by_id(model.id).one(&*self.db).await?)
    }

    async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        OrderItem::delete_many()
            .filter(order_item::Column::OrderId.eq(id))
            .exec(&txn)
            .await?;
        let result = Order::delete_by_id(id).exec(&txn).await?;

        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ServiceError::NotFound(format!("Order {} not found", id)));
        }

        txn.commit().await?;
        Ok(())
    }
}
