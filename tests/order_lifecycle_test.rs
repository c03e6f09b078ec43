mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{place_order_input, TestApp};
use rust_decimal_macros::dec;
use storefront_api::{entities::OrderStatus, errors::ServiceError, repositories::OrderWithItems};
use uuid::Uuid;

async fn place(app: &TestApp, user_id: Uuid, product_id: Uuid, quantity: i32) -> OrderWithItems {
    app.add_to_cart(user_id, product_id, quantity).await;
    app.services
        .checkout
        .place_order(user_id, place_order_input("card"))
        .await
        .unwrap()
}

#[tokio::test]
async fn order_moves_through_full_lifecycle() {
    let app = TestApp::new();
    let stool = app.seed_product("Bar Stool", dec!(70.00), 4).await;
    let user_id = Uuid::new_v4();
    let order_id = place(&app, user_id, stool.id, 1).await.order.id;
    let orders = &app.services.orders;

    let paid = orders
        .mark_paid(order_id, "pi_3Nx81".to_string())
        .await
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Processing);
    assert!(paid.is_paid);
    assert!(paid.paid_at.is_some());
    assert_eq!(paid.payment_reference.as_deref(), Some("pi_3Nx81"));

    let shipped = orders.mark_shipped(order_id).await.unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);
    assert!(shipped.is_paid);

    let delivered = orders.mark_delivered(order_id).await.unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.is_delivered);
    assert!(delivered.delivered_at.is_some());

    assert_matches!(
        orders.cancel_order(order_id).await,
        Err(ServiceError::InvalidStatusTransition {
            from: OrderStatus::Delivered,
            to: OrderStatus::Cancelled
        })
    );
    assert_eq!(app.stock_of(stool.id).await, 3);
}

#[tokio::test]
async fn transitions_cannot_skip_states() {
    let app = TestApp::new();
    let stool = app.seed_product("Bar Stool", dec!(70.00), 4).await;
    let order_id = place(&app, Uuid::new_v4(), stool.id, 1).await.order.id;
    let orders = &app.services.orders;

    assert_matches!(
        orders.mark_shipped(order_id).await,
        Err(ServiceError::InvalidStatusTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Shipped
        })
    );
    assert_matches!(
        orders.mark_delivered(order_id).await,
        Err(ServiceError::InvalidStatusTransition { .. })
    );

    orders.mark_paid(order_id, "ref-1".to_string()).await.unwrap();
    assert_matches!(
        orders.mark_paid(order_id, "ref-2".to_string()).await,
        Err(ServiceError::InvalidStatusTransition { .. })
    );
    assert_matches!(
        orders.mark_paid(order_id, "  ".to_string()).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn cancelling_before_shipment_restores_stock() {
    let app = TestApp::new();
    let stool = app.seed_product("Bar Stool", dec!(70.00), 4).await;
    let order_id = place(&app, Uuid::new_v4(), stool.id, 3).await.order.id;
    assert_eq!(app.stock_of(stool.id).await, 1);

    app.services
        .orders
        .mark_paid(order_id, "ref-9".to_string())
        .await
        .unwrap();
    let cancelled = app.services.orders.cancel_order(order_id).await.unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert!(!cancelled.requires_reconciliation);
    assert_eq!(app.stock_of(stool.id).await, 4);

    assert_matches!(
        app.services.orders.cancel_order(order_id).await,
        Err(ServiceError::InvalidStatusTransition {
            from: OrderStatus::Cancelled,
            ..
        })
    );
    assert_eq!(app.stock_of(stool.id).await, 4);
}

#[tokio::test]
async fn cancelling_after_shipment_keeps_stock() {
    let app = TestApp::new();
    let stool = app.seed_product("Bar Stool", dec!(70.00), 4).await;
    let order_id = place(&app, Uuid::new_v4(), stool.id, 2).await.order.id;
    let orders = &app.services.orders;

    orders.mark_paid(order_id, "ref".to_string()).await.unwrap();
    orders.mark_shipped(order_id).await.unwrap();
    let cancelled = orders.cancel_order(order_id).await.unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(app.stock_of(stool.id).await, 2);
}

#[tokio::test]
async fn orders_are_visible_to_owner_and_admins_only() {
    let app = TestApp::new();
    let stool = app.seed_product("Bar Stool", dec!(70.00), 4).await;
    let owner = Uuid::new_v4();
    let order_id = place(&app, owner, stool.id, 1).await.order.id;
    let orders = &app.services.orders;

    assert_eq!(
        orders.get_order(order_id, owner, false).await.unwrap().order.id,
        order_id
    );
    assert!(orders.get_order(order_id, Uuid::new_v4(), true).await.is_ok());
    assert_matches!(
        orders.get_order(order_id, Uuid::new_v4(), false).await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        orders.get_order(Uuid::new_v4(), owner, true).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn order_history_is_newest_first() {
    let app = TestApp::new();
    let mug = app.seed_product("Mug", dec!(9.00), 10).await;
    let user_id = Uuid::new_v4();

    let first = place(&app, user_id, mug.id, 1).await.order.id;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = place(&app, user_id, mug.id, 2).await.order.id;

    let history = app
        .services
        .orders
        .list_orders_for_user(user_id)
        .await
        .unwrap();
    let ids: Vec<Uuid> = history.iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![second, first]);
}
