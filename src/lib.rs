//! Storefront API Library
//!
//! Carts, a product catalog, and the order placement pipeline that turns a cart into an
//! order without overselling stock. Services receive their storage explicitly through a
//! [`repositories::StoreContext`], backed either by SeaORM or by in-process maps.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod repositories;
pub mod services;

use std::sync::Arc;

use events::EventSender;
use repositories::StoreContext;
use services::{
    commerce::{CartService, CheckoutService, ProductCatalogService},
    OrderStatusService,
};

/// Every service wired to one store and one event channel
#[derive(Clone)]
pub struct AppServices {
    pub carts: CartService,
    pub catalog: ProductCatalogService,
    pub checkout: CheckoutService,
    pub orders: OrderStatusService,
}

impl AppServices {
    pub fn new(store: StoreContext, event_sender: EventSender, cfg: &config::AppConfig) -> Self {
        let event_sender = Arc::new(event_sender);
        Self {
            carts: CartService::new(store.clone(), event_sender.clone()),
            catalog: ProductCatalogService::new(store.clone(), event_sender.clone()),
            checkout: CheckoutService::new(
                store.clone(),
                event_sender.clone(),
                cfg.pricing.clone(),
            ),
            orders: OrderStatusService::new(store, event_sender),
        }
    }
}
