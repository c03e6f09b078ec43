/// Commerce services module - carts, catalog, pricing and checkout
pub mod cart_service;
pub mod checkout_service;
pub mod pricing_service;
pub mod product_catalog_service;

// Re-export services for convenience
pub use cart_service::{AddToCartInput, CartService};
pub use checkout_service::{CheckoutService, PlaceOrderInput, ShippingAddress};
pub use pricing_service::{calculate_totals, round_money, OrderTotals};
pub use product_catalog_service::{CreateProductInput, ProductCatalogService, UpdateProductInput};
