// Cart, catalog, pricing and checkout
pub mod commerce;

// Order lifecycle after checkout
pub mod order_status;

pub use order_status::OrderStatusService;
