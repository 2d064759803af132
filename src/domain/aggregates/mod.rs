//! Aggregates module
pub mod order;
pub mod cart;

pub use order::{Address, Order, OrderError, OrderLine, OrderParts, OrderStatus, OrderUpdate, PaymentMethod, PaymentStatus, PlaceOrder};
pub use cart::{Cart, CartError, CartLine, CartOwner, CartStatus, LineDraft};
