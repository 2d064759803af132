//! Application services sitting between the HTTP layer and the stores.
pub mod cart_store;
pub mod orders;
pub mod publisher;

pub use cart_store::{CartHandle, CartOperations, CartStore, DurableCart, EphemeralCart};
pub use orders::{CheckoutPolicy, CheckoutRequest, OrderPage, OrderService, Placement};
pub use publisher::EventPublisher;
