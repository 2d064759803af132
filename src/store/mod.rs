//! Storage ports for carts, orders and catalog prices.
//!
//! Two backends implement every trait: [`postgres::PgStore`] for deployment
//! and [`memory::MemoryStore`] for tests and local runs.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::aggregates::{Cart, CartLine, Order, OrderStatus};
use crate::domain::value_objects::{CartId, CustomerId, LineId, Money, OrderId, ProductId, Quantity, VariantId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique constraint hit, or the target row is no longer in a writable state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Another order already claimed this cart.
    #[error("Cart {0} already has an order")]
    CartAlreadyOrdered(CartId),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Data corruption: {0}")]
    DataCorruption(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A product (or one of its variants) as the catalog currently prices it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub name: String,
    pub image_ref: Option<String>,
    pub price: Money,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Current price for a product, or for the given variant of it.
    async fn price_of(&self, product_id: ProductId, variant_id: Option<VariantId>) -> StoreResult<Option<CatalogItem>>;

    async fn list_products(&self, limit: u32, offset: u32) -> StoreResult<Vec<CatalogItem>>;
}

/// Durable, per-customer carts. Each call is individually atomic.
#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn active_cart(&self, customer_id: CustomerId) -> StoreResult<Option<Cart>>;

    /// Returns the customer's active cart, creating an empty one if needed.
    async fn open_cart(&self, customer_id: CustomerId) -> StoreResult<Cart>;

    /// Merges every line into the cart in one step: a line for a product and
    /// variant already present adds to its quantity, anything else is appended.
    async fn merge_lines(&self, cart_id: CartId, lines: &[CartLine]) -> StoreResult<()>;

    /// Unknown lines are ignored.
    async fn set_line_quantity(&self, cart_id: CartId, line_id: LineId, quantity: Quantity) -> StoreResult<()>;

    /// Unknown lines are ignored.
    async fn delete_line(&self, cart_id: CartId, line_id: LineId) -> StoreResult<()>;

    async fn delete_all_lines(&self, cart_id: CartId) -> StoreResult<()>;

    /// Moves an active cart to `converted`. Fails with `Conflict` if the cart
    /// is not active.
    async fn mark_converted(&self, cart_id: CartId) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Writes the header and all lines as one transaction. A cart yields at
    /// most one order: a second insert for the same cart fails with
    /// `CartAlreadyOrdered`.
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>>;

    /// Newest first.
    async fn orders_for_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Order>>;

    /// Newest first, with the total number of orders.
    async fn list_orders(&self, limit: u32, offset: u32) -> StoreResult<(Vec<Order>, i64)>;

    /// Persists the mutable status and logistics fields, but only while the
    /// stored status is still `expected`; otherwise fails with `Conflict`.
    async fn save_order_update(&self, order: &Order, expected: OrderStatus) -> StoreResult<()>;
}
