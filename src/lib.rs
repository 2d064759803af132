//! Wholesale Storefront
//!
//! Cart and order consistency engine for a B2B wholesale store.
//!
//! ## Features
//! - Catalog and price visibility tiers for anonymous visitors
//! - Client-held guest carts and durable per-customer carts
//! - Guest-to-customer cart reconciliation at login
//! - Atomic cart-to-order conversion with locked prices
//! - Administrative order status workflow

pub mod api;
pub mod config;
pub mod domain;
pub mod identity;
pub mod services;
pub mod store;

use thiserror::Error;

use crate::domain::aggregates::{CartError, CartStatus, OrderError, OrderStatus};
use crate::store::StoreError;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Not permitted")]
    Forbidden,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Cart is {0}")]
    CartNotActive(CartStatus),

    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Order was changed by someone else, reload and retry")]
    OrderChanged,

    #[error("Order could not be created, retry")]
    OrderNotPlaced(#[source] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl EcommerceError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation { field: field.into(), reason: reason.into() }
    }
}

impl From<CartError> for EcommerceError {
    fn from(e: CartError) -> Self {
        match e { CartError::NotActive(status) => Self::CartNotActive(status) }
    }
}

impl From<OrderError> for EcommerceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems => Self::validation("cart", "cart is empty"),
            OrderError::NegativeAmount(field) => Self::validation(field, "cannot be negative"),
            OrderError::DiscountExceedsTotal => Self::validation("discount_amount", "exceeds subtotal plus shipping"),
            OrderError::InvalidTransition { from, to } => Self::InvalidTransition { from, to },
        }
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
