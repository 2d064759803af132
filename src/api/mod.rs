//! HTTP surface.

pub mod cart;
pub mod catalog;
pub mod error;
pub mod extract;
pub mod orders;

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;

use crate::domain::access::StoreAccessMode;
use crate::identity::IdentityResolver;
use crate::services::{CartStore, OrderService};
use crate::store::Catalog;

pub use error::ApiError;
pub use extract::{CallerIdentity, GuestCart, GUEST_CART_HEADER};

#[derive(Clone)]
pub struct AppState {
    pub cart_store: CartStore,
    pub orders: OrderService,
    pub catalog: Arc<dyn Catalog>,
    pub identities: Arc<dyn IdentityResolver>,
    pub access_mode: StoreAccessMode,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "wholesale-storefront"})) }))
        .route("/api/v1/access", get(catalog::access_tier))
        .route("/api/v1/catalog/products", get(catalog::list_products))
        .route("/api/v1/cart", get(cart::current_cart).delete(cart::clear_cart))
        .route("/api/v1/cart/lines", post(cart::add_line))
        .route("/api/v1/cart/lines/:line_id", put(cart::update_line).delete(cart::remove_line))
        .route("/api/v1/cart/reconcile", post(cart::reconcile))
        .route("/api/v1/orders", get(orders::list_orders).post(orders::create_order))
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/status", put(orders::update_order_status))
        .route("/api/v1/admin/orders", get(orders::admin_list_orders))
        .with_state(state)
}
