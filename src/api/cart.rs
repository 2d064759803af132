//! Cart endpoints. The same handlers serve guests and customers; the cart
//! strategy is picked from the caller's identity, and what the caller sees
//! follows the store's access tier.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::extract::{guest_cart_headers, CallerIdentity, GuestCart};
use super::AppState;
use crate::domain::access::Visibility;
use crate::domain::aggregates::{Cart, CartLine, CartStatus};
use crate::domain::value_objects::{CartId, LineId, Money, ProductId, VariantId};
use crate::services::{CartHandle, CartOperations, EphemeralCart};
use crate::store::CatalogItem;
use crate::EcommerceError;

type CartResponse = Result<(HeaderMap, Json<CartView>), ApiError>;

#[derive(Debug, Deserialize)]
pub struct AddLineRequest {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLineRequest {
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
    pub id: LineId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub unit_price: Option<Money>,
    pub line_total: Option<Money>,
    pub display_name: String,
    pub image_ref: Option<String>,
}

/// A cart as the caller may see it. Prices are `null` when the caller's
/// tier hides them.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub id: CartId,
    pub status: CartStatus,
    pub lines: Vec<CartLineView>,
    pub total_items: u64,
    pub total_price: Option<Money>,
}

impl CartView {
    pub fn new(cart: &Cart, visibility: Visibility) -> Self {
        let priced = |m: Money| visibility.show_prices.then_some(m);
        Self {
            id: cart.id(),
            status: cart.status(),
            lines: cart
                .lines()
                .iter()
                .map(|l: &CartLine| CartLineView {
                    id: l.id,
                    product_id: l.product_id,
                    variant_id: l.variant_id,
                    quantity: l.quantity.value(),
                    unit_price: priced(l.unit_price),
                    line_total: priced(l.line_total()),
                    display_name: l.display_name.clone(),
                    image_ref: l.image_ref.clone(),
                })
                .collect(),
            total_items: cart.total_items(),
            total_price: priced(cart.total_price()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub cart: CartView,
    /// The guest cart after reconciliation; the client should keep this one.
    pub guest_cart: CartView,
}

/// Guests get their updated cart back in the guest cart header as well as the body.
fn respond(handle: &CartHandle, cart: Cart, visibility: Visibility) -> (HeaderMap, Json<CartView>) {
    let headers = if handle.is_ephemeral() { guest_cart_headers(&cart) } else { HeaderMap::new() };
    (headers, Json(CartView::new(&cart, visibility)))
}

/// Callers who may not browse the catalog may not hold a cart either.
fn gate(state: &AppState, identity: &CallerIdentity) -> Result<Visibility, ApiError> {
    let visibility = Visibility::resolve(state.access_mode, identity.0.is_authenticated());
    if !visibility.show_catalog {
        return Err(EcommerceError::Forbidden.into());
    }
    Ok(visibility)
}

fn open(state: &AppState, identity: CallerIdentity, guest: GuestCart) -> CartHandle {
    state.cart_store.open(&identity.0, guest.0)
}

pub async fn current_cart(State(s): State<AppState>, identity: CallerIdentity, guest: GuestCart) -> CartResponse {
    let visibility = gate(&s, &identity)?;
    let mut handle = open(&s, identity, guest);
    let cart = handle.current().await?;
    Ok(respond(&handle, cart, visibility))
}

/// The unit price is whatever the catalog charges right now; clients never
/// supply it. When the caller's tier hides prices the line is held at zero,
/// so the guest cart header carries no price either; login reconciliation
/// prices it from the catalog.
pub async fn add_line(
    State(s): State<AppState>,
    identity: CallerIdentity,
    guest: GuestCart,
    Json(r): Json<AddLineRequest>,
) -> CartResponse {
    let visibility = gate(&s, &identity)?;
    if r.quantity < 1 {
        return Err(EcommerceError::InvalidQuantity(r.quantity).into());
    }
    let item = s
        .catalog
        .price_of(r.product_id, r.variant_id)
        .await?
        .ok_or_else(|| EcommerceError::validation("product_id", "unknown product or variant"))?;
    let item = if visibility.show_prices { item } else { CatalogItem { price: Money::ZERO, ..item } };

    let mut handle = open(&s, identity, guest);
    let cart = handle.add_line(&item, r.quantity).await?;
    Ok(respond(&handle, cart, visibility))
}

pub async fn update_line(
    State(s): State<AppState>,
    identity: CallerIdentity,
    guest: GuestCart,
    Path(line_id): Path<LineId>,
    Json(r): Json<UpdateLineRequest>,
) -> CartResponse {
    let visibility = gate(&s, &identity)?;
    let mut handle = open(&s, identity, guest);
    let cart = handle.update_quantity(line_id, r.quantity).await?;
    Ok(respond(&handle, cart, visibility))
}

pub async fn remove_line(
    State(s): State<AppState>,
    identity: CallerIdentity,
    guest: GuestCart,
    Path(line_id): Path<LineId>,
) -> CartResponse {
    let visibility = gate(&s, &identity)?;
    let mut handle = open(&s, identity, guest);
    let cart = handle.remove_line(line_id).await?;
    Ok(respond(&handle, cart, visibility))
}

pub async fn clear_cart(State(s): State<AppState>, identity: CallerIdentity, guest: GuestCart) -> CartResponse {
    let visibility = gate(&s, &identity)?;
    let mut handle = open(&s, identity, guest);
    let cart = handle.clear().await?;
    Ok(respond(&handle, cart, visibility))
}

/// Called right after login with the guest cart the client still holds.
pub async fn reconcile(
    State(s): State<AppState>,
    CallerIdentity(identity): CallerIdentity,
    GuestCart(presented): GuestCart,
) -> Result<(HeaderMap, Json<ReconcileResponse>), ApiError> {
    let customer_id = identity.require_customer()?;
    let mut guest_cart = EphemeralCart::resume(presented).into_cart();
    let cart = s.cart_store.reconcile_on_login(&mut guest_cart, customer_id).await?;
    let visibility = Visibility::resolve(s.access_mode, true);
    Ok((
        guest_cart_headers(&guest_cart),
        Json(ReconcileResponse { cart: CartView::new(&cart, visibility), guest_cart: CartView::new(&guest_cart, visibility) }),
    ))
}
