//! The authoritative cart for whoever is calling.
//!
//! Anonymous callers hold their cart client-side: [`EphemeralCart`] mutates a
//! cart value the caller handed in and hands it back, and the server keeps no
//! record. Authenticated callers get a [`DurableCart`], which writes every
//! mutation straight to the [`CartRepository`] so other devices see it on
//! their next read. Both satisfy [`CartOperations`], and [`CartStore::open`]
//! picks the strategy from the caller's identity so handlers never branch on
//! authentication themselves.
//!
//! Durable carts have no concurrency control beyond per-line last-write-wins:
//! two devices changing different lines both land, two devices changing the
//! same line leave whichever write reached the store last.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::aggregates::{Cart, CartLine, CartOwner, LineDraft};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{CartId, CustomerId, LineId, Quantity};
use crate::identity::Identity;
use crate::services::publisher::EventPublisher;
use crate::store::{Catalog, CatalogItem, CartRepository, StoreResult};
use crate::{EcommerceError, Result};

#[async_trait]
pub trait CartOperations: Send {
    async fn current(&mut self) -> Result<Cart>;

    /// Adds `quantity` of the item at the price it carries right now. A line
    /// for the same product and variant gains quantity instead of duplicating.
    async fn add_line(&mut self, item: &CatalogItem, quantity: i64) -> Result<Cart>;

    /// Unknown lines are a no-op.
    async fn remove_line(&mut self, line_id: LineId) -> Result<Cart>;

    /// Below one removes the line; unknown lines are a no-op.
    async fn update_quantity(&mut self, line_id: LineId, quantity: i64) -> Result<Cart>;

    async fn clear(&mut self) -> Result<Cart>;
}

fn priced_draft(item: &CatalogItem, quantity: i64) -> Result<LineDraft> {
    let quantity = Quantity::new(quantity).ok_or(EcommerceError::InvalidQuantity(quantity))?;
    Ok(LineDraft {
        product_id: item.product_id,
        variant_id: item.variant_id,
        quantity,
        unit_price: item.price,
        display_name: item.name.clone(),
        image_ref: item.image_ref.clone(),
    })
}

/// A guest cart held by the client.
#[derive(Clone, Debug)]
pub struct EphemeralCart {
    cart: Cart,
}

impl EphemeralCart {
    /// Resumes the cart the client presented, or starts an empty one when
    /// there is none or it is not a usable guest cart.
    pub fn resume(presented: Option<Cart>) -> Self {
        let cart = presented
            .filter(|c| c.owner() == CartOwner::Anonymous && c.is_active())
            .unwrap_or_else(Cart::anonymous);
        Self { cart }
    }

    pub fn cart(&self) -> &Cart { &self.cart }

    pub fn into_cart(self) -> Cart { self.cart }
}

#[async_trait]
impl CartOperations for EphemeralCart {
    async fn current(&mut self) -> Result<Cart> { Ok(self.cart.clone()) }

    async fn add_line(&mut self, item: &CatalogItem, quantity: i64) -> Result<Cart> {
        self.cart.add_line(priced_draft(item, quantity)?)?;
        Ok(self.cart.clone())
    }

    async fn remove_line(&mut self, line_id: LineId) -> Result<Cart> {
        self.cart.remove_line(line_id)?;
        Ok(self.cart.clone())
    }

    async fn update_quantity(&mut self, line_id: LineId, quantity: i64) -> Result<Cart> {
        self.cart.update_quantity(line_id, quantity)?;
        Ok(self.cart.clone())
    }

    async fn clear(&mut self) -> Result<Cart> {
        self.cart.clear()?;
        Ok(self.cart.clone())
    }
}

/// A customer's server-held cart. Every mutation is persisted before it returns.
#[derive(Clone)]
pub struct DurableCart {
    carts: Arc<dyn CartRepository>,
    customer_id: CustomerId,
}

impl DurableCart {
    pub fn new(carts: Arc<dyn CartRepository>, customer_id: CustomerId) -> Self { Self { carts, customer_id } }

    /// The stored cart, or an unsaved empty one; the row is created on first add.
    async fn reload(&self) -> Result<Cart> {
        Ok(self.carts.active_cart(self.customer_id).await?.unwrap_or_else(|| Cart::for_customer(self.customer_id)))
    }
}

#[async_trait]
impl CartOperations for DurableCart {
    async fn current(&mut self) -> Result<Cart> { self.reload().await }

    async fn add_line(&mut self, item: &CatalogItem, quantity: i64) -> Result<Cart> {
        let line = priced_draft(item, quantity)?.into_line();
        let cart = self.carts.open_cart(self.customer_id).await?;
        self.carts.merge_lines(cart.id(), &[line]).await?;
        tracing::debug!(customer_id = %self.customer_id, cart_id = %cart.id(), product_id = %item.product_id, quantity, "cart line added");
        self.reload().await
    }

    async fn remove_line(&mut self, line_id: LineId) -> Result<Cart> {
        if let Some(cart) = self.carts.active_cart(self.customer_id).await? {
            self.carts.delete_line(cart.id(), line_id).await?;
        }
        self.reload().await
    }

    async fn update_quantity(&mut self, line_id: LineId, quantity: i64) -> Result<Cart> {
        if let Some(cart) = self.carts.active_cart(self.customer_id).await? {
            match Quantity::new(quantity) {
                Some(q) => self.carts.set_line_quantity(cart.id(), line_id, q).await?,
                None => self.carts.delete_line(cart.id(), line_id).await?,
            }
        }
        self.reload().await
    }

    async fn clear(&mut self) -> Result<Cart> {
        if let Some(cart) = self.carts.active_cart(self.customer_id).await? {
            self.carts.delete_all_lines(cart.id()).await?;
        }
        self.reload().await
    }
}

/// The cart strategy chosen for one caller.
pub enum CartHandle {
    Ephemeral(EphemeralCart),
    Durable(DurableCart),
}

impl CartHandle {
    pub fn is_ephemeral(&self) -> bool { matches!(self, Self::Ephemeral(_)) }
}

#[async_trait]
impl CartOperations for CartHandle {
    async fn current(&mut self) -> Result<Cart> {
        match self { Self::Ephemeral(c) => c.current().await, Self::Durable(c) => c.current().await }
    }

    async fn add_line(&mut self, item: &CatalogItem, quantity: i64) -> Result<Cart> {
        match self { Self::Ephemeral(c) => c.add_line(item, quantity).await, Self::Durable(c) => c.add_line(item, quantity).await }
    }

    async fn remove_line(&mut self, line_id: LineId) -> Result<Cart> {
        match self { Self::Ephemeral(c) => c.remove_line(line_id).await, Self::Durable(c) => c.remove_line(line_id).await }
    }

    async fn update_quantity(&mut self, line_id: LineId, quantity: i64) -> Result<Cart> {
        match self {
            Self::Ephemeral(c) => c.update_quantity(line_id, quantity).await,
            Self::Durable(c) => c.update_quantity(line_id, quantity).await,
        }
    }

    async fn clear(&mut self) -> Result<Cart> {
        match self { Self::Ephemeral(c) => c.clear().await, Self::Durable(c) => c.clear().await }
    }
}

#[derive(Clone)]
pub struct CartStore {
    carts: Arc<dyn CartRepository>,
    catalog: Arc<dyn Catalog>,
    publisher: EventPublisher,
}

impl CartStore {
    pub fn new(carts: Arc<dyn CartRepository>, catalog: Arc<dyn Catalog>, publisher: EventPublisher) -> Self {
        Self { carts, catalog, publisher }
    }

    /// Picks the cart strategy for this caller. A guest cart presented by an
    /// authenticated caller is ignored; it must go through
    /// [`CartStore::reconcile_on_login`] first.
    pub fn open(&self, identity: &Identity, guest_cart: Option<Cart>) -> CartHandle {
        match identity.customer_id {
            Some(customer_id) => CartHandle::Durable(DurableCart::new(Arc::clone(&self.carts), customer_id)),
            None => CartHandle::Ephemeral(EphemeralCart::resume(guest_cart)),
        }
    }

    /// Guest lines arrive from the client, so only the product, variant and
    /// quantity are kept. Price, name and image come from the catalog as it
    /// stands now; lines for products the catalog no longer knows are dropped.
    async fn repriced(&self, guest_lines: &[CartLine]) -> StoreResult<Vec<CartLine>> {
        let mut lines = Vec::with_capacity(guest_lines.len());
        for guest in guest_lines {
            match self.catalog.price_of(guest.product_id, guest.variant_id).await? {
                Some(item) => lines.push(
                    LineDraft {
                        product_id: item.product_id,
                        variant_id: item.variant_id,
                        quantity: guest.quantity,
                        unit_price: item.price,
                        display_name: item.name,
                        image_ref: item.image_ref,
                    }
                    .into_line(),
                ),
                None => tracing::debug!(product_id = %guest.product_id, "guest line for unknown product dropped"),
            }
        }
        Ok(lines)
    }

    async fn merge_into_durable(&self, customer_id: CustomerId, guest_lines: &[CartLine]) -> StoreResult<(CartId, usize)> {
        let lines = self.repriced(guest_lines).await?;
        let durable = self.carts.open_cart(customer_id).await?;
        self.carts.merge_lines(durable.id(), &lines).await?;
        Ok((durable.id(), lines.len()))
    }

    /// Folds a guest cart into the customer's durable cart at login.
    ///
    /// The guest cart is emptied in the same step that writes the durable
    /// cart, so calling this again with the same (now empty) guest cart
    /// merges nothing. If the write fails the guest lines are put back and
    /// the call can be retried.
    pub async fn reconcile_on_login(&self, anonymous: &mut Cart, customer_id: CustomerId) -> Result<Cart> {
        let lines = anonymous.take_lines();
        if lines.is_empty() {
            return DurableCart::new(Arc::clone(&self.carts), customer_id).current().await;
        }

        let merged = self.merge_into_durable(customer_id, &lines).await;
        let (cart_id, merged_lines) = match merged {
            Ok(merged) => merged,
            Err(e) => {
                tracing::warn!(customer_id = %customer_id, error = %e, "cart reconciliation failed, guest cart kept");
                anonymous.restore_lines(lines);
                return Err(e.into());
            }
        };

        self.publisher
            .publish(&DomainEvent::Cart(CartEvent::Reconciled { cart_id, customer_id, merged_lines }))
            .await;
        DurableCart::new(Arc::clone(&self.carts), customer_id).current().await
    }
}
