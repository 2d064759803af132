//! Cart-to-order conversion and the order lifecycle.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use validator::Validate;

use crate::domain::aggregates::{Address, Order, OrderUpdate, PaymentMethod, PlaceOrder};
use crate::domain::events::{CartEvent, DomainEvent};
use crate::domain::value_objects::{CustomerId, Money, OrderId, OrderNumberGenerator};
use crate::identity::Identity;
use crate::services::publisher::EventPublisher;
use crate::store::{CartRepository, OrderRepository, StoreError, StoreResult};
use crate::{EcommerceError, Result};

const MAX_NOTES_LEN: usize = 2000;

#[derive(Clone, Copy, Debug)]
pub struct CheckoutPolicy {
    pub flat_shipping_cost: Money,
    /// Bound on each durable-store call made while placing an order.
    pub store_timeout: Duration,
}

impl Default for CheckoutPolicy {
    fn default() -> Self { Self { flat_shipping_cost: Money::ZERO, store_timeout: Duration::from_secs(5) } }
}

/// What the customer submits at checkout. Items always come from the
/// stored cart, never from the request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: Option<Address>,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    /// Internal callers only; `None` falls back to the policy.
    #[serde(skip)]
    pub shipping_cost: Option<Money>,
    #[serde(skip)]
    pub discount_amount: Option<Money>,
}

impl CheckoutRequest {
    pub fn new(shipping_address: Address, payment_method: PaymentMethod) -> Self {
        Self {
            shipping_address: Some(shipping_address), billing_address: None, payment_method,
            notes: None, shipping_cost: None, discount_amount: None,
        }
    }
}

/// A created order plus the outcome of marking its cart converted. The
/// archival step runs after the order commits and its failure never undoes
/// or hides the order.
#[derive(Debug)]
pub struct Placement {
    pub order: Order,
    pub cart_archival: StoreResult<()>,
}

#[derive(Debug, Serialize)]
pub struct OrderPage {
    pub data: Vec<Order>,
    pub total: i64,
    pub page: u32,
}

#[derive(Clone)]
pub struct OrderService {
    carts: Arc<dyn CartRepository>,
    orders: Arc<dyn OrderRepository>,
    numbers: Arc<OrderNumberGenerator>,
    publisher: EventPublisher,
    policy: CheckoutPolicy,
}

fn address_errors(prefix: &str, address: &Address) -> Result<()> {
    address.validate().map_err(|errors| {
        let field = errors.field_errors().keys().min().map(|f| format!("{prefix}.{f}")).unwrap_or_else(|| prefix.to_string());
        EcommerceError::validation(field, "missing or invalid")
    })
}

impl OrderService {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        orders: Arc<dyn OrderRepository>,
        numbers: Arc<OrderNumberGenerator>,
        publisher: EventPublisher,
        policy: CheckoutPolicy,
    ) -> Self {
        Self { carts, orders, numbers, publisher, policy }
    }

    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.policy.store_timeout, call)
            .await
            .unwrap_or(Err(StoreError::Timeout(self.policy.store_timeout)))
    }

    /// Converts the caller's active cart into a pending order.
    ///
    /// Preconditions are checked before any write. The header and lines are
    /// written as one unit; if that fails or times out nothing exists and the
    /// whole call can be retried, since the cart is re-read every time.
    pub async fn create_order(&self, identity: &Identity, request: CheckoutRequest) -> Result<Placement> {
        let customer_id = identity
            .customer_id
            .ok_or_else(|| EcommerceError::validation("customer_id", "authentication required"))?;
        let shipping_address = request
            .shipping_address
            .ok_or_else(|| EcommerceError::validation("shipping_address", "required"))?;
        address_errors("shipping_address", &shipping_address)?;
        if let Some(billing) = &request.billing_address {
            address_errors("billing_address", billing)?;
        }
        if request.notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_LEN) {
            return Err(EcommerceError::validation("notes", format!("longer than {MAX_NOTES_LEN} characters")));
        }

        let cart = self
            .bounded(self.carts.active_cart(customer_id))
            .await
            .map_err(EcommerceError::OrderNotPlaced)?
            .filter(|c| !c.is_empty())
            .ok_or_else(|| EcommerceError::validation("cart", "cart is empty"))?;

        let now = Utc::now();
        let mut order = Order::place(PlaceOrder {
            id: OrderId::generate(),
            order_number: self.numbers.next(now),
            customer_id,
            cart: &cart,
            shipping_address,
            billing_address: request.billing_address,
            payment_method: request.payment_method,
            notes: request.notes.filter(|n| !n.trim().is_empty()),
            shipping_cost: request.shipping_cost.unwrap_or(self.policy.flat_shipping_cost),
            discount_amount: request.discount_amount.unwrap_or(Money::ZERO),
            placed_at: now,
        })?;

        match self.bounded(self.orders.insert_order(&order)).await {
            Ok(()) => {}
            Err(e @ StoreError::CartAlreadyOrdered(_)) => {
                // A concurrent checkout won; finish archiving its cart so the
                // customer starts fresh.
                tracing::warn!(customer_id = %customer_id, cart_id = %cart.id(), "cart already converted by another checkout");
                if let Err(archival) = self.bounded(self.carts.mark_converted(cart.id())).await {
                    tracing::debug!(cart_id = %cart.id(), error = %archival, "cart archival retry skipped");
                }
                return Err(EcommerceError::OrderNotPlaced(e));
            }
            Err(e) => {
                tracing::error!(customer_id = %customer_id, cart_id = %cart.id(), error = %e, "order insert rolled back");
                return Err(EcommerceError::OrderNotPlaced(e));
            }
        }
        tracing::info!(
            order_id = %order.id(), order_number = %order.order_number(), customer_id = %customer_id,
            total = %order.total_amount(), lines = order.lines().len(), "order created"
        );

        let cart_archival = self.bounded(self.carts.mark_converted(cart.id())).await;
        match &cart_archival {
            Ok(()) => {
                self.publisher
                    .publish(&DomainEvent::Cart(CartEvent::Converted { cart_id: cart.id(), order_id: order.id() }))
                    .await;
            }
            Err(e) => {
                tracing::warn!(order_id = %order.id(), cart_id = %cart.id(), error = %e, "order stands but cart was not marked converted");
            }
        }
        self.publisher.publish_all(order.take_events()).await;

        Ok(Placement { order, cart_archival })
    }

    /// Customers only see their own orders; a foreign order reads as missing.
    pub async fn get_order(&self, identity: &Identity, order_id: OrderId) -> Result<Order> {
        let caller = identity.require_customer()?;
        let order = self.orders.find_order(order_id).await?.ok_or(EcommerceError::OrderNotFound)?;
        if order.customer_id() != caller && !identity.is_admin() {
            return Err(EcommerceError::OrderNotFound);
        }
        Ok(order)
    }

    pub async fn list_orders(&self, identity: &Identity, customer_id: CustomerId) -> Result<Vec<Order>> {
        let caller = identity.require_customer()?;
        if caller != customer_id && !identity.is_admin() {
            return Err(EcommerceError::Forbidden);
        }
        Ok(self.orders.orders_for_customer(customer_id).await?)
    }

    pub async fn list_all_orders(&self, identity: &Identity, page: u32, per_page: u32) -> Result<OrderPage> {
        identity.require_admin()?;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let (data, total) = self.orders.list_orders(per_page, (page - 1).saturating_mul(per_page)).await?;
        Ok(OrderPage { data, total, page })
    }

    /// Administrative status change. Line items and totals are never touched.
    ///
    /// The write only lands if the stored status is still the one the
    /// transition was checked against; a concurrent change yields
    /// `OrderChanged` and nothing is written.
    pub async fn update_order_status(&self, identity: &Identity, order_id: OrderId, update: OrderUpdate) -> Result<Order> {
        let admin = identity.require_admin()?;
        let mut order = self.orders.find_order(order_id).await?.ok_or(EcommerceError::OrderNotFound)?;
        let checked_from = order.status();
        order.apply(update, Utc::now())?;
        match self.orders.save_order_update(&order, checked_from).await {
            Ok(()) => {}
            Err(StoreError::Conflict(reason)) => {
                tracing::warn!(order_id = %order_id, admin_id = %admin, %reason, "order status changed concurrently");
                return Err(EcommerceError::OrderChanged);
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(order_id = %order_id, admin_id = %admin, status = %order.status(), "order updated");
        self.publisher.publish_all(order.take_events()).await;
        Ok(order)
    }
}
