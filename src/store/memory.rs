//! In-process backend for tests and local runs.
//!
//! Mirrors the Postgres semantics: per-call atomicity for cart writes, one
//! all-or-nothing step for an order header and its lines, a unique order
//! number and at most one order per cart. Faults can be injected to exercise rollback and timeout paths.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::{Catalog, CatalogItem, CartRepository, OrderRepository, StoreError, StoreResult};
use crate::domain::aggregates::{Cart, CartLine, CartOwner, Order, OrderLine, OrderStatus};
use crate::domain::value_objects::{CartId, CustomerId, LineId, Money, OrderId, ProductId, Quantity, VariantId};
use crate::identity::{Identity, IdentityResolver};

#[derive(Default)]
struct State {
    carts: HashMap<CartId, Cart>,
    orders: HashMap<OrderId, Order>,
    order_lines: HashMap<OrderId, Vec<OrderLine>>,
    order_numbers: HashSet<String>,
    ordered_carts: HashSet<CartId>,
}

#[derive(Default)]
struct Faults {
    fail_order_lines: AtomicBool,
    fail_cart_conversion: AtomicBool,
    order_insert_delay_ms: AtomicU64,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    faults: Faults,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    /// The next order insert fails after its header has been staged.
    pub fn fail_next_order_lines(&self) { self.faults.fail_order_lines.store(true, Ordering::SeqCst); }

    /// The next `mark_converted` call fails.
    pub fn fail_next_cart_conversion(&self) { self.faults.fail_cart_conversion.store(true, Ordering::SeqCst); }

    /// Every order insert waits this long before writing.
    pub fn delay_order_inserts(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.faults.order_insert_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub async fn cart(&self, cart_id: CartId) -> Option<Cart> { self.state.lock().await.carts.get(&cart_id).cloned() }

    pub async fn order_count(&self) -> usize { self.state.lock().await.orders.len() }

    pub async fn order_line_count(&self) -> usize { self.state.lock().await.order_lines.values().map(Vec::len).sum() }
}

fn active_cart_mut(state: &mut State, cart_id: CartId) -> StoreResult<&mut Cart> {
    match state.carts.get_mut(&cart_id) {
        Some(cart) if cart.is_active() => Ok(cart),
        Some(_) => Err(StoreError::Conflict(format!("cart {cart_id} is not active"))),
        None => Err(StoreError::Conflict(format!("cart {cart_id} does not exist"))),
    }
}

fn find_active(state: &State, customer_id: CustomerId) -> Option<&Cart> {
    let owner = CartOwner::Customer(customer_id);
    state.carts.values().find(|c| c.owner() == owner && c.is_active())
}

#[async_trait]
impl CartRepository for MemoryStore {
    async fn active_cart(&self, customer_id: CustomerId) -> StoreResult<Option<Cart>> {
        Ok(find_active(&*self.state.lock().await, customer_id).cloned())
    }

    async fn open_cart(&self, customer_id: CustomerId) -> StoreResult<Cart> {
        let mut state = self.state.lock().await;
        if let Some(cart) = find_active(&state, customer_id) {
            return Ok(cart.clone());
        }
        let cart = Cart::for_customer(customer_id);
        state.carts.insert(cart.id(), cart.clone());
        Ok(cart)
    }

    async fn merge_lines(&self, cart_id: CartId, lines: &[CartLine]) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let cart = active_cart_mut(&mut state, cart_id)?;
        let mut staged = cart.clone();
        for line in lines {
            staged.merge_line(line.clone()).map_err(|e| StoreError::Conflict(e.to_string()))?;
        }
        *cart = staged;
        Ok(())
    }

    async fn set_line_quantity(&self, cart_id: CartId, line_id: LineId, quantity: Quantity) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Ok(cart) = active_cart_mut(&mut state, cart_id) {
            cart.update_quantity(line_id, i64::from(quantity)).map_err(|e| StoreError::Conflict(e.to_string()))?;
        }
        Ok(())
    }

    async fn delete_line(&self, cart_id: CartId, line_id: LineId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Ok(cart) = active_cart_mut(&mut state, cart_id) {
            cart.remove_line(line_id).map_err(|e| StoreError::Conflict(e.to_string()))?;
        }
        Ok(())
    }

    async fn delete_all_lines(&self, cart_id: CartId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Ok(cart) = active_cart_mut(&mut state, cart_id) {
            cart.clear().map_err(|e| StoreError::Conflict(e.to_string()))?;
        }
        Ok(())
    }

    async fn mark_converted(&self, cart_id: CartId) -> StoreResult<()> {
        if self.faults.fail_cart_conversion.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected cart conversion failure".into()));
        }
        let mut state = self.state.lock().await;
        let cart = active_cart_mut(&mut state, cart_id)?;
        cart.mark_converted().map_err(|e| StoreError::Conflict(e.to_string()))
    }
}

#[async_trait]
impl OrderRepository for MemoryStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let delay = self.faults.order_insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let mut state = self.state.lock().await;
        if state.order_numbers.contains(order.order_number().as_str()) || state.orders.contains_key(&order.id()) {
            return Err(StoreError::Conflict("order number already exists".into()));
        }
        if !state.ordered_carts.insert(order.cart_id()) {
            return Err(StoreError::CartAlreadyOrdered(order.cart_id()));
        }

        // Stage header and lines; nothing reaches `state` unless both succeed.
        let header = order.clone();
        let mut lines = Vec::with_capacity(order.lines().len());
        for line in order.lines() {
            if self.faults.fail_order_lines.swap(false, Ordering::SeqCst) {
                state.ordered_carts.remove(&order.cart_id());
                return Err(StoreError::Unavailable("injected order line failure".into()));
            }
            lines.push(line.clone());
        }

        state.order_numbers.insert(order.order_number().as_str().to_string());
        state.order_lines.insert(order.id(), lines);
        state.orders.insert(order.id(), header);
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn orders_for_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state.orders.values()
            .filter(|o| o.customer_id() == customer_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        Ok(orders)
    }

    async fn list_orders(&self, limit: u32, offset: u32) -> StoreResult<(Vec<Order>, i64)> {
        let state = self.state.lock().await;
        let mut orders: Vec<&Order> = state.orders.values().collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
        let total = i64::try_from(orders.len()).unwrap_or(i64::MAX);
        let page = orders.into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn save_order_update(&self, order: &Order, expected: OrderStatus) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        match state.orders.get_mut(&order.id()) {
            Some(stored) if stored.status() == expected => {
                *stored = order.clone();
                Ok(())
            }
            _ => Err(StoreError::Conflict(format!("order {} is no longer {expected}", order.id()))),
        }
    }
}

/// Catalog prices held in memory; prices can be changed to simulate catalog edits.
#[derive(Default)]
pub struct MemoryCatalog {
    items: RwLock<HashMap<(ProductId, Option<VariantId>), CatalogItem>>,
}

impl MemoryCatalog {
    pub fn new() -> Self { Self::default() }

    pub async fn upsert(&self, item: CatalogItem) {
        self.items.write().await.insert((item.product_id, item.variant_id), item);
    }

    pub async fn set_price(&self, product_id: ProductId, variant_id: Option<VariantId>, price: Money) {
        if let Some(item) = self.items.write().await.get_mut(&(product_id, variant_id)) {
            item.price = price;
        }
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn price_of(&self, product_id: ProductId, variant_id: Option<VariantId>) -> StoreResult<Option<CatalogItem>> {
        Ok(self.items.read().await.get(&(product_id, variant_id)).cloned())
    }

    async fn list_products(&self, limit: u32, offset: u32) -> StoreResult<Vec<CatalogItem>> {
        let items = self.items.read().await;
        let mut products: Vec<CatalogItem> = items.values().filter(|i| i.variant_id.is_none()).cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.product_id.cmp(&b.product_id)));
        Ok(products.into_iter().skip(offset as usize).take(limit as usize).collect())
    }
}

/// Fixed credential table.
#[derive(Default)]
pub struct MemoryIdentityResolver {
    sessions: RwLock<HashMap<String, Identity>>,
}

impl MemoryIdentityResolver {
    pub fn new() -> Self { Self::default() }

    pub async fn insert(&self, credential: impl Into<String>, identity: Identity) {
        self.sessions.write().await.insert(credential.into(), identity);
    }
}

#[async_trait]
impl IdentityResolver for MemoryIdentityResolver {
    async fn resolve(&self, credential: &str) -> StoreResult<Option<Identity>> {
        Ok(self.sessions.read().await.get(credential).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::tests::draft;

    #[tokio::test]
    async fn test_open_cart_is_stable() {
        let store = MemoryStore::new();
        let customer = CustomerId::generate();
        let first = store.open_cart(customer).await.unwrap();
        let second = store.open_cart(customer).await.unwrap();
        assert_eq!(first.id(), second.id());
        assert_eq!(store.active_cart(CustomerId::generate()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_merge_lines_is_all_or_nothing() {
        let store = MemoryStore::new();
        let customer = CustomerId::generate();
        let cart = store.open_cart(customer).await.unwrap();
        let line = draft(ProductId::generate(), 2, 100).into_line();
        store.merge_lines(cart.id(), &[line.clone(), line]).await.unwrap();
        let stored = store.active_cart(customer).await.unwrap().unwrap();
        assert_eq!(stored.lines().len(), 1);
        assert_eq!(stored.total_items(), 4);

        store.mark_converted(cart.id()).await.unwrap();
        let err = store.merge_lines(cart.id(), &[draft(ProductId::generate(), 1, 100).into_line()]).await;
        assert!(matches!(err, Err(StoreError::Conflict(_))));
        assert_eq!(store.cart(cart.id()).await.unwrap().total_items(), 4);
    }
}
