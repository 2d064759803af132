#![allow(dead_code)]

use std::sync::Arc;

use wholesale_storefront::api::AppState;
use wholesale_storefront::domain::access::StoreAccessMode;
use wholesale_storefront::domain::aggregates::Address;
use wholesale_storefront::domain::value_objects::{CustomerId, Money, OrderNumberGenerator, ProductId};
use wholesale_storefront::identity::Identity;
use wholesale_storefront::services::{CartOperations, CartStore, CheckoutPolicy, EventPublisher, OrderService};
use wholesale_storefront::store::memory::{MemoryCatalog, MemoryIdentityResolver, MemoryStore};
use wholesale_storefront::store::CatalogItem;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub identities: Arc<MemoryIdentityResolver>,
    pub carts: CartStore,
    pub orders: OrderService,
}

impl Harness {
    pub fn new() -> Self { Self::with_policy(CheckoutPolicy::default()) }

    pub fn with_policy(policy: CheckoutPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(MemoryCatalog::new());
        let publisher = EventPublisher::log_only();
        Self {
            carts: CartStore::new(store.clone(), catalog.clone(), publisher.clone()),
            orders: OrderService::new(
                store.clone(),
                store.clone(),
                Arc::new(OrderNumberGenerator::with_seed("WO", 0)),
                publisher,
                policy,
            ),
            store,
            catalog,
            identities: Arc::new(MemoryIdentityResolver::new()),
        }
    }

    pub async fn product(&self, name: &str, cents: i64) -> CatalogItem {
        let item = CatalogItem {
            product_id: ProductId::generate(),
            variant_id: None,
            name: name.to_string(),
            image_ref: None,
            price: Money::from_cents(cents),
        };
        self.catalog.upsert(item.clone()).await;
        item
    }

    /// Puts `quantity` of `item` into the customer's durable cart.
    pub async fn add(&self, customer_id: CustomerId, item: &CatalogItem, quantity: i64) {
        let mut handle = self.carts.open(&Identity::customer(customer_id), None);
        handle.add_line(item, quantity).await.unwrap();
    }

    pub fn app_state(&self, access_mode: StoreAccessMode) -> AppState {
        AppState {
            cart_store: self.carts.clone(),
            orders: self.orders.clone(),
            catalog: self.catalog.clone(),
            identities: self.identities.clone(),
            access_mode,
        }
    }
}

pub fn address() -> Address {
    Address {
        name: "Receiving Dock".into(),
        company: Some("Northwind Traders".into()),
        street1: "1 Harbour Road".into(),
        street2: None,
        city: "Portsmouth".into(),
        state: None,
        zip: "PO1 2AB".into(),
        country: "GB".into(),
        phone: None,
    }
}
