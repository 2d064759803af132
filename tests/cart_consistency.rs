mod common;

use common::Harness;
use wholesale_storefront::domain::aggregates::Cart;
use wholesale_storefront::domain::value_objects::{CustomerId, Money};
use wholesale_storefront::identity::Identity;
use wholesale_storefront::services::{CartOperations, EphemeralCart};
use wholesale_storefront::EcommerceError;

fn assert_totals(cart: &Cart) {
    let items: u64 = cart.lines().iter().map(|l| u64::from(l.quantity.value())).sum();
    let price: Money = cart.lines().iter().map(|l| l.unit_price.multiply(l.quantity)).sum();
    assert_eq!(cart.total_items(), items);
    assert_eq!(cart.total_price(), price);
}

#[tokio::test]
async fn test_adding_same_product_merges_into_one_line() {
    let h = Harness::new();
    let crate_of_24 = h.product("Crate of 24", 1999).await;
    let customer = CustomerId::generate();

    let mut cart = h.carts.open(&Identity::customer(customer), None);
    cart.add_line(&crate_of_24, 2).await.unwrap();
    let after = cart.add_line(&crate_of_24, 3).await.unwrap();

    assert_eq!(after.lines().len(), 1);
    assert_eq!(after.lines()[0].quantity.value(), 5);
    assert_eq!(after.total_price(), Money::from_cents(9995));
}

#[tokio::test]
async fn test_totals_stay_exact_through_mixed_edits() {
    let h = Harness::new();
    let a = h.product("Tea chest", 10).await;
    let b = h.product("Biscuit tin", 333).await;
    let c = h.product("Jam jar", 7).await;

    for identity in [Identity::ANONYMOUS, Identity::customer(CustomerId::generate())] {
        let mut cart = h.carts.open(&identity, None);
        for _ in 0..10 {
            assert_totals(&cart.add_line(&a, 1).await.unwrap());
        }
        assert_totals(&cart.add_line(&b, 3).await.unwrap());
        let snapshot = cart.add_line(&c, 4).await.unwrap();
        assert_totals(&snapshot);
        assert_eq!(snapshot.total_price(), Money::from_cents(100 + 999 + 28));

        let b_line = snapshot.find_item(b.product_id, None).unwrap().id;
        let c_line = snapshot.find_item(c.product_id, None).unwrap().id;
        assert_totals(&cart.update_quantity(b_line, 1).await.unwrap());
        let after_remove = cart.update_quantity(c_line, 0).await.unwrap();
        assert_totals(&after_remove);
        assert!(after_remove.find_item(c.product_id, None).is_none());
        assert_eq!(after_remove.total_items(), 11);
        assert_eq!(after_remove.total_price(), Money::from_cents(433));

        let cleared = cart.clear().await.unwrap();
        assert!(cleared.is_empty());
        assert_eq!(cleared.total_price(), Money::ZERO);
    }
}

#[tokio::test]
async fn test_invalid_quantity_leaves_cart_unchanged() {
    let h = Harness::new();
    let a = h.product("Tea chest", 500).await;
    let customer = CustomerId::generate();
    h.add(customer, &a, 1).await;

    let mut cart = h.carts.open(&Identity::customer(customer), None);
    assert!(matches!(cart.add_line(&a, 0).await, Err(EcommerceError::InvalidQuantity(0))));
    assert!(matches!(cart.add_line(&a, -4).await, Err(EcommerceError::InvalidQuantity(-4))));
    assert_eq!(cart.current().await.unwrap().total_items(), 1);
}

#[tokio::test]
async fn test_durable_cart_is_shared_across_devices() {
    let h = Harness::new();
    let a = h.product("Tea chest", 500).await;
    let b = h.product("Biscuit tin", 250).await;
    let customer = Identity::customer(CustomerId::generate());

    let mut laptop = h.carts.open(&customer, None);
    let mut phone = h.carts.open(&customer, None);
    laptop.add_line(&a, 1).await.unwrap();
    phone.add_line(&b, 2).await.unwrap();

    let seen = laptop.current().await.unwrap();
    assert_eq!(seen.lines().len(), 2);
    assert_eq!(seen.total_price(), Money::from_cents(1000));
}

#[tokio::test]
async fn test_login_reconciliation_merges_and_is_idempotent() {
    let h = Harness::new();
    let a = h.product("Product A", 1000).await;
    let b = h.product("Product B", 500).await;
    let customer = CustomerId::generate();

    h.add(customer, &a, 1).await;
    h.add(customer, &b, 3).await;

    let mut guest = EphemeralCart::resume(None);
    guest.add_line(&a, 2).await.unwrap();
    let mut guest = guest.into_cart();

    let merged = h.carts.reconcile_on_login(&mut guest, customer).await.unwrap();
    assert_eq!(merged.find_item(a.product_id, None).unwrap().quantity.value(), 3);
    assert_eq!(merged.find_item(b.product_id, None).unwrap().quantity.value(), 3);
    assert_eq!(merged.lines().len(), 2);
    assert!(guest.is_empty());

    let again = h.carts.reconcile_on_login(&mut guest, customer).await.unwrap();
    assert_eq!(again.find_item(a.product_id, None).unwrap().quantity.value(), 3);
    assert_eq!(again.find_item(b.product_id, None).unwrap().quantity.value(), 3);
    assert_eq!(again.total_items(), 6);
}

#[tokio::test]
async fn test_reconciliation_creates_cart_for_new_customer() {
    let h = Harness::new();
    let a = h.product("Product A", 1000).await;
    let customer = CustomerId::generate();

    let mut guest = EphemeralCart::resume(None);
    guest.add_line(&a, 4).await.unwrap();
    let mut guest = guest.into_cart();
    let guest_line = guest.lines()[0].id;

    let merged = h.carts.reconcile_on_login(&mut guest, customer).await.unwrap();
    assert_eq!(merged.total_items(), 4);
    assert_eq!(merged.lines()[0].unit_price, Money::from_cents(1000));
    assert_ne!(merged.lines()[0].id, guest_line);
}
