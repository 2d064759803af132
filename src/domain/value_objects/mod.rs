//! Value Objects for the wholesale storefront

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Sub};
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Time-ordered id (UUIDv7).
            pub fn generate() -> Self { Self(Uuid::now_v7()) }
            pub const fn from_uuid(id: Uuid) -> Self { Self(id) }
            pub const fn as_uuid(&self) -> Uuid { self.0 }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self { Self(id) }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
        }
    };
}

entity_id!(
    /// Identifies a cart, anonymous or durable.
    CartId
);
entity_id!(
    /// Stable for the life of a cart line.
    LineId
);
entity_id!(OrderId);
entity_id!(OrderLineId);
entity_id!(CustomerId);
entity_id!(ProductId);
entity_id!(VariantId);

/// Fixed-point monetary amount. The store trades in a single currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub const fn new(amount: Decimal) -> Self { Self(amount) }

    /// Amount from minor units, e.g. `from_cents(1050)` is `10.50`.
    pub fn from_cents(cents: i64) -> Self { Self(Decimal::new(cents, 2)) }

    pub const fn amount(&self) -> Decimal { self.0 }

    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }

    pub fn multiply(&self, qty: Quantity) -> Money { Money(self.0 * Decimal::from(qty.value())) }
}

impl Add for Money {
    type Output = Money;
    fn add(self, rhs: Money) -> Money { Money(self.0 + rhs.0) }
}

impl Sub for Money {
    type Output = Money;
    fn sub(self, rhs: Money) -> Money { Money(self.0 - rhs.0) }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, |acc, m| acc + m) }
}

impl From<Decimal> for Money {
    fn from(amount: Decimal) -> Self { Self(amount) }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// Line quantity, always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(u32);

impl Quantity {
    pub const ONE: Quantity = Quantity(1);
    /// Largest quantity a stored line can hold (a Postgres `INTEGER`).
    pub const MAX: Quantity = Quantity(i32::MAX as u32);

    /// `None` for anything below one or above [`Quantity::MAX`].
    pub fn new(requested: i64) -> Option<Self> {
        match u32::try_from(requested) {
            Ok(value) if (1..=Self::MAX.0).contains(&value) => Some(Self(value)),
            _ => None,
        }
    }

    pub fn value(&self) -> u32 { self.0 }

    /// Saturates at [`Quantity::MAX`].
    pub fn add(&self, other: Quantity) -> Self { Self(self.0.saturating_add(other.0).min(Self::MAX.0)) }
}

impl TryFrom<i64> for Quantity {
    type Error = QuantityError;
    fn try_from(value: i64) -> Result<Self, Self::Error> { Quantity::new(value).ok_or(QuantityError(value)) }
}

impl From<Quantity> for i64 {
    fn from(q: Quantity) -> i64 { i64::from(q.0) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityError(pub i64);
impl std::error::Error for QuantityError {}
impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "quantity must be between 1 and {}, got {}", Quantity::MAX.0, self.0) }
}

/// Human-facing order reference, unique across the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn new(value: impl Into<String>) -> Self { Self(value.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Issues order numbers as `PREFIX-YYYYMMDD-SEQUENCE`.
///
/// The sequence is a process-wide atomic counter seeded randomly at startup,
/// so numbers never repeat within a process regardless of timing. Collisions
/// between processes are caught by the store's unique constraint.
#[derive(Debug)]
pub struct OrderNumberGenerator {
    prefix: String,
    sequence: AtomicU32,
}

impl OrderNumberGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_seed(prefix, rand::random())
    }

    pub fn with_seed(prefix: impl Into<String>, seed: u32) -> Self {
        Self { prefix: prefix.into(), sequence: AtomicU32::new(seed) }
    }

    pub fn next(&self, now: DateTime<Utc>) -> OrderNumber {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        OrderNumber(format!("{}-{}-{:08X}", self.prefix, now.format("%Y%m%d"), seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_money_arithmetic_is_exact() {
        let price = Money::from_cents(10);
        let total: Money = (0..10).map(|_| price).sum();
        assert_eq!(total, Money::from_cents(100));
        assert_eq!(Money::from_cents(333).multiply(Quantity::new(3).unwrap()), Money::from_cents(999));
        assert_eq!(Money::from_cents(1000).to_string(), "10.00");
    }

    #[test]
    fn test_quantity_rejects_below_one() {
        assert!(Quantity::new(0).is_none());
        assert!(Quantity::new(-4).is_none());
        assert!(Quantity::new(i64::from(u32::MAX) + 1).is_none());
        assert_eq!(Quantity::new(7).unwrap().value(), 7);
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("2").unwrap(), Quantity::new(2).unwrap());
    }

    #[test]
    fn test_quantity_fits_integer_column() {
        assert_eq!(Quantity::new(i64::from(i32::MAX)), Some(Quantity::MAX));
        assert!(Quantity::new(3_000_000_000).is_none());
        assert!(serde_json::from_str::<Quantity>("3000000000").is_err());
        assert_eq!(Quantity::MAX.add(Quantity::ONE), Quantity::MAX);
    }

    #[test]
    fn test_order_numbers_unique_across_threads() {
        let generator = Arc::new(OrderNumberGenerator::with_seed("WO", u32::MAX - 5_000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = Arc::clone(&generator);
                std::thread::spawn(move || (0..1_250).map(|_| generator.next(Utc::now())).collect::<Vec<_>>())
            })
            .collect();
        let mut seen = HashSet::new();
        for handle in handles {
            for number in handle.join().unwrap() {
                assert!(seen.insert(number));
            }
        }
        assert_eq!(seen.len(), 10_000);
    }
}
