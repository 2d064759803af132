//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::domain::aggregates::cart::Cart;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{
    CartId, CustomerId, Money, OrderId, OrderLineId, OrderNumber, ProductId, Quantity, VariantId,
};

/// Frozen copy of a cart line. Holds no reference back to the cart or catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub display_name: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub total_price: Money,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Address {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 200))]
    pub company: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub street1: String,
    #[validate(length(max = 200))]
    pub street2: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub city: String,
    #[validate(length(max = 100))]
    pub state: Option<String>,
    #[validate(length(min = 1, max = 20))]
    pub zip: String,
    #[validate(length(equal = 2))]
    pub country: String,
    #[validate(length(max = 40))]
    pub phone: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    /// Position along the fulfilment chain; cancellation sits outside it.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            Self::Cancelled => None,
        }
    }

    /// Forward moves along the chain (skips allowed) and cancellation from
    /// any non-terminal state.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.rank(), next.rank()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "PROCESSING" => Ok(Self::Processing),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            "REFUNDED" => Ok(Self::Refunded),
            other => Err(format!("unknown payment status '{other}'")),
        }
    }
}

/// Payment method the customer asked for. Recorded only; nothing is charged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
    Invoice,
    Card,
    CashOnDelivery,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BankTransfer => "bank_transfer",
            Self::Invoice => "invoice",
            Self::Card => "card",
            Self::CashOnDelivery => "cash_on_delivery",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank_transfer" => Ok(Self::BankTransfer),
            "invoice" => Ok(Self::Invoice),
            "card" => Ok(Self::Card),
            "cash_on_delivery" => Ok(Self::CashOnDelivery),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// Administrative patch. Only status and logistics fields are mutable.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub tracking_number: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Inputs for converting a cart into an order.
pub struct PlaceOrder<'a> {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub cart: &'a Cart,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub shipping_cost: Money,
    pub discount_amount: Money,
    pub placed_at: DateTime<Utc>,
}

/// Every stored column of an order, for rehydration.
#[derive(Clone, Debug)]
pub struct OrderParts {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub customer_id: CustomerId,
    pub cart_id: CartId,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub notes: Option<String>,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub discount_amount: Money,
    pub total_amount: Money,
    pub lines: Vec<OrderLine>,
    pub tracking_number: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    customer_id: CustomerId,
    cart_id: CartId,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    shipping_address: Address,
    billing_address: Option<Address>,
    notes: Option<String>,
    subtotal: Money,
    shipping_cost: Money,
    discount_amount: Money,
    total_amount: Money,
    lines: Vec<OrderLine>,
    tracking_number: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    /// Freezes the cart's lines and locked prices into a new pending order.
    pub fn place(input: PlaceOrder<'_>) -> Result<Self, OrderError> {
        if input.cart.is_empty() { return Err(OrderError::NoItems); }
        if input.shipping_cost.is_negative() { return Err(OrderError::NegativeAmount("shipping_cost")); }
        if input.discount_amount.is_negative() { return Err(OrderError::NegativeAmount("discount_amount")); }

        let lines: Vec<OrderLine> = input.cart.lines().iter().map(|l| OrderLine {
            id: OrderLineId::generate(), product_id: l.product_id, variant_id: l.variant_id,
            display_name: l.display_name.clone(), quantity: l.quantity, unit_price: l.unit_price,
            total_price: l.line_total(),
        }).collect();
        let subtotal: Money = lines.iter().map(|l| l.total_price).sum();
        if input.discount_amount > subtotal + input.shipping_cost { return Err(OrderError::DiscountExceedsTotal); }
        let total_amount = subtotal + input.shipping_cost - input.discount_amount;

        let mut order = Self {
            id: input.id, order_number: input.order_number, customer_id: input.customer_id,
            cart_id: input.cart.id(), status: OrderStatus::Pending, payment_status: PaymentStatus::Pending,
            payment_method: input.payment_method, shipping_address: input.shipping_address,
            billing_address: input.billing_address, notes: input.notes, subtotal,
            shipping_cost: input.shipping_cost, discount_amount: input.discount_amount, total_amount, lines,
            tracking_number: None, shipped_at: None, delivered_at: None,
            created_at: input.placed_at, updated_at: input.placed_at, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id, order_number: order.order_number.clone(),
            customer_id: order.customer_id, total: order.total_amount,
        }));
        Ok(order)
    }

    pub fn restore(p: OrderParts) -> Self {
        Self {
            id: p.id, order_number: p.order_number, customer_id: p.customer_id, cart_id: p.cart_id,
            status: p.status, payment_status: p.payment_status, payment_method: p.payment_method,
            shipping_address: p.shipping_address, billing_address: p.billing_address, notes: p.notes,
            subtotal: p.subtotal, shipping_cost: p.shipping_cost, discount_amount: p.discount_amount,
            total_amount: p.total_amount, lines: p.lines, tracking_number: p.tracking_number,
            shipped_at: p.shipped_at, delivered_at: p.delivered_at, created_at: p.created_at,
            updated_at: p.updated_at, events: vec![],
        }
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn order_number(&self) -> &OrderNumber { &self.order_number }
    pub fn customer_id(&self) -> CustomerId { self.customer_id }
    pub fn cart_id(&self) -> CartId { self.cart_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn billing_address(&self) -> Option<&Address> { self.billing_address.as_ref() }
    pub fn notes(&self) -> Option<&str> { self.notes.as_deref() }
    pub fn subtotal(&self) -> Money { self.subtotal }
    pub fn shipping_cost(&self) -> Money { self.shipping_cost }
    pub fn discount_amount(&self) -> Money { self.discount_amount }
    pub fn total_amount(&self) -> Money { self.total_amount }
    pub fn lines(&self) -> &[OrderLine] { &self.lines }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn shipped_at(&self) -> Option<DateTime<Utc>> { self.shipped_at }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Applies an administrative patch. The transition is checked before
    /// anything is written, so a rejected patch leaves the order untouched.
    pub fn apply(&mut self, update: OrderUpdate, now: DateTime<Utc>) -> Result<(), OrderError> {
        if let Some(next) = update.status {
            if next != self.status && !self.status.can_transition_to(next) {
                return Err(OrderError::InvalidTransition { from: self.status, to: next });
            }
        }

        if let Some(next) = update.status.filter(|s| *s != self.status) {
            let from = std::mem::replace(&mut self.status, next);
            match next {
                OrderStatus::Shipped => self.shipped_at = self.shipped_at.or(Some(now)),
                OrderStatus::Delivered => self.delivered_at = self.delivered_at.or(Some(now)),
                _ => {}
            }
            self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: next }));
        }
        if let Some(next) = update.payment_status.filter(|s| *s != self.payment_status) {
            let from = std::mem::replace(&mut self.payment_status, next);
            self.raise_event(DomainEvent::Order(OrderEvent::PaymentStatusChanged { order_id: self.id, from, to: next }));
        }
        if let Some(tracking) = update.tracking_number { self.tracking_number = Some(tracking); }
        if let Some(at) = update.shipped_at { self.shipped_at = Some(at); }
        if let Some(at) = update.delivered_at { self.delivered_at = Some(at); }
        self.updated_at = now;
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    NoItems,
    NegativeAmount(&'static str),
    DiscountExceedsTotal,
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "No items"),
            Self::NegativeAmount(field) => write!(f, "{field} cannot be negative"),
            Self::DiscountExceedsTotal => write!(f, "Discount exceeds order total"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {from} to {to}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::aggregates::cart::tests::draft;

    pub(crate) fn address() -> Address {
        Address {
            name: "Receiving Dock".into(), company: Some("Acme Wholesale".into()),
            street1: "1 Warehouse Way".into(), city: "Leeds".into(), zip: "LS1 1AA".into(),
            country: "GB".into(), ..Default::default()
        }
    }

    fn place(cart: &Cart, shipping: i64, discount: i64) -> Result<Order, OrderError> {
        Order::place(PlaceOrder {
            id: OrderId::generate(), order_number: OrderNumber::new("WO-1"), customer_id: CustomerId::generate(),
            cart, shipping_address: address(), billing_address: None, payment_method: PaymentMethod::Invoice,
            notes: None, shipping_cost: Money::from_cents(shipping), discount_amount: Money::from_cents(discount),
            placed_at: Utc::now(),
        })
    }

    #[test]
    fn test_order_totals() {
        let mut cart = Cart::for_customer(CustomerId::generate());
        cart.add_line(draft(ProductId::generate(), 2, 1000)).unwrap();
        cart.add_line(draft(ProductId::generate(), 1, 550)).unwrap();
        let mut order = place(&cart, 700, 250).unwrap();
        assert_eq!(order.subtotal(), Money::from_cents(2550));
        assert_eq!(order.total_amount(), Money::from_cents(3000));
        assert_eq!(order.lines().iter().map(|l| l.total_price).sum::<Money>(), order.subtotal());
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert!(matches!(order.take_events().as_slice(), [DomainEvent::Order(OrderEvent::Placed { .. })]));
    }

    #[test]
    fn test_order_rejects_bad_amounts() {
        let mut cart = Cart::for_customer(CustomerId::generate());
        assert_eq!(place(&cart, 0, 0).unwrap_err(), OrderError::NoItems);
        cart.add_line(draft(ProductId::generate(), 1, 1000)).unwrap();
        assert_eq!(place(&cart, -1, 0).unwrap_err(), OrderError::NegativeAmount("shipping_cost"));
        assert_eq!(place(&cart, 0, 1001).unwrap_err(), OrderError::DiscountExceedsTotal);
    }

    #[test]
    fn test_order_workflow() {
        let mut cart = Cart::for_customer(CustomerId::generate());
        cart.add_line(draft(ProductId::generate(), 1, 1000)).unwrap();
        let mut order = place(&cart, 0, 0).unwrap();
        let now = Utc::now();
        order.apply(OrderUpdate { status: Some(OrderStatus::Confirmed), ..Default::default() }, now).unwrap();
        order.apply(OrderUpdate {
            status: Some(OrderStatus::Shipped), tracking_number: Some("1Z999".into()), ..Default::default()
        }, now).unwrap();
        assert_eq!(order.status(), OrderStatus::Shipped);
        assert_eq!(order.shipped_at(), Some(now));
        assert_eq!(order.tracking_number(), Some("1Z999"));

        let err = order.apply(OrderUpdate {
            status: Some(OrderStatus::Confirmed), payment_status: Some(PaymentStatus::Paid), ..Default::default()
        }, now).unwrap_err();
        assert_eq!(err, OrderError::InvalidTransition { from: OrderStatus::Shipped, to: OrderStatus::Confirmed });
        assert_eq!(order.payment_status(), PaymentStatus::Pending);

        order.apply(OrderUpdate { status: Some(OrderStatus::Delivered), ..Default::default() }, now).unwrap();
        assert!(order.apply(OrderUpdate { status: Some(OrderStatus::Cancelled), ..Default::default() }, now).is_err());
    }

    #[test]
    fn test_status_machine() {
        use OrderStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Shipped));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(!Confirmed.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
    }

    #[test]
    fn test_address_validation() {
        assert!(address().validate().is_ok());
        let bad = Address { street1: String::new(), ..address() };
        assert!(bad.validate().unwrap_err().field_errors().contains_key("street1"));
    }
}
