//! Domain events
use serde::Serialize;

use crate::domain::aggregates::{OrderStatus, PaymentStatus};
use crate::domain::value_objects::{CartId, CustomerId, Money, OrderId, OrderNumber};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainEvent {
    Cart(CartEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CartEvent {
    Reconciled { cart_id: CartId, customer_id: CustomerId, merged_lines: usize },
    Converted { cart_id: CartId, order_id: OrderId },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, order_number: OrderNumber, customer_id: CustomerId, total: Money },
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
    PaymentStatusChanged { order_id: OrderId, from: PaymentStatus, to: PaymentStatus },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Cart(CartEvent::Reconciled { .. }) => "storefront.cart.reconciled",
            Self::Cart(CartEvent::Converted { .. }) => "storefront.cart.converted",
            Self::Order(OrderEvent::Placed { .. }) => "storefront.order.placed",
            Self::Order(OrderEvent::StatusChanged { .. }) => "storefront.order.status_changed",
            Self::Order(OrderEvent::PaymentStatusChanged { .. }) => "storefront.order.payment_status_changed",
        }
    }
}
