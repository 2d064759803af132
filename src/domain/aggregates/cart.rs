//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::value_objects::{CartId, CustomerId, LineId, Money, ProductId, Quantity, VariantId};

/// Who a cart belongs to. Anonymous carts live with the client only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "customer_id", rename_all = "snake_case")]
pub enum CartOwner {
    Anonymous,
    Customer(CustomerId),
}

impl CartOwner {
    /// Persisted form of the owner: `anonymous` or the customer id.
    pub fn owner_ref(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::Customer(id) => id.to_string(),
        }
    }

    pub fn parse_owner_ref(value: &str) -> Option<Self> {
        if value == "anonymous" {
            return Some(Self::Anonymous);
        }
        uuid::Uuid::parse_str(value).ok().map(|id| Self::Customer(CustomerId::from_uuid(id)))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[default]
    Active,
    Converted,
    Abandoned,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Converted => "converted",
            Self::Abandoned => "abandoned",
        }
    }
}

impl FromStr for CartStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "converted" => Ok(Self::Converted),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(format!("unknown cart status '{other}'")),
        }
    }
}

impl fmt::Display for CartStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One product (and optionally one variant) in a cart, with the price that
/// was current when the line was created.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: LineId,
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub display_name: String,
    pub image_ref: Option<String>,
}

impl CartLine {
    pub fn line_total(&self) -> Money { self.unit_price.multiply(self.quantity) }

    fn same_item(&self, product_id: ProductId, variant_id: Option<VariantId>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }
}

/// What a caller wants to put in the cart, priced from their catalog view.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDraft {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub display_name: String,
    pub image_ref: Option<String>,
}

impl LineDraft {
    pub fn into_line(self) -> CartLine {
        CartLine {
            id: LineId::generate(),
            product_id: self.product_id,
            variant_id: self.variant_id,
            quantity: self.quantity,
            unit_price: self.unit_price,
            display_name: self.display_name,
            image_ref: self.image_ref,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "CartParts")]
pub struct Cart {
    id: CartId,
    owner: CartOwner,
    status: CartStatus,
    lines: Vec<CartLine>,
    total_items: u64,
    total_price: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Stored or client-supplied cart fields; totals are never trusted from input.
#[derive(Deserialize)]
struct CartParts {
    id: CartId,
    owner: CartOwner,
    #[serde(default)]
    status: CartStatus,
    #[serde(default)]
    lines: Vec<CartLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartParts> for Cart {
    fn from(p: CartParts) -> Self { Cart::from_parts(p.id, p.owner, p.status, p.lines, p.created_at, p.updated_at) }
}

impl Cart {
    pub fn new(owner: CartOwner) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::generate(), owner, status: CartStatus::Active, lines: vec![],
            total_items: 0, total_price: Money::ZERO, created_at: now, updated_at: now,
        }
    }

    pub fn anonymous() -> Self { Self::new(CartOwner::Anonymous) }

    pub fn for_customer(customer_id: CustomerId) -> Self { Self::new(CartOwner::Customer(customer_id)) }

    /// Rebuilds a cart from storage. Lines for the same product/variant are
    /// folded together and totals are recomputed.
    pub fn from_parts(
        id: CartId,
        owner: CartOwner,
        status: CartStatus,
        lines: Vec<CartLine>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let mut cart = Self {
            id, owner, status, lines: Vec::with_capacity(lines.len()),
            total_items: 0, total_price: Money::ZERO, created_at, updated_at,
        };
        for line in lines {
            cart.fold_in(line);
        }
        cart.recalculate();
        cart.updated_at = updated_at;
        cart
    }

    pub fn id(&self) -> CartId { self.id }
    pub fn owner(&self) -> CartOwner { self.owner }
    pub fn status(&self) -> CartStatus { self.status }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn total_items(&self) -> u64 { self.total_items }
    pub fn total_price(&self) -> Money { self.total_price }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn is_active(&self) -> bool { self.status == CartStatus::Active }

    pub fn line(&self, line_id: LineId) -> Option<&CartLine> { self.lines.iter().find(|l| l.id == line_id) }

    pub fn find_item(&self, product_id: ProductId, variant_id: Option<VariantId>) -> Option<&CartLine> {
        self.lines.iter().find(|l| l.same_item(product_id, variant_id))
    }

    /// Adds a draft, merging into an existing line for the same product and
    /// variant. Returns the id of the line that now holds the quantity.
    pub fn add_line(&mut self, draft: LineDraft) -> Result<LineId, CartError> {
        self.merge_line(draft.into_line())
    }

    /// Merge rule shared by add and reconciliation: an existing line keeps
    /// its id and locked price and only gains quantity.
    pub fn merge_line(&mut self, line: CartLine) -> Result<LineId, CartError> {
        self.ensure_active()?;
        let id = self.fold_in(line);
        self.recalculate();
        Ok(id)
    }

    /// Returns whether a line was removed. Unknown ids are not an error.
    pub fn remove_line(&mut self, line_id: LineId) -> Result<bool, CartError> {
        self.ensure_active()?;
        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        let removed = self.lines.len() != before;
        if removed { self.recalculate(); }
        Ok(removed)
    }

    /// Sets a line's quantity; anything below one removes the line.
    pub fn update_quantity(&mut self, line_id: LineId, requested: i64) -> Result<bool, CartError> {
        let Some(quantity) = Quantity::new(requested) else {
            return self.remove_line(line_id);
        };
        self.ensure_active()?;
        let Some(line) = self.lines.iter_mut().find(|l| l.id == line_id) else {
            return Ok(false);
        };
        line.quantity = quantity;
        self.recalculate();
        Ok(true)
    }

    pub fn clear(&mut self) -> Result<(), CartError> {
        self.ensure_active()?;
        self.lines.clear();
        self.recalculate();
        Ok(())
    }

    /// Empties the cart and hands its lines to the caller.
    pub fn take_lines(&mut self) -> Vec<CartLine> {
        let lines = std::mem::take(&mut self.lines);
        self.recalculate();
        lines
    }

    /// Puts lines back after a failed hand-off.
    pub fn restore_lines(&mut self, lines: Vec<CartLine>) {
        for line in lines {
            self.fold_in(line);
        }
        self.recalculate();
    }

    pub fn mark_converted(&mut self) -> Result<(), CartError> {
        self.ensure_active()?;
        self.status = CartStatus::Converted;
        self.touch();
        Ok(())
    }

    fn fold_in(&mut self, line: CartLine) -> LineId {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.same_item(line.product_id, line.variant_id)) {
            existing.quantity = existing.quantity.add(line.quantity);
            existing.id
        } else {
            let id = line.id;
            self.lines.push(line);
            id
        }
    }

    fn ensure_active(&self) -> Result<(), CartError> {
        if self.is_active() { Ok(()) } else { Err(CartError::NotActive(self.status)) }
    }

    fn recalculate(&mut self) {
        self.total_items = self.lines.iter().map(|l| u64::from(l.quantity.value())).sum();
        self.total_price = self.lines.iter().map(CartLine::line_total).sum();
        self.touch();
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { NotActive(CartStatus) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self { Self::NotActive(status) => write!(f, "Cart is {status}") }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn draft(product_id: ProductId, quantity: i64, cents: i64) -> LineDraft {
        LineDraft {
            product_id,
            variant_id: None,
            quantity: Quantity::new(quantity).unwrap(),
            unit_price: Money::from_cents(cents),
            display_name: "Widget".into(),
            image_ref: None,
        }
    }

    #[test]
    fn test_cart_operations() {
        let widget = ProductId::generate();
        let mut cart = Cart::anonymous();
        let first = cart.add_line(draft(widget, 2, 1000)).unwrap();
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.total_price(), Money::from_cents(2000));
        let second = cart.add_line(draft(widget, 1, 1000)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cart.lines()[0].quantity.value(), 3); // Merged
    }

    #[test]
    fn test_merge_keeps_first_locked_price() {
        let widget = ProductId::generate();
        let mut cart = Cart::anonymous();
        cart.add_line(draft(widget, 1, 1000)).unwrap();
        cart.add_line(draft(widget, 1, 1200)).unwrap();
        assert_eq!(cart.lines()[0].unit_price, Money::from_cents(1000));
        assert_eq!(cart.total_price(), Money::from_cents(2000));
    }

    #[test]
    fn test_variants_are_separate_lines() {
        let shirt = ProductId::generate();
        let mut cart = Cart::anonymous();
        cart.add_line(draft(shirt, 1, 500)).unwrap();
        cart.add_line(LineDraft { variant_id: Some(VariantId::generate()), ..draft(shirt, 2, 600) }).unwrap();
        assert_eq!(cart.lines().len(), 2);
        assert_eq!(cart.total_items(), 3);
        assert_eq!(cart.total_price(), Money::from_cents(1700));
    }

    #[test]
    fn test_update_and_remove_are_forgiving() {
        let mut cart = Cart::anonymous();
        let id = cart.add_line(draft(ProductId::generate(), 4, 250)).unwrap();
        assert!(!cart.update_quantity(LineId::generate(), 9).unwrap());
        assert!(!cart.remove_line(LineId::generate()).unwrap());
        assert!(cart.update_quantity(id, 2).unwrap());
        assert_eq!(cart.total_price(), Money::from_cents(500));
        assert!(cart.update_quantity(id, 0).unwrap());
        assert!(cart.is_empty());
        assert_eq!(cart.total_items(), 0);
        assert_eq!(cart.total_price(), Money::ZERO);
    }

    #[test]
    fn test_converted_cart_is_frozen() {
        let mut cart = Cart::for_customer(CustomerId::generate());
        let id = cart.add_line(draft(ProductId::generate(), 1, 100)).unwrap();
        cart.mark_converted().unwrap();
        assert_eq!(cart.add_line(draft(ProductId::generate(), 1, 100)), Err(CartError::NotActive(CartStatus::Converted)));
        assert!(cart.remove_line(id).is_err());
        assert!(cart.clear().is_err());
        assert!(cart.mark_converted().is_err());
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn test_deserialized_totals_are_recomputed() {
        let mut cart = Cart::anonymous();
        cart.add_line(draft(ProductId::generate(), 3, 199)).unwrap();
        let mut json = serde_json::to_value(&cart).unwrap();
        json["total_price"] = serde_json::json!("0.01");
        json["total_items"] = serde_json::json!(999);
        let decoded: Cart = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.total_items(), 3);
        assert_eq!(decoded.total_price(), Money::from_cents(597));
    }

    #[test]
    fn test_owner_ref_round_trip() {
        let owner = CartOwner::Customer(CustomerId::generate());
        assert_eq!(CartOwner::parse_owner_ref(&owner.owner_ref()), Some(owner));
        assert_eq!(CartOwner::parse_owner_ref("anonymous"), Some(CartOwner::Anonymous));
        assert_eq!(CartOwner::parse_owner_ref("nobody"), None);
    }
}
