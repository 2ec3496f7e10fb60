//! Cart aggregate: one mutable pre-purchase selection per user.

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;
use crate::product::Product;

/// Largest quantity a single cart line may carry.
pub const MAX_LINE_QUANTITY: u32 = i32::MAX as u32;

/// Validates a requested line quantity.
///
/// Quantities arrive as signed integers so that zero and negative requests
/// are rejected here instead of failing to deserialize.
pub fn validate_quantity(quantity: i64) -> Result<u32, DomainError> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| (1..=MAX_LINE_QUANTITY).contains(q))
        .ok_or(DomainError::InvalidQuantity {
            quantity,
            max: MAX_LINE_QUANTITY,
        })
}

/// A user's cart.
///
/// Invariants:
/// - at most one cart exists per user
/// - each product appears in at most one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    /// Items, newest first.
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Creates a new empty cart for a user.
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::new(),
            user_id,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A single product line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// Creates a new cart item. Quantity must be positive.
    pub fn new(cart_id: CartId, product_id: ProductId, quantity: u32) -> Result<Self, DomainError> {
        let quantity = validate_quantity(i64::from(quantity))?;
        let now = Utc::now();
        Ok(Self {
            id: CartItemId::new(),
            cart_id,
            product_id,
            quantity,
            created_at: now,
            updated_at: now,
        })
    }
}

/// A cart item joined with the product's current display data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item: CartItem,
    pub product_name: String,
    /// Current catalog price, not a snapshot.
    pub unit_price: Money,
    /// Current catalog stock; advisory only.
    pub available_stock: u32,
    /// `unit_price * quantity`.
    pub subtotal: Money,
}

impl CartLine {
    /// Joins an item with its product.
    ///
    /// Fails with `AmountOverflow` if the line's subtotal cannot be
    /// represented.
    pub fn new(item: CartItem, product: &Product) -> Result<Self, DomainError> {
        let subtotal = product.price.checked_multiply(item.quantity)?;
        Ok(Self {
            item,
            product_name: product.name.clone(),
            unit_price: product.price,
            available_stock: product.stock,
            subtotal,
        })
    }
}

/// A cart as presented to its owner.
///
/// `estimated_total` uses live prices and may differ from the total the
/// checkout eventually snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSummary {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub lines: Vec<CartLine>,
    pub estimated_total: Money,
}

impl CartSummary {
    pub fn new(cart: &Cart, lines: Vec<CartLine>) -> Result<Self, DomainError> {
        let estimated_total = Money::checked_sum(lines.iter().map(|line| line.subtotal))?;
        Ok(Self {
            cart_id: cart.id,
            user_id: cart.user_id,
            lines,
            estimated_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_quantity_accepts_positive() {
        assert_eq!(validate_quantity(1), Ok(1));
        assert_eq!(validate_quantity(42), Ok(42));
    }

    #[test]
    fn validate_quantity_rejects_zero_and_negative() {
        assert!(matches!(
            validate_quantity(0),
            Err(DomainError::InvalidQuantity { quantity: 0, .. })
        ));
        assert!(validate_quantity(-3).is_err());
    }

    #[test]
    fn validate_quantity_rejects_overflow() {
        assert!(validate_quantity(i64::from(MAX_LINE_QUANTITY) + 1).is_err());
    }

    #[test]
    fn cart_item_rejects_zero_quantity() {
        assert!(CartItem::new(CartId::new(), ProductId::new(), 0).is_err());
    }

    #[test]
    fn cart_is_empty_until_an_item_is_added() {
        let mut cart = Cart::new(UserId::new());
        assert!(cart.is_empty());

        let item = CartItem::new(cart.id, ProductId::new(), 2).unwrap();
        cart.items.push(item);
        assert!(!cart.is_empty());
    }

    #[test]
    fn summary_estimates_total_from_live_prices() {
        let mut cart = Cart::new(UserId::new());
        let widget = Product::new("Widget", Money::from_cents(250), 10).unwrap();
        let gadget = Product::new("Gadget", Money::from_cents(1000), 10).unwrap();

        let lines = vec![
            CartLine::new(CartItem::new(cart.id, widget.id, 4).unwrap(), &widget).unwrap(),
            CartLine::new(CartItem::new(cart.id, gadget.id, 1).unwrap(), &gadget).unwrap(),
        ];
        cart.items = lines.iter().map(|l| l.item.clone()).collect();

        let summary = CartSummary::new(&cart, lines).unwrap();
        assert_eq!(summary.estimated_total.cents(), 2000);
        assert_eq!(summary.lines[0].subtotal.cents(), 1000);
    }

    #[test]
    fn line_subtotal_overflow_is_rejected() {
        let cart = Cart::new(UserId::new());
        let pricey = Product::new("Pricey", Money::from_cents(i64::MAX / 2), 10).unwrap();
        let item = CartItem::new(cart.id, pricey.id, 3).unwrap();

        assert_eq!(
            CartLine::new(item, &pricey),
            Err(DomainError::AmountOverflow)
        );
    }

    #[test]
    fn summary_total_overflow_is_rejected() {
        let cart = Cart::new(UserId::new());
        let pricey = Product::new("Pricey", Money::from_cents(i64::MAX / 2 + 1), 10).unwrap();
        let lines = vec![
            CartLine::new(CartItem::new(cart.id, pricey.id, 1).unwrap(), &pricey).unwrap(),
            CartLine::new(CartItem::new(cart.id, ProductId::new(), 1).unwrap(), &pricey).unwrap(),
        ];

        assert_eq!(
            CartSummary::new(&cart, lines),
            Err(DomainError::AmountOverflow)
        );
    }
}
