//! Order aggregate: the immutable record of a completed checkout.

mod status;

pub use status::OrderStatus;

use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::money::Money;

/// A line captured by the checkout while the product row is locked.
///
/// `unit_price` is the price at that moment and is copied into the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl OrderLine {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }
}

/// An order placed by a successful checkout.
///
/// Everything except `status` is fixed at creation. `total_amount` and each
/// item's `price` are snapshots; later catalog price changes never touch them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new pending order from snapshotted lines.
    pub fn place(user_id: UserId, lines: Vec<OrderLine>) -> Result<Self, DomainError> {
        if lines.is_empty() {
            return Err(DomainError::NoItems);
        }

        let id = OrderId::new();
        let now = Utc::now();
        let items: Vec<OrderItem> = lines
            .into_iter()
            .map(|line| OrderItem {
                id: OrderItemId::new(),
                order_id: id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.unit_price,
                created_at: now,
            })
            .collect();
        let subtotals = items
            .iter()
            .map(|item| item.price.checked_multiply(item.quantity))
            .collect::<Result<Vec<_>, _>>()?;
        let total_amount = Money::checked_sum(subtotals)?;

        Ok(Self {
            id,
            user_id,
            items,
            total_amount,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

/// One purchased line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price at purchase time.
    pub price: Money,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    /// Returns the line subtotal (quantity * price).
    ///
    /// Every subtotal was checked when the order was placed, so this only
    /// saturates for rows that never went through [`Order::place`].
    pub fn subtotal(&self) -> Money {
        self.price
            .checked_multiply(self.quantity)
            .unwrap_or(Money::from_cents(i64::MAX))
    }
}
