//! Domain error types.

use common::ProductId;
use thiserror::Error;

/// Errors raised when a domain invariant would be violated.
///
/// These are all rejections of malformed input; none of them implies that
/// anything was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Invalid quantity.
    #[error("Invalid quantity: {quantity} (must be between 1 and {max})")]
    InvalidQuantity { quantity: i64, max: u32 },

    /// Invalid price.
    #[error("Invalid price: {cents} cents (must be greater than 0)")]
    InvalidPrice { cents: i64 },

    /// Product name missing.
    #[error("Product name is required")]
    ProductNameRequired,

    /// Not enough stock to remove the requested quantity.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// An order must contain at least one line.
    #[error("Order has no items")]
    NoItems,

    /// A subtotal or total does not fit in the money representation.
    #[error("Amount overflow: total exceeds the largest representable amount")]
    AmountOverflow,

    /// Unknown order status string.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
