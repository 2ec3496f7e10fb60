//! Service error types.

use std::time::Duration;

use common::{CartId, ProductId, UserId};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during a checkout.
///
/// `EmptyCart`, `InsufficientStock`, `CartChanged` and `Domain` are expected
/// outcomes a caller can render to the user; everything else is a fault.
/// Either way nothing was committed.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user has no cart or the cart has no items.
    #[error("Cart is empty for user {user_id}")]
    EmptyCart { user_id: UserId },

    /// A cart line asks for more units than are in stock.
    #[error(
        "Insufficient stock for product {product_name} ({product_id}): requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        requested: u32,
        available: u32,
    },

    /// A cart line references a product that no longer exists.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The cart gained or lost lines while the checkout was running.
    #[error("Cart {cart_id} changed during checkout: ordered {ordered} lines, cart held {cleared}")]
    CartChanged {
        cart_id: CartId,
        ordered: u64,
        cleared: u64,
    },

    /// The unit of work did not finish before the caller's deadline.
    #[error("Checkout exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Returns true for expected business outcomes, false for faults.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            CheckoutError::EmptyCart { .. }
                | CheckoutError::InsufficientStock { .. }
                | CheckoutError::CartChanged { .. }
                | CheckoutError::Domain(_)
        )
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart { .. } => "empty_cart",
            CheckoutError::InsufficientStock { .. } => "insufficient_stock",
            CheckoutError::ProductNotFound(_) => "product_not_found",
            CheckoutError::CartChanged { .. } => "cart_changed",
            CheckoutError::DeadlineExceeded(_) => "deadline_exceeded",
            CheckoutError::Domain(_) => "domain",
            CheckoutError::Store(_) => "store",
        }
    }
}

/// Errors returned by the cart and order services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request carried malformed data. Nothing was persisted.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] DomainError),

    /// A referenced cart, item, product or order does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The caller does not own the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Store error.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl ServiceError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ServiceError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            other => ServiceError::Store(other),
        }
    }
}

/// Convenience type alias for cart and order service results.
pub type Result<T> = std::result::Result<T, ServiceError>;
