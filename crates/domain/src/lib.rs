//! Domain layer for the storefront checkout core.
//!
//! This crate provides the entities and value objects the checkout works on:
//! - `Cart` and `CartItem`, the user's mutable pre-purchase selection
//! - `Product`, the stock-bearing catalog record
//! - `Order` and `OrderItem`, the immutable price-snapshotted purchase record
//! - `Money` and `OrderStatus` value objects
//! - `Identity`, the already-authenticated caller

pub mod cart;
pub mod error;
pub mod identity;
pub mod money;
pub mod order;
pub mod product;

pub use cart::{Cart, CartItem, CartLine, CartSummary, validate_quantity};
pub use common::{CartId, CartItemId, OrderId, OrderItemId, ProductId, UserId};
pub use error::DomainError;
pub use identity::{Identity, Role};
pub use money::Money;
pub use order::{Order, OrderItem, OrderLine, OrderStatus};
pub use product::Product;
