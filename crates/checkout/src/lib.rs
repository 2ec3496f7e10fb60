//! Cart, order and checkout services.
//!
//! The checkout turns a user's cart into a pending order inside one unit of
//! work:
//! 1. Lock each product row in ascending product id order
//! 2. Verify and deduct stock, snapshotting the current price
//! 3. Write the order and its items
//! 4. Empty the cart
//!
//! If any step fails, nothing is committed.

pub mod cart;
pub mod coordinator;
pub mod error;
pub mod inventory;
pub mod orders;

pub use cart::CartService;
pub use coordinator::CheckoutCoordinator;
pub use error::{CheckoutError, ServiceError};
pub use inventory::InventoryGuard;
pub use orders::OrderService;
