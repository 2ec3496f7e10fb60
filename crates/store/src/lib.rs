//! Transactional storage for carts, products and orders.
//!
//! The [`Store`] trait is the unit of work: it opens, commits and rolls back
//! transactions. [`CartStore`], [`ProductStore`] and [`OrderStore`] are the
//! per-aggregate capabilities. Methods that take part in a checkout accept an
//! explicit `&mut Self::Tx`; everything else runs as a single statement.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTx};
pub use postgres::PostgresStore;
pub use store::{CartStore, OrderStore, ProductStore, Store};
