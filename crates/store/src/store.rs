use async_trait::async_trait;
use common::{CartId, CartItemId, OrderId, ProductId, UserId};
use domain::{Cart, CartItem, Order, OrderStatus, Product};

use crate::Result;

/// Unique constraint guaranteeing one cart per user.
pub const CARTS_USER_ID_KEY: &str = "carts_user_id_key";

/// Unique constraint guaranteeing one line per product within a cart.
pub const CART_ITEMS_CART_PRODUCT_KEY: &str = "cart_items_cart_product_key";

/// A transactional data store.
///
/// A transaction is an owned value. Dropping it without calling
/// [`Store::commit`] discards every write made through it and releases every
/// lock it holds, which is what makes a cancelled checkout roll back.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Transaction handle threaded through the checkout.
    type Tx: Send;

    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Makes every write of the unit of work visible and releases its locks.
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    /// Discards every write of the unit of work and releases its locks.
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;
}

/// Cart persistence.
#[async_trait]
pub trait CartStore: Store {
    /// Loads a user's cart with its items, newest first.
    async fn find_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Acquires an exclusive lock on a user's cart and reads it with its items.
    ///
    /// A second transaction locking the same cart blocks until this one
    /// commits or rolls back, then observes its writes.
    async fn lock_cart(&self, tx: &mut Self::Tx, user_id: UserId) -> Result<Option<Cart>>;

    /// Inserts a new empty cart.
    ///
    /// Fails with `UniqueViolation` on [`CARTS_USER_ID_KEY`] if the user
    /// already has one.
    async fn insert_cart(&self, cart: &Cart) -> Result<()>;

    /// Loads a single item by id.
    async fn find_cart_item(&self, item_id: CartItemId) -> Result<Option<CartItem>>;

    /// Adds `quantity` of a product to a cart.
    ///
    /// If the cart already holds the product, its quantity grows by
    /// `quantity`; otherwise a new item is created. Returns the resulting item.
    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem>;

    /// Replaces the quantity of an item.
    async fn update_cart_item(&self, item_id: CartItemId, quantity: u32) -> Result<CartItem>;

    /// Deletes an item.
    async fn remove_cart_item(&self, item_id: CartItemId) -> Result<()>;

    /// Deletes every item of a cart inside a unit of work.
    ///
    /// Returns the number of items removed. The cart itself is kept.
    async fn clear_cart(&self, tx: &mut Self::Tx, cart_id: CartId) -> Result<u64>;
}

/// The stock-bearing side of the catalog.
#[async_trait]
pub trait ProductStore: Store {
    /// Reads a product without locking it.
    async fn find_product(&self, product_id: ProductId) -> Result<Option<Product>>;

    /// Reads several products without locking them. Unknown ids are skipped.
    async fn find_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Acquires an exclusive lock on a product row and reads it.
    ///
    /// A second transaction locking the same product blocks until this one
    /// commits or rolls back, then observes its writes.
    async fn lock_product(
        &self,
        tx: &mut Self::Tx,
        product_id: ProductId,
    ) -> Result<Option<Product>>;

    /// Writes a new stock level for a product locked by `tx`.
    async fn write_stock(&self, tx: &mut Self::Tx, product_id: ProductId, stock: u32)
    -> Result<()>;
}

/// Order persistence.
#[async_trait]
pub trait OrderStore: Store {
    /// Writes an order and all of its items inside a unit of work.
    async fn insert_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<()>;

    /// Loads an order with its items.
    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads a user's orders, newest first.
    async fn find_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Loads every order, newest first.
    async fn find_all_orders(&self) -> Result<Vec<Order>>;

    /// Overwrites the status of an order.
    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()>;
}
