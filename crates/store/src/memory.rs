use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, OrderId, ProductId, UserId};
use domain::cart::MAX_LINE_QUANTITY;
use domain::{Cart, CartItem, Money, Order, OrderStatus, Product};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Result, StoreError,
    store::{CARTS_USER_ID_KEY, CartStore, OrderStore, ProductStore, Store},
};

#[derive(Debug, Clone)]
struct CartRow {
    id: CartId,
    user_id: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Tables {
    carts: HashMap<CartId, CartRow>,
    carts_by_user: HashMap<UserId, CartId>,
    cart_items: HashMap<CartItemId, CartItem>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
}

impl Tables {
    fn cart_with_items(&self, row: &CartRow) -> Cart {
        let mut items: Vec<CartItem> = self
            .cart_items
            .values()
            .filter(|item| item.cart_id == row.id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        Cart {
            id: row.id,
            user_id: row.user_id,
            items,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn newest_first<'a>(orders: impl Iterator<Item = &'a Order>) -> Vec<Order> {
    let mut orders: Vec<Order> = orders.cloned().collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

/// Per-key exclusive locks standing in for database row locks.
type RowLocks<K> = Arc<Mutex<HashMap<K, Arc<Mutex<()>>>>>;

async fn acquire<K>(locks: &RowLocks<K>, key: K) -> OwnedMutexGuard<()>
where
    K: std::hash::Hash + Eq,
{
    let row_lock = {
        let mut locks = locks.lock().await;
        locks.entry(key).or_default().clone()
    };
    row_lock.lock_owned().await
}

/// A write buffered until commit.
#[derive(Debug)]
enum PendingWrite {
    Stock { product_id: ProductId, stock: u32 },
    Order(Order),
    ClearCart(CartId),
}

/// Transaction handle for [`InMemoryStore`].
///
/// Holds the row locks it acquired and the writes it buffered. Dropping it
/// releases the locks and forgets the writes.
#[derive(Default)]
pub struct InMemoryTx {
    cart_guards: HashMap<UserId, OwnedMutexGuard<()>>,
    row_guards: HashMap<ProductId, OwnedMutexGuard<()>>,
    writes: Vec<PendingWrite>,
}

impl InMemoryTx {
    fn pending_stock(&self, product_id: ProductId) -> Option<u32> {
        self.writes.iter().rev().find_map(|write| match write {
            PendingWrite::Stock {
                product_id: id,
                stock,
            } if *id == product_id => Some(*stock),
            _ => None,
        })
    }

    fn holds_lock(&self, product_id: ProductId) -> bool {
        self.row_guards.contains_key(&product_id)
    }
}

impl std::fmt::Debug for InMemoryTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTx")
            .field("locked_carts", &self.cart_guards.keys().collect::<Vec<_>>())
            .field("locked_products", &self.row_guards.keys().collect::<Vec<_>>())
            .field("writes", &self.writes)
            .finish()
    }
}

/// In-memory store implementation for testing and local runs.
///
/// Provides the same locking semantics as the PostgreSQL implementation:
/// [`CartStore::lock_cart`] and [`ProductStore::lock_product`] take a
/// per-row mutex that is held by the transaction until it commits, rolls
/// back or is dropped, and transactional writes stay invisible to other
/// readers until commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
    cart_locks: RowLocks<UserId>,
    row_locks: RowLocks<ProductId>,
    fail_on_commit: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a catalog product.
    pub async fn insert_product(&self, product: Product) {
        self.tables
            .write()
            .await
            .products
            .insert(product.id, product);
    }

    /// Changes a product's catalog price.
    pub async fn set_product_price(&self, product_id: ProductId, price: Money) -> Result<()> {
        let mut tables = self.tables.write().await;
        let product = tables
            .products
            .get_mut(&product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        product.price = price;
        product.updated_at = Utc::now();
        Ok(())
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Configures the store to fail every commit, simulating a database fault.
    pub fn set_fail_on_commit(&self, fail: bool) {
        self.fail_on_commit.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> Result<InMemoryTx> {
        Ok(InMemoryTx::default())
    }

    async fn commit(&self, tx: InMemoryTx) -> Result<()> {
        if self.fail_on_commit.load(Ordering::SeqCst) {
            tracing::warn!(writes = tx.writes.len(), "in-memory commit rejected");
            return Err(StoreError::Conflict("commit rejected".to_string()));
        }

        let InMemoryTx {
            cart_guards,
            row_guards,
            writes,
        } = tx;
        {
            let mut tables = self.tables.write().await;

            // Validate everything before applying anything
            for write in &writes {
                match write {
                    PendingWrite::Stock { product_id, .. }
                        if !tables.products.contains_key(product_id) =>
                    {
                        return Err(StoreError::not_found("product", product_id));
                    }
                    PendingWrite::Order(order) if tables.orders.contains_key(&order.id) => {
                        return Err(StoreError::UniqueViolation {
                            constraint: "orders_pkey".to_string(),
                        });
                    }
                    _ => {}
                }
            }

            let now = Utc::now();
            for write in writes {
                match write {
                    PendingWrite::Stock { product_id, stock } => {
                        if let Some(product) = tables.products.get_mut(&product_id) {
                            product.stock = stock;
                            product.updated_at = now;
                        }
                    }
                    PendingWrite::Order(order) => {
                        tables.orders.insert(order.id, order);
                    }
                    PendingWrite::ClearCart(cart_id) => {
                        tables.cart_items.retain(|_, item| item.cart_id != cart_id);
                        if let Some(cart) = tables.carts.get_mut(&cart_id) {
                            cart.updated_at = now;
                        }
                    }
                }
            }
        }

        // Row locks are released only after the writes are visible
        drop(row_guards);
        drop(cart_guards);
        Ok(())
    }

    async fn rollback(&self, tx: InMemoryTx) -> Result<()> {
        drop(tx);
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn find_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let tables = self.tables.read().await;
        Ok(tables
            .carts_by_user
            .get(&user_id)
            .and_then(|cart_id| tables.carts.get(cart_id))
            .map(|row| tables.cart_with_items(row)))
    }

    async fn lock_cart(&self, tx: &mut InMemoryTx, user_id: UserId) -> Result<Option<Cart>> {
        if !tx.cart_guards.contains_key(&user_id) {
            let guard = acquire(&self.cart_locks, user_id).await;
            tx.cart_guards.insert(user_id, guard);
        }
        self.find_cart_by_user(user_id).await
    }

    async fn insert_cart(&self, cart: &Cart) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.carts_by_user.contains_key(&cart.user_id) {
            return Err(StoreError::UniqueViolation {
                constraint: CARTS_USER_ID_KEY.to_string(),
            });
        }

        tables.carts_by_user.insert(cart.user_id, cart.id);
        tables.carts.insert(
            cart.id,
            CartRow {
                id: cart.id,
                user_id: cart.user_id,
                created_at: cart.created_at,
                updated_at: cart.updated_at,
            },
        );
        Ok(())
    }

    async fn find_cart_item(&self, item_id: CartItemId) -> Result<Option<CartItem>> {
        Ok(self.tables.read().await.cart_items.get(&item_id).cloned())
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let mut tables = self.tables.write().await;
        if !tables.carts.contains_key(&cart_id) {
            return Err(StoreError::not_found("cart", cart_id));
        }
        if !tables.products.contains_key(&product_id) {
            return Err(StoreError::not_found("product", product_id));
        }

        let existing = tables
            .cart_items
            .values_mut()
            .find(|item| item.cart_id == cart_id && item.product_id == product_id);

        if let Some(item) = existing {
            let merged = item
                .quantity
                .checked_add(quantity)
                .filter(|q| *q <= MAX_LINE_QUANTITY)
                .ok_or_else(|| {
                    StoreError::Conflict(format!("quantity overflow for cart item {}", item.id))
                })?;
            item.quantity = merged;
            item.updated_at = Utc::now();
            return Ok(item.clone());
        }

        let item = CartItem::new(cart_id, product_id, quantity)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        tables.cart_items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn update_cart_item(&self, item_id: CartItemId, quantity: u32) -> Result<CartItem> {
        if quantity == 0 || quantity > MAX_LINE_QUANTITY {
            return Err(StoreError::Conflict(format!(
                "quantity {quantity} violates cart_items_quantity_check"
            )));
        }

        let mut tables = self.tables.write().await;
        let item = tables
            .cart_items
            .get_mut(&item_id)
            .ok_or_else(|| StoreError::not_found("cart item", item_id))?;
        item.quantity = quantity;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn remove_cart_item(&self, item_id: CartItemId) -> Result<()> {
        self.tables
            .write()
            .await
            .cart_items
            .remove(&item_id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("cart item", item_id))
    }

    async fn clear_cart(&self, tx: &mut InMemoryTx, cart_id: CartId) -> Result<u64> {
        let tables = self.tables.read().await;
        let count = tables
            .cart_items
            .values()
            .filter(|item| item.cart_id == cart_id)
            .count() as u64;
        tx.writes.push(PendingWrite::ClearCart(cart_id));
        Ok(count)
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn find_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&product_id).cloned())
    }

    async fn find_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        Ok(product_ids
            .iter()
            .filter_map(|id| tables.products.get(id).cloned())
            .collect())
    }

    async fn lock_product(
        &self,
        tx: &mut InMemoryTx,
        product_id: ProductId,
    ) -> Result<Option<Product>> {
        if !tx.holds_lock(product_id) {
            let guard = acquire(&self.row_locks, product_id).await;
            tx.row_guards.insert(product_id, guard);
        }

        let tables = self.tables.read().await;
        Ok(tables.products.get(&product_id).cloned().map(|mut product| {
            if let Some(stock) = tx.pending_stock(product_id) {
                product.stock = stock;
            }
            product
        }))
    }

    async fn write_stock(
        &self,
        tx: &mut InMemoryTx,
        product_id: ProductId,
        stock: u32,
    ) -> Result<()> {
        if !tx.holds_lock(product_id) {
            return Err(StoreError::Conflict(format!(
                "product {product_id} is not locked by this transaction"
            )));
        }
        tx.writes.push(PendingWrite::Stock { product_id, stock });
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, tx: &mut InMemoryTx, order: &Order) -> Result<()> {
        tx.writes.push(PendingWrite::Order(order.clone()));
        Ok(())
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn find_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.orders.values().filter(|o| o.user_id == user_id),
        ))
    }

    async fn find_all_orders(&self) -> Result<Vec<Order>> {
        let tables = self.tables.read().await;
        Ok(newest_first(tables.orders.values()))
    }

    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }
}
