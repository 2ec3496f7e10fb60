use std::collections::HashMap;

use async_trait::async_trait;
use common::{CartId, CartItemId, OrderId, OrderItemId, ProductId, UserId};
use domain::{Cart, CartItem, Money, Order, OrderItem, OrderStatus, Product};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{CartStore, OrderStore, ProductStore, Store},
};

const PRODUCT_COLUMNS: &str = "id, name, price_cents, stock, created_at, updated_at";
const CART_COLUMNS: &str = "id, user_id, created_at, updated_at";
const CART_ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, created_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, total_amount_cents, status, created_at, updated_at";

/// PostgreSQL-backed store implementation.
///
/// Cart and product rows are locked with `SELECT ... FOR UPDATE`, so
/// concurrent checkouts of the same cart or touching the same product
/// serialize on the row lock.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        tracing::info!("running database migrations");
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Inserts a catalog product.
    pub async fn insert_product(&self, product: &Product) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, price_cents, stock, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(to_db_count(product.stock)?)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    /// Changes a product's catalog price.
    pub async fn set_product_price(&self, product_id: ProductId, price: Money) -> Result<()> {
        let result =
            sqlx::query("UPDATE products SET price_cents = $2, updated_at = NOW() WHERE id = $1")
                .bind(product_id.as_uuid())
                .bind(price.cents())
                .execute(&self.pool)
                .await
                .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", product_id));
        }
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: from_db_count(row.try_get("stock")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_cart(row: &PgRow, items: Vec<CartItem>) -> Result<Cart> {
        Ok(Cart {
            id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            items,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn cart_items_query() -> String {
        format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY created_at DESC, id DESC"
        )
    }

    fn row_to_cart_item(row: PgRow) -> Result<CartItem> {
        Ok(CartItem {
            id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            cart_id: CartId::from_uuid(row.try_get::<Uuid, _>("cart_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: from_db_count(row.try_get("quantity")?)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            quantity: from_db_count(row.try_get("quantity")?)?,
            price: Money::from_cents(row.try_get("price_cents")?),
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
        let status: String = row.try_get("status")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            items,
            total_amount: Money::from_cents(row.try_get("total_amount_cents")?),
            status: status
                .parse::<OrderStatus>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Loads the items for a batch of order rows, preserving the row order.
    async fn attach_items(&self, rows: Vec<PgRow>) -> Result<Vec<Order>> {
        let ids = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let item_rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, price_cents, created_at
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, position ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for row in &item_rows {
            let item = Self::row_to_order_item(row)?;
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        rows.iter()
            .map(|row| {
                let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
                let items = items_by_order.remove(&id).unwrap_or_default();
                Self::row_to_order(row, items)
            })
            .collect()
    }
}

/// Maps constraint and range failures onto store errors.
fn classify(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e {
        let constraint = db_err.constraint().unwrap_or_default().to_string();
        if db_err.is_unique_violation() {
            return StoreError::UniqueViolation { constraint };
        }
        if db_err.is_check_violation() || db_err.is_foreign_key_violation() {
            return StoreError::Conflict(format!("{}: {}", constraint, db_err.message()));
        }
        // numeric_value_out_of_range
        if db_err.code().as_deref() == Some("22003") {
            return StoreError::Conflict(db_err.message().to_string());
        }
    }
    StoreError::Database(e)
}

fn from_db_count(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative count {value}")))
}

fn to_db_count(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::Conflict(format!("count {value} out of range")))
}

#[async_trait]
impl Store for PostgresStore {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> Result<()> {
        tx.commit().await.map_err(classify)
    }

    async fn rollback(&self, tx: Self::Tx) -> Result<()> {
        Ok(tx.rollback().await?)
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn find_cart_by_user(&self, user_id: UserId) -> Result<Option<Cart>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query(&Self::cart_items_query())
            .bind(row.try_get::<Uuid, _>("id")?)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_cart_item)
            .collect::<Result<Vec<_>>>()?;

        Self::row_to_cart(&row, items).map(Some)
    }

    async fn lock_cart(&self, tx: &mut Self::Tx, user_id: UserId) -> Result<Option<Cart>> {
        let row: Option<PgRow> = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items = sqlx::query(&Self::cart_items_query())
            .bind(row.try_get::<Uuid, _>("id")?)
            .fetch_all(&mut **tx)
            .await?
            .into_iter()
            .map(Self::row_to_cart_item)
            .collect::<Result<Vec<_>>>()?;

        Self::row_to_cart(&row, items).map(Some)
    }

    async fn insert_cart(&self, cart: &Cart) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.user_id.as_uuid())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn find_cart_item(&self, item_id: CartItemId) -> Result<Option<CartItem>> {
        sqlx::query(&format!(
            "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE id = $1"
        ))
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_cart_item)
        .transpose()
    }

    async fn add_cart_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<CartItem> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO cart_items (id, cart_id, product_id, quantity, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT ON CONSTRAINT cart_items_cart_product_key
            DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW()
            RETURNING {CART_ITEM_COLUMNS}
            "#
        ))
        .bind(CartItemId::new().as_uuid())
        .bind(cart_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(to_db_count(quantity)?)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                match db_err.constraint() {
                    Some("cart_items_product_id_fkey") => {
                        return StoreError::not_found("product", product_id);
                    }
                    Some("cart_items_cart_id_fkey") => {
                        return StoreError::not_found("cart", cart_id);
                    }
                    _ => {}
                }
            }
            classify(e)
        })?;

        Self::row_to_cart_item(row)
    }

    async fn update_cart_item(&self, item_id: CartItemId, quantity: u32) -> Result<CartItem> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE cart_items SET quantity = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {CART_ITEM_COLUMNS}
            "#
        ))
        .bind(item_id.as_uuid())
        .bind(to_db_count(quantity)?)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?
        .ok_or_else(|| StoreError::not_found("cart item", item_id))?;

        Self::row_to_cart_item(row)
    }

    async fn remove_cart_item(&self, item_id: CartItemId) -> Result<()> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("cart item", item_id));
        }
        Ok(())
    }

    async fn clear_cart(&self, tx: &mut Self::Tx, cart_id: CartId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut **tx)
            .await?;

        sqlx::query("UPDATE carts SET updated_at = NOW() WHERE id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut **tx)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    async fn find_product(&self, product_id: ProductId) -> Result<Option<Product>> {
        sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_product)
        .transpose()
    }

    async fn find_products(&self, product_ids: &[ProductId]) -> Result<Vec<Product>> {
        let ids: Vec<Uuid> = product_ids.iter().map(ProductId::as_uuid).collect();

        sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_product)
        .collect()
    }

    async fn lock_product(
        &self,
        tx: &mut Self::Tx,
        product_id: ProductId,
    ) -> Result<Option<Product>> {
        sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE"
        ))
        .bind(product_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?
        .map(Self::row_to_product)
        .transpose()
    }

    async fn write_stock(
        &self,
        tx: &mut Self::Tx,
        product_id: ProductId,
        stock: u32,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE products SET stock = $2, updated_at = NOW() WHERE id = $1")
                .bind(product_id.as_uuid())
                .bind(to_db_count(stock)?)
                .execute(&mut **tx)
                .await
                .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", product_id));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn insert_order(&self, tx: &mut Self::Tx, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, total_amount_cents, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.total_amount.cents())
        .bind(order.status.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(classify)?;

        for (position, item) in order.items.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::Conflict("too many order items".to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, position, quantity, price_cents, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.product_id.as_uuid())
            .bind(position)
            .bind(to_db_count(item.quantity)?)
            .bind(item.price.cents())
            .bind(item.created_at)
            .execute(&mut **tx)
            .await
            .map_err(classify)?;
        }

        Ok(())
    }

    async fn find_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let rows = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        Ok(self.attach_items(rows).await?.into_iter().next())
    }

    async fn find_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        self.attach_items(rows).await
    }

    async fn find_all_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        self.attach_items(rows).await
    }

    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        let result =
            sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(order_id.as_uuid())
                .bind(status.as_str())
                .execute(&self.pool)
                .await
                .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order_id));
        }
        Ok(())
    }
}
