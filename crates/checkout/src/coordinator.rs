//! Checkout coordinator turning a cart into an order atomically.

use std::time::{Duration, Instant};

use common::UserId;
use domain::{CartItem, Order};
use store::{CartStore, OrderStore, ProductStore};

use crate::error::CheckoutError;
use crate::inventory::InventoryGuard;

/// Orchestrates checkouts.
///
/// Each checkout runs inside a single unit of work: every product row in the
/// cart is locked in ascending product id order, stock is verified and
/// deducted, the order is written with the prices read under those locks and
/// the cart is emptied. Any failure, including the deadline elapsing, rolls
/// the whole unit back.
pub struct CheckoutCoordinator<S> {
    store: S,
    deadline: Option<Duration>,
}

impl<S> CheckoutCoordinator<S>
where
    S: CartStore + ProductStore + OrderStore,
{
    /// Creates a coordinator without a deadline.
    pub fn new(store: S) -> Self {
        Self {
            store,
            deadline: None,
        }
    }

    /// Abandons and rolls back any checkout that runs longer than `deadline`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Converts the user's cart into a pending order.
    ///
    /// On success the order is committed, stock is deducted and the cart is
    /// empty. On any error none of that has happened. The deadline covers
    /// everything up to the commit, so `DeadlineExceeded` always means
    /// nothing was committed.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn checkout(&self, user_id: UserId) -> Result<Order, CheckoutError> {
        metrics::counter!("checkout_total").increment(1);
        let started = Instant::now();

        let result = self.run(user_id).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(order) => {
                metrics::counter!("checkout_succeeded").increment(1);
                tracing::info!(
                    order_id = %order.id,
                    items = order.item_count(),
                    total = %order.total_amount,
                    "checkout committed"
                );
            }
            Err(e) if e.is_business_rule() => {
                metrics::counter!("checkout_rejected", "reason" => e.reason()).increment(1);
                tracing::warn!(error = %e, "checkout rejected");
            }
            Err(e) => {
                metrics::counter!("checkout_failed").increment(1);
                tracing::error!(error = %e, "checkout failed");
            }
        }
        result
    }

    async fn run(&self, user_id: UserId) -> Result<Order, CheckoutError> {
        let has_items = self
            .store
            .find_cart_by_user(user_id)
            .await?
            .is_some_and(|cart| !cart.is_empty());
        if !has_items {
            return Err(CheckoutError::EmptyCart { user_id });
        }

        // Dropping the future on timeout drops the open transaction, which
        // rolls it back and releases its row locks.
        let (tx, order) = match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.prepare(user_id))
                .await
                .unwrap_or(Err(CheckoutError::DeadlineExceeded(deadline)))?,
            None => self.prepare(user_id).await?,
        };

        self.store.commit(tx).await?;
        Ok(order)
    }

    /// Does every write of the checkout and hands back the still-open unit
    /// of work.
    async fn prepare(&self, user_id: UserId) -> Result<(S::Tx, Order), CheckoutError> {
        let mut tx = self.store.begin().await?;
        match self.place_order(&mut tx, user_id).await {
            Ok(order) => Ok((tx, order)),
            Err(e) => {
                if let Err(rollback_err) = self.store.rollback(tx).await {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn place_order(&self, tx: &mut S::Tx, user_id: UserId) -> Result<Order, CheckoutError> {
        // Re-read under the cart lock: a second checkout of the same cart
        // waits here and then finds it empty.
        let cart = self
            .store
            .lock_cart(tx, user_id)
            .await?
            .filter(|cart| !cart.is_empty())
            .ok_or(CheckoutError::EmptyCart { user_id })?;

        // Ascending product id order keeps concurrent checkouts from
        // deadlocking on each other's rows.
        let mut items: Vec<&CartItem> = cart.items.iter().collect();
        items.sort_by_key(|item| item.product_id);

        let inventory = InventoryGuard::new(&self.store);
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            lines.push(inventory.reserve(tx, item).await?);
        }

        let order = Order::place(cart.user_id, lines)?;
        self.store.insert_order(tx, &order).await?;

        let cleared = self.store.clear_cart(tx, cart.id).await?;
        let ordered = order.item_count() as u64;
        if cleared != ordered {
            return Err(CheckoutError::CartChanged {
                cart_id: cart.id,
                ordered,
                cleared,
            });
        }
        tracing::debug!(cart_id = %cart.id, cleared, "cart cleared");

        Ok(order)
    }
}
