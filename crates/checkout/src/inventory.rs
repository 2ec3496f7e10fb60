//! Stock verification and deduction under a product row lock.

use common::ProductId;
use domain::{CartItem, DomainError, OrderLine, Product};
use store::ProductStore;

use crate::error::CheckoutError;

/// Reserves stock for cart lines within a checkout's unit of work.
///
/// Every read goes through [`ProductStore::lock_product`], so the stock a
/// line is checked against cannot change until the unit of work ends.
pub struct InventoryGuard<'a, S> {
    store: &'a S,
}

impl<'a, S: ProductStore> InventoryGuard<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Locks a product row and reads its current state.
    pub async fn lock_and_read(
        &self,
        tx: &mut S::Tx,
        product_id: ProductId,
    ) -> Result<Product, CheckoutError> {
        tracing::debug!(%product_id, "locking product");
        self.store
            .lock_product(tx, product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(product_id))
    }

    /// Deducts `quantity` from a locked product and writes the new stock.
    ///
    /// On insufficient stock the product is left untouched and nothing is
    /// written.
    pub async fn deduct(
        &self,
        tx: &mut S::Tx,
        product: &mut Product,
        quantity: u32,
    ) -> Result<(), CheckoutError> {
        if let Err(e) = product.remove_stock(quantity) {
            return Err(match e {
                DomainError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                } => CheckoutError::InsufficientStock {
                    product_id,
                    product_name: product.name.clone(),
                    requested,
                    available,
                },
                other => other.into(),
            });
        }

        self.store
            .write_stock(tx, product.id, product.stock)
            .await?;
        tracing::debug!(
            product_id = %product.id,
            quantity,
            remaining = product.stock,
            "stock deducted"
        );
        Ok(())
    }

    /// Locks, verifies and deducts stock for one cart line.
    ///
    /// Returns the order line with the product's price at this moment.
    pub async fn reserve(&self, tx: &mut S::Tx, item: &CartItem) -> Result<OrderLine, CheckoutError> {
        let mut product = self.lock_and_read(tx, item.product_id).await?;
        self.deduct(tx, &mut product, item.quantity).await?;
        Ok(OrderLine::new(product.id, item.quantity, product.price))
    }
}
