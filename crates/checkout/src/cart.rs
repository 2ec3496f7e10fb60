//! Cart service: the per-user working set of intended purchases.

use std::collections::HashMap;

use common::{CartItemId, ProductId, UserId};
use domain::{Cart, CartItem, CartLine, CartSummary, Product, validate_quantity};
use store::store::CARTS_USER_ID_KEY;
use store::{CartStore, ProductStore, StoreError};

use crate::error::{Result, ServiceError};

/// Manages carts and their items.
///
/// Quantities are validated before anything is persisted. Stock is not
/// checked here; only the checkout enforces it.
#[derive(Clone)]
pub struct CartService<S> {
    store: S,
}

impl<S> CartService<S>
where
    S: CartStore + ProductStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's cart, creating an empty one on first use.
    ///
    /// Two concurrent first calls for the same user yield the same cart: the
    /// loser of the insert race re-reads the winner's cart.
    #[tracing::instrument(skip(self))]
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Cart> {
        if let Some(cart) = self.store.find_cart_by_user(user_id).await? {
            return Ok(cart);
        }

        let cart = Cart::new(user_id);
        match self.store.insert_cart(&cart).await {
            Ok(()) => {
                tracing::debug!(cart_id = %cart.id, "cart created");
                Ok(cart)
            }
            Err(e) if e.is_unique_violation(CARTS_USER_ID_KEY) => {
                tracing::debug!("cart created concurrently, re-reading");
                self.store.find_cart_by_user(user_id).await?.ok_or_else(|| {
                    ServiceError::Store(StoreError::Conflict(format!(
                        "cart for user {user_id} vanished after unique violation"
                    )))
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the user's cart with live product names, prices and stock.
    pub async fn get_cart(&self, user_id: UserId) -> Result<CartSummary> {
        let cart = self.get_or_create(user_id).await?;

        let product_ids: Vec<ProductId> = cart.items.iter().map(|item| item.product_id).collect();
        let products: HashMap<ProductId, Product> = self
            .store
            .find_products(&product_ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        let lines = cart
            .items
            .iter()
            .filter_map(|item| match products.get(&item.product_id) {
                Some(product) => Some(CartLine::new(item.clone(), product)),
                None => {
                    tracing::warn!(item_id = %item.id, product_id = %item.product_id, "cart item references missing product");
                    None
                }
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(CartSummary::new(&cart, lines)?)
    }

    /// Adds a product to the user's cart.
    ///
    /// If the cart already holds the product the quantities are summed.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i64,
    ) -> Result<CartItem> {
        let quantity = validate_quantity(quantity)?;

        if self.store.find_product(product_id).await?.is_none() {
            return Err(ServiceError::not_found("product", product_id));
        }

        let cart = self.get_or_create(user_id).await?;
        let item = self
            .store
            .add_cart_item(cart.id, product_id, quantity)
            .await?;

        metrics::counter!("cart_items_added_total").increment(1);
        tracing::debug!(item_id = %item.id, quantity = item.quantity, "cart item added");
        Ok(item)
    }

    /// Replaces the quantity of an item in the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<CartItem> {
        let quantity = validate_quantity(quantity)?;
        self.owned_item(user_id, item_id).await?;
        Ok(self.store.update_cart_item(item_id, quantity).await?)
    }

    /// Removes an item from the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<()> {
        self.owned_item(user_id, item_id).await?;
        Ok(self.store.remove_cart_item(item_id).await?)
    }

    /// Loads an item, failing unless it belongs to the user's cart.
    async fn owned_item(&self, user_id: UserId, item_id: CartItemId) -> Result<CartItem> {
        let item = self
            .store
            .find_cart_item(item_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("cart item", item_id))?;

        let owned = self
            .store
            .find_cart_by_user(user_id)
            .await?
            .is_some_and(|cart| cart.id == item.cart_id);
        if !owned {
            tracing::warn!(%item_id, "cart item belongs to another user");
            return Err(ServiceError::Forbidden(format!(
                "cart item {item_id} does not belong to the caller"
            )));
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{DomainError, Money};
    use store::InMemoryStore;

    async fn setup() -> (CartService<InMemoryStore>, Product) {
        let store = InMemoryStore::new();
        let product = Product::new("Widget", Money::from_cents(1250), 3).unwrap();
        store.insert_product(product.clone()).await;
        (CartService::new(store), product)
    }

    #[tokio::test]
    async fn get_or_create_is_stable() {
        let (service, _) = setup().await;
        let user_id = UserId::new();

        let first = service.get_or_create(user_id).await.unwrap();
        let second = service.get_or_create(user_id).await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.is_empty());
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_one_cart() {
        let (service, _) = setup().await;
        let user_id = UserId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.get_or_create(user_id).await.unwrap().id })
            })
            .collect();

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn add_item_merges_same_product() {
        let (service, product) = setup().await;
        let user_id = UserId::new();

        let first = service.add_item(user_id, product.id, 2).await.unwrap();
        let second = service.add_item(user_id, product.id, 3).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.quantity, 5);

        let summary = service.get_cart(user_id).await.unwrap();
        assert_eq!(summary.lines.len(), 1);
    }

    #[tokio::test]
    async fn add_item_does_not_check_stock() {
        let (service, product) = setup().await;
        let item = service
            .add_item(UserId::new(), product.id, 50)
            .await
            .unwrap();
        assert_eq!(item.quantity, 50);
    }

    #[tokio::test]
    async fn add_item_rejects_non_positive_quantity() {
        let (service, product) = setup().await;
        let user_id = UserId::new();

        for quantity in [0, -1] {
            let err = service
                .add_item(user_id, product.id, quantity)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ServiceError::InvalidInput(DomainError::InvalidQuantity { .. })
            ));
        }

        // Nothing was persisted, not even the cart
        assert!(
            service
                .store
                .find_cart_by_user(user_id)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn add_item_unknown_product() {
        let (service, _) = setup().await;
        let err = service
            .add_item(UserId::new(), ProductId::new(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "product", .. }));
    }

    #[tokio::test]
    async fn get_cart_shows_live_prices() {
        let (service, product) = setup().await;
        let user_id = UserId::new();
        service.add_item(user_id, product.id, 2).await.unwrap();

        let summary = service.get_cart(user_id).await.unwrap();
        assert_eq!(summary.estimated_total.cents(), 2500);
        assert_eq!(summary.lines[0].product_name, "Widget");
        assert_eq!(summary.lines[0].available_stock, 3);

        service
            .store
            .set_product_price(product.id, Money::from_cents(1000))
            .await
            .unwrap();
        let summary = service.get_cart(user_id).await.unwrap();
        assert_eq!(summary.estimated_total.cents(), 2000);
    }

    #[tokio::test]
    async fn get_cart_rejects_unrepresentable_total() {
        let (service, _) = setup().await;
        let pricey = Product::new("Pricey", Money::from_cents(i64::MAX / 2), 10).unwrap();
        service.store.insert_product(pricey.clone()).await;
        let user_id = UserId::new();
        service.add_item(user_id, pricey.id, 3).await.unwrap();

        let err = service.get_cart(user_id).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidInput(DomainError::AmountOverflow)
        ));
    }

    #[tokio::test]
    async fn update_and_remove_item() {
        let (service, product) = setup().await;
        let user_id = UserId::new();
        let item = service.add_item(user_id, product.id, 1).await.unwrap();

        let updated = service.update_item(user_id, item.id, 7).await.unwrap();
        assert_eq!(updated.quantity, 7);

        assert!(matches!(
            service.update_item(user_id, item.id, 0).await,
            Err(ServiceError::InvalidInput(_))
        ));

        service.remove_item(user_id, item.id).await.unwrap();
        let cart = service.get_or_create(user_id).await.unwrap();
        assert!(cart.is_empty());

        assert!(matches!(
            service.remove_item(user_id, item.id).await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn cannot_touch_another_users_item() {
        let (service, product) = setup().await;
        let owner = UserId::new();
        let intruder = UserId::new();
        let item = service.add_item(owner, product.id, 1).await.unwrap();

        assert!(matches!(
            service.update_item(intruder, item.id, 5).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.remove_item(intruder, item.id).await,
            Err(ServiceError::Forbidden(_))
        ));

        let cart = service.get_or_create(owner).await.unwrap();
        assert_eq!(cart.items[0].quantity, 1);
    }
}
