//! Order queries and administrative status changes.

use common::{OrderId, UserId};
use domain::{Identity, Order, OrderStatus};
use store::OrderStore;

use crate::error::{Result, ServiceError};

/// Reads orders and exposes the status update capability.
///
/// Orders are only ever created by the checkout.
#[derive(Clone)]
pub struct OrderService<S> {
    store: S,
}

impl<S: OrderStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's orders, newest first.
    pub async fn get_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.find_orders_by_user(user_id).await?)
    }

    /// Returns one order if the caller owns it or is an administrator.
    pub async fn get_order(&self, identity: &Identity, order_id: OrderId) -> Result<Order> {
        let order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", order_id))?;

        if !identity.can_access(order.user_id) {
            return Err(ServiceError::Forbidden(format!(
                "order {order_id} belongs to another user"
            )));
        }
        Ok(order)
    }

    /// Returns every order, newest first. Administrators only.
    pub async fn get_all_orders(&self, identity: &Identity) -> Result<Vec<Order>> {
        require_admin(identity)?;
        Ok(self.store.find_all_orders().await?)
    }

    /// Sets an order's status. Administrators only.
    ///
    /// No lifecycle rules are enforced here; the flows that move orders
    /// forward own them.
    #[tracing::instrument(skip(self, identity), fields(admin = %identity.user_id))]
    pub async fn update_status(
        &self,
        identity: &Identity,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order> {
        require_admin(identity)?;

        let mut order = self
            .store
            .find_order(order_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", order_id))?;

        let from = order.status;
        self.store.update_order_status(order_id, status).await?;
        order.status = status;

        tracing::info!(%order_id, %from, to = %status, "order status updated");
        Ok(order)
    }
}

fn require_admin(identity: &Identity) -> Result<()> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "administrator role required".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{Money, OrderLine};
    use store::{InMemoryStore, Store};

    async fn placed_order(store: &InMemoryStore, user_id: UserId) -> Order {
        let order = Order::place(
            user_id,
            vec![OrderLine::new(
                common::ProductId::new(),
                2,
                Money::from_cents(300),
            )],
        )
        .unwrap();
        let mut tx = store.begin().await.unwrap();
        store.insert_order(&mut tx, &order).await.unwrap();
        store.commit(tx).await.unwrap();
        order
    }

    #[tokio::test]
    async fn owner_and_admin_can_read_order() {
        let store = InMemoryStore::new();
        let owner = UserId::new();
        let order = placed_order(&store, owner).await;
        let service = OrderService::new(store);

        let mine = service
            .get_order(&Identity::customer(owner), order.id)
            .await
            .unwrap();
        assert_eq!(mine.id, order.id);

        assert!(
            service
                .get_order(&Identity::admin(UserId::new()), order.id)
                .await
                .is_ok()
        );

        assert!(matches!(
            service
                .get_order(&Identity::customer(UserId::new()), order.id)
                .await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let service = OrderService::new(InMemoryStore::new());
        assert!(matches!(
            service
                .get_order(&Identity::admin(UserId::new()), OrderId::new())
                .await,
            Err(ServiceError::NotFound { entity: "order", .. })
        ));
    }

    #[tokio::test]
    async fn get_orders_only_returns_own() {
        let store = InMemoryStore::new();
        let me = UserId::new();
        placed_order(&store, me).await;
        placed_order(&store, me).await;
        placed_order(&store, UserId::new()).await;
        let service = OrderService::new(store);

        assert_eq!(service.get_orders(me).await.unwrap().len(), 2);
        assert!(service.get_orders(UserId::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_all_orders_requires_admin() {
        let store = InMemoryStore::new();
        placed_order(&store, UserId::new()).await;
        placed_order(&store, UserId::new()).await;
        let service = OrderService::new(store);

        assert_eq!(
            service
                .get_all_orders(&Identity::admin(UserId::new()))
                .await
                .unwrap()
                .len(),
            2
        );
        assert!(matches!(
            service
                .get_all_orders(&Identity::customer(UserId::new()))
                .await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn update_status_sets_status() {
        let store = InMemoryStore::new();
        let order = placed_order(&store, UserId::new()).await;
        let service = OrderService::new(store);
        let admin = Identity::admin(UserId::new());

        let paid = service
            .update_status(&admin, order.id, OrderStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.status, OrderStatus::Paid);

        let reloaded = service.get_order(&admin, order.id).await.unwrap();
        assert_eq!(reloaded.status, OrderStatus::Paid);
        assert_eq!(reloaded.total_amount, order.total_amount);
    }

    #[tokio::test]
    async fn update_status_unknown_order() {
        let service = OrderService::new(InMemoryStore::new());
        assert!(matches!(
            service
                .update_status(&Identity::admin(UserId::new()), OrderId::new(), OrderStatus::Paid)
                .await,
            Err(ServiceError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn customers_cannot_update_status() {
        let store = InMemoryStore::new();
        let owner = UserId::new();
        let order = placed_order(&store, owner).await;
        let service = OrderService::new(store);

        assert!(matches!(
            service
                .update_status(&Identity::customer(owner), order.id, OrderStatus::Cancelled)
                .await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
