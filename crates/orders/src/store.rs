//! Storage seam for orders.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, UserId};
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result};
use crate::order::Order;

/// Persistence interface for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order.
    async fn insert(&self, order: Order) -> Result<()>;

    /// Returns an order by ID.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Replaces an order, enforcing the optimistic version: the update
    /// only succeeds if the stored version is exactly one behind.
    async fn update_versioned(&self, order: Order) -> Result<()>;

    /// Returns a user's orders, newest first.
    async fn for_user(&self, user_id: UserId) -> Result<Vec<Order>>;
}

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders, for test assertions.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        self.orders.write().await.insert(order.id, order);
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update_versioned(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or(CheckoutError::OrderNotFound(order.id))?;
        if stored.version + 1 != order.version {
            return Err(CheckoutError::VersionConflict {
                order_id: order.id,
                expected: stored.version + 1,
                actual: order.version,
            });
        }
        *stored = order;
        Ok(())
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut list: Vec<Order> = orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }
}
