use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::Order;

// ============================================================================
// Order Cache - Process-local read path
// ============================================================================
//
// Volatile projection of the persistent store, keyed by order_uid.
// Reads take the shared lock, writes take the exclusive lock, and every
// operation completes inside a single lock scope, so readers never observe a
// half-written aggregate. Entries are handed out as Arc<Order>: callers get
// read-only views and the cache keeps ownership.
//
// The cache never talks to the database; resolving a miss is the caller's job.
//
// ============================================================================

#[derive(Default)]
pub struct OrderCache {
    orders: RwLock<HashMap<String, Arc<Order>>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        self.orders.read().await.get(order_uid).cloned()
    }

    /// Insert or overwrite the entry for the order's identifier.
    pub async fn put(&self, order: Order) -> Arc<Order> {
        let order = Arc::new(order);
        self.orders
            .write()
            .await
            .insert(order.order_uid.clone(), Arc::clone(&order));
        order
    }

    /// Insert only when no entry exists for the identifier; returns the entry
    /// that is cached afterwards. A store read racing a completed write must
    /// not replace the newer aggregate.
    pub async fn insert_if_absent(&self, order: Order) -> Arc<Order> {
        let mut orders = self.orders.write().await;
        Arc::clone(
            orders
                .entry(order.order_uid.clone())
                .or_insert_with(|| Arc::new(order)),
        )
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }
}
