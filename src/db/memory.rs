use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{OrderStore, StoreError};
use crate::models::Order;

/// In-memory stand-in for PostgreSQL with failure injection.
///
/// Each save replaces the whole aggregate under one lock, mirroring the
/// transactional replace of the real store.
#[derive(Default)]
pub(crate) struct InMemoryOrderStore {
    orders: Mutex<BTreeMap<String, Order>>,
    fail_saves: AtomicBool,
    fail_reads: AtomicBool,
    save_delay: Mutex<Option<Duration>>,
    read_delay: Mutex<Option<Duration>>,
    saves: AtomicUsize,
    reads: AtomicUsize,
}

impl InMemoryOrderStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn seeded(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut map = store.orders.lock().await;
            for order in orders {
                map.insert(order.order_uid.clone(), order);
            }
        }
        store
    }

    pub(crate) fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) async fn delay_saves(&self, delay: Duration) {
        *self.save_delay.lock().await = Some(delay);
    }

    /// Delay `get_by_id` after its snapshot has been taken.
    pub(crate) async fn delay_reads(&self, delay: Duration) {
        *self.read_delay.lock().await = Some(delay);
    }

    pub(crate) fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub(crate) fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) async fn stored(&self, order_uid: &str) -> Option<Order> {
        self.orders.lock().await.get(order_uid).cloned()
    }

    pub(crate) async fn len(&self) -> usize {
        self.orders.lock().await.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        let delay = *self.save_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }

        self.saves.fetch_add(1, Ordering::SeqCst);
        self.orders
            .lock()
            .await
            .insert(order.order_uid.clone(), order.clone());
        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Option<Order>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        let snapshot = self.orders.lock().await.get(order_uid).cloned();

        let delay = *self.read_delay.lock().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.orders.lock().await.values().cloned().collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}
