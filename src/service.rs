use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::OrderCache;
use crate::db::{OrderStore, StoreError};
use crate::metrics::Metrics;
use crate::models::{DecodeError, Order};

// ============================================================================
// Order Service - Consistency protocol between store, cache and ingress
// ============================================================================
//
// - warm_up:    store.get_all -> cache.put for every aggregate
// - get_order:  cache first; on a miss read the store and repopulate unless
//               a write landed in the cache meanwhile
// - persist:    store.save, and only after it succeeds cache.put
//
// The HTTP API and the ingestion pipeline share one instance. Every store call
// is bounded by store_timeout.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid order payload: {0}")]
    Invalid(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    metrics: Arc<Metrics>,
    store_timeout: Duration,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<OrderCache>,
        metrics: Arc<Metrics>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            metrics,
            store_timeout,
        }
    }

    pub fn store(&self) -> Arc<dyn OrderStore> {
        Arc::clone(&self.store)
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        };

        if let Err(ref e) = result {
            tracing::warn!(operation, error = %e, "Store operation failed");
            self.metrics.record_store_failure(operation);
        }
        result
    }

    async fn refresh_cache_gauge(&self) {
        self.metrics.set_cache_entries(self.cache.len().await);
    }

    /// Load every persisted aggregate into the cache.
    ///
    /// Must complete before any ingress starts. The deadline covers the whole
    /// load, not a single store call.
    pub async fn warm_up(&self, deadline: Duration) -> Result<usize, StoreError> {
        let orders = match tokio::time::timeout(deadline, self.store.get_all()).await {
            Ok(result) => result?,
            Err(_) => return Err(StoreError::Timeout(deadline)),
        };

        let loaded = orders.len();
        for order in orders {
            self.cache.put(order).await;
        }
        self.refresh_cache_gauge().await;

        tracing::info!(loaded, "Cache warm-up complete");
        Ok(loaded)
    }

    /// Ok(None) means the order exists neither in the cache nor in the store.
    pub async fn get_order(&self, order_uid: &str) -> Result<Option<Arc<Order>>, StoreError> {
        if let Some(order) = self.cache.get(order_uid).await {
            self.metrics.record_cache_lookup(true);
            return Ok(Some(order));
        }
        self.metrics.record_cache_lookup(false);

        let Some(order) = self
            .bounded("get_by_id", self.store.get_by_id(order_uid))
            .await?
        else {
            tracing::debug!(order_uid, "Order not found");
            return Ok(None);
        };

        let cached = self.cache.insert_if_absent(order).await;
        self.refresh_cache_gauge().await;
        tracing::debug!(order_uid, "Cache repopulated from store");
        Ok(Some(cached))
    }

    /// Decode, validate and persist an order received over HTTP.
    pub async fn create_order(&self, payload: &[u8]) -> Result<Arc<Order>, ServiceError> {
        let order = Order::decode(payload)?;
        Ok(self.persist(order).await?)
    }

    /// Durable first, then visible: the cache is only touched after the save
    /// has committed.
    pub async fn persist(&self, order: Order) -> Result<Arc<Order>, StoreError> {
        self.bounded("save", self.store.save(&order)).await?;

        let order_uid = order.order_uid.clone();
        let stored = self.cache.put(order).await;
        self.refresh_cache_gauge().await;

        tracing::debug!(order_uid = %order_uid, "Order persisted and cached");
        Ok(stored)
    }
}
