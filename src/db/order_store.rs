use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgConnection, Row};

use super::StoreError;
use crate::models::{Delivery, Item, Order, Payment};

// ============================================================================
// Order Store - Transactional home of the order aggregate
// ============================================================================
//
// Contract:
// - save:      one transaction writes orders + delivery + payment + items.
//              Every table is replaced for the order_uid (last writer wins).
// - get_by_id: Ok(None) when the order row is absent; an error when the
//              order exists but a companion row cannot be read.
// - get_all:   every aggregate, fully hydrated; empty store -> empty Vec.
//
// ============================================================================

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn save(&self, order: &Order) -> Result<(), StoreError>;

    async fn get_by_id(&self, order_uid: &str) -> Result<Option<Order>, StoreError>;

    async fn get_all(&self) -> Result<Vec<Order>, StoreError>;

    /// Cheap liveness probe used by health monitoring.
    async fn ping(&self) -> Result<(), StoreError>;
}

// ============================================================================
// SQL
// ============================================================================

const UPSERT_ORDER: &str = "
    INSERT INTO orders (
        order_uid, track_number, entry, locale, internal_signature,
        delivery_service, shardkey, sm_id, date_created, oof_shard
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
    ON CONFLICT (order_uid) DO UPDATE SET
        track_number = EXCLUDED.track_number,
        entry = EXCLUDED.entry,
        locale = EXCLUDED.locale,
        internal_signature = EXCLUDED.internal_signature,
        delivery_service = EXCLUDED.delivery_service,
        shardkey = EXCLUDED.shardkey,
        sm_id = EXCLUDED.sm_id,
        date_created = EXCLUDED.date_created,
        oof_shard = EXCLUDED.oof_shard";

const UPSERT_DELIVERY: &str = "
    INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ON CONFLICT (order_uid) DO UPDATE SET
        name = EXCLUDED.name,
        phone = EXCLUDED.phone,
        zip = EXCLUDED.zip,
        city = EXCLUDED.city,
        address = EXCLUDED.address,
        region = EXCLUDED.region,
        email = EXCLUDED.email";

const UPSERT_PAYMENT: &str = "
    INSERT INTO payment (
        order_uid, \"transaction\", request_id, currency, provider, amount,
        payment_dt, bank, delivery_cost, goods_total, custom_fee
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
    ON CONFLICT (order_uid) DO UPDATE SET
        \"transaction\" = EXCLUDED.\"transaction\",
        request_id = EXCLUDED.request_id,
        currency = EXCLUDED.currency,
        provider = EXCLUDED.provider,
        amount = EXCLUDED.amount,
        payment_dt = EXCLUDED.payment_dt,
        bank = EXCLUDED.bank,
        delivery_cost = EXCLUDED.delivery_cost,
        goods_total = EXCLUDED.goods_total,
        custom_fee = EXCLUDED.custom_fee";

const DELETE_ITEMS: &str = "DELETE FROM items WHERE order_uid = $1";

const INSERT_ITEM: &str = "
    INSERT INTO items (
        order_uid, line_no, chrt_id, track_number, price, rid, name,
        sale, size, total_price, nm_id, brand, status
    ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)";

const ORDER_COLUMNS: &str = "order_uid, track_number, entry, locale, internal_signature, \
     delivery_service, shardkey, sm_id, date_created, oof_shard";

const DELIVERY_COLUMNS: &str = "order_uid, name, phone, zip, city, address, region, email";

const PAYMENT_COLUMNS: &str = "order_uid, \"transaction\", request_id, currency, provider, \
     amount, payment_dt, bank, delivery_cost, goods_total, custom_fee";

const ITEM_COLUMNS: &str = "order_uid, chrt_id, track_number, price, rid, name, sale, size, \
     total_price, nm_id, brand, status";

const SNAPSHOT_READ: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

// ============================================================================
// PostgreSQL implementation
// ============================================================================

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_items(conn: &mut PgConnection, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query(DELETE_ITEMS)
            .bind(&order.order_uid)
            .execute(&mut *conn)
            .await?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(INSERT_ITEM)
                .bind(&order.order_uid)
                .bind(line_no as i32)
                .bind(item.chrt_id)
                .bind(&item.track_number)
                .bind(item.price)
                .bind(&item.rid)
                .bind(&item.name)
                .bind(item.sale)
                .bind(&item.size)
                .bind(item.total_price)
                .bind(item.nm_id)
                .bind(&item.brand)
                .bind(item.status)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        // Any early return drops `tx`, which rolls the whole write back.
        let mut tx = self.pool.begin().await?;

        sqlx::query(UPSERT_ORDER)
            .bind(&order.order_uid)
            .bind(&order.track_number)
            .bind(&order.entry)
            .bind(&order.locale)
            .bind(&order.internal_signature)
            .bind(&order.delivery_service)
            .bind(&order.shard_key)
            .bind(order.sm_id)
            .bind(&order.date_created)
            .bind(&order.oof_shard)
            .execute(&mut *tx)
            .await?;

        let delivery = &order.delivery;
        sqlx::query(UPSERT_DELIVERY)
            .bind(&order.order_uid)
            .bind(&delivery.name)
            .bind(&delivery.phone)
            .bind(&delivery.zip)
            .bind(&delivery.city)
            .bind(&delivery.address)
            .bind(&delivery.region)
            .bind(&delivery.email)
            .execute(&mut *tx)
            .await?;

        let payment = &order.payment;
        sqlx::query(UPSERT_PAYMENT)
            .bind(&order.order_uid)
            .bind(&payment.transaction)
            .bind(&payment.request_id)
            .bind(&payment.currency)
            .bind(&payment.provider)
            .bind(payment.amount)
            .bind(payment.payment_dt)
            .bind(&payment.bank)
            .bind(payment.delivery_cost)
            .bind(payment.goods_total)
            .bind(payment.custom_fee)
            .execute(&mut *tx)
            .await?;

        Self::insert_items(&mut tx, order).await?;

        tx.commit().await?;

        tracing::debug!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "Order aggregate committed"
        );

        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Option<Order>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(SNAPSHOT_READ).execute(&mut *tx).await?;

        let order_row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE order_uid = $1"
        ))
        .bind(order_uid)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order_row) = order_row else {
            return Ok(None);
        };
        let mut order = order_from_row(&order_row)?;

        let delivery_row = sqlx::query(&format!(
            "SELECT {DELIVERY_COLUMNS} FROM delivery WHERE order_uid = $1"
        ))
        .bind(order_uid)
        .fetch_optional(&mut *tx)
        .await;
        order.delivery = companion(order_uid, "delivery", delivery_row, delivery_from_row)?;

        let payment_row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment WHERE order_uid = $1"
        ))
        .bind(order_uid)
        .fetch_optional(&mut *tx)
        .await;
        order.payment = companion(order_uid, "payment", payment_row, payment_from_row)?;

        {
            let item_query = format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE order_uid = $1 ORDER BY line_no"
            );
            let mut rows = sqlx::query(&item_query).bind(order_uid).fetch(&mut *tx);
            while let Some(row) = rows.try_next().await? {
                order.items.push(item_from_row(&row)?);
            }
        }

        tx.commit().await?;
        Ok(Some(order))
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(SNAPSHOT_READ).execute(&mut *tx).await?;

        let order_rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders ORDER BY order_uid"
        ))
        .fetch_all(&mut *tx)
        .await?;

        if order_rows.is_empty() {
            tx.commit().await?;
            return Ok(Vec::new());
        }

        let mut deliveries = HashMap::new();
        for row in sqlx::query(&format!("SELECT {DELIVERY_COLUMNS} FROM delivery"))
            .fetch_all(&mut *tx)
            .await?
        {
            deliveries.insert(row.try_get::<String, _>("order_uid")?, delivery_from_row(&row)?);
        }

        let mut payments = HashMap::new();
        for row in sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payment"))
            .fetch_all(&mut *tx)
            .await?
        {
            payments.insert(row.try_get::<String, _>("order_uid")?, payment_from_row(&row)?);
        }

        let mut items: HashMap<String, Vec<Item>> = HashMap::new();
        {
            let item_query =
                format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY order_uid, line_no");
            let mut rows = sqlx::query(&item_query).fetch(&mut *tx);
            while let Some(row) = rows.try_next().await? {
                items
                    .entry(row.try_get::<String, _>("order_uid")?)
                    .or_default()
                    .push(item_from_row(&row)?);
            }
        }

        tx.commit().await?;

        let mut orders = Vec::with_capacity(order_rows.len());
        for row in &order_rows {
            let mut order = order_from_row(row)?;
            order.delivery = deliveries
                .remove(&order.order_uid)
                .ok_or_else(|| StoreError::incomplete(&order.order_uid, "delivery", None))?;
            order.payment = payments
                .remove(&order.order_uid)
                .ok_or_else(|| StoreError::incomplete(&order.order_uid, "payment", None))?;
            order.items = items.remove(&order.order_uid).unwrap_or_default();
            orders.push(order);
        }

        tracing::debug!(orders = orders.len(), "Loaded all order aggregates");
        Ok(orders)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

/// Map a mandatory companion row; any failure means the aggregate is incomplete.
fn companion<T>(
    order_uid: &str,
    part: &'static str,
    fetched: Result<Option<PgRow>, sqlx::Error>,
    map: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> Result<T, StoreError> {
    match fetched {
        Ok(Some(row)) => map(&row).map_err(|e| StoreError::incomplete(order_uid, part, Some(e))),
        Ok(None) => Err(StoreError::incomplete(order_uid, part, None)),
        Err(e) => Err(StoreError::incomplete(order_uid, part, Some(e))),
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery: Delivery::default(),
        payment: Payment::default(),
        items: Vec::new(),
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        delivery_service: row.try_get("delivery_service")?,
        shard_key: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
    })
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery, sqlx::Error> {
    Ok(Delivery {
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        zip: row.try_get("zip")?,
        city: row.try_get("city")?,
        address: row.try_get("address")?,
        region: row.try_get("region")?,
        email: row.try_get("email")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<Payment, sqlx::Error> {
    Ok(Payment {
        transaction: row.try_get("transaction")?,
        request_id: row.try_get("request_id")?,
        currency: row.try_get("currency")?,
        provider: row.try_get("provider")?,
        amount: row.try_get("amount")?,
        payment_dt: row.try_get("payment_dt")?,
        bank: row.try_get("bank")?,
        delivery_cost: row.try_get("delivery_cost")?,
        goods_total: row.try_get("goods_total")?,
        custom_fee: row.try_get("custom_fee")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

// ============================================================================
// Integration Tests
// ============================================================================
//
// These need a reachable PostgreSQL instance:
//   DATABASE_URL=postgres://... cargo test -- --ignored
//
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;
    use crate::models::tests::sample_order;

    async fn connect() -> PgOrderStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let store = PgOrderStore::connect(&url, 4).await.unwrap();
        ensure_schema(store.pool()).await.unwrap();
        store
    }

    fn unique_uid(prefix: &str) -> String {
        format!("{}-{}", prefix, uuid::Uuid::new_v4())
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_save_then_get_round_trip() {
        let store = connect().await;
        let order = sample_order(&unique_uid("round-trip"));

        store.save(&order).await.unwrap();

        let loaded = store.get_by_id(&order.order_uid).await.unwrap();
        assert_eq!(loaded, Some(order));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_repeated_save_does_not_duplicate_items() {
        let store = connect().await;
        let order = sample_order(&unique_uid("idempotent"));

        store.save(&order).await.unwrap();
        store.save(&order).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(count, order.items.len() as i64);
        assert_eq!(store.get_by_id(&order.order_uid).await.unwrap(), Some(order));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_resave_replaces_whole_aggregate() {
        let store = connect().await;
        let original = sample_order(&unique_uid("replace"));
        store.save(&original).await.unwrap();

        let mut replacement = original.clone();
        replacement.track_number = "NEWTRACK".to_string();
        replacement.delivery.city = "Haifa".to_string();
        replacement.payment.amount = 1;
        replacement.items.truncate(1);
        store.save(&replacement).await.unwrap();

        assert_eq!(
            store.get_by_id(&original.order_uid).await.unwrap(),
            Some(replacement)
        );
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_missing_order_is_none() {
        let store = connect().await;
        assert_eq!(store.get_by_id(&unique_uid("absent")).await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_order_without_payment_is_incomplete() {
        let store = connect().await;
        let order = sample_order(&unique_uid("incomplete"));
        store.save(&order).await.unwrap();

        sqlx::query("DELETE FROM payment WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.get_by_id(&order.order_uid).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::IncompleteAggregate { part: "payment", .. }
        ));

        // Leave the shared database loadable for get_all.
        sqlx::query("DELETE FROM orders WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(store.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_get_all_includes_saved_orders() {
        let store = connect().await;
        let first = sample_order(&unique_uid("all"));
        let mut second = sample_order(&unique_uid("all"));
        second.items.clear();

        store.save(&first).await.unwrap();
        store.save(&second).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert!(all.contains(&first));
        assert!(all.contains(&second));
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_get_all_rejects_order_without_delivery() {
        let store = connect().await;
        // Sorts ahead of every other test order, so get_all trips on this one.
        let order = sample_order(&unique_uid("0-no-delivery"));
        store.save(&order).await.unwrap();

        sqlx::query("DELETE FROM delivery WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(store.pool())
            .await
            .unwrap();

        let result = store.get_all().await;

        sqlx::query("DELETE FROM orders WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(store.pool())
            .await
            .unwrap();

        match result {
            Err(StoreError::IncompleteAggregate { part: "delivery", .. }) => {}
            other => panic!("expected incomplete delivery, got {other:?}"),
        }
    }
}
