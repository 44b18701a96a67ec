use actix::prelude::*;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

// ============================================================================
// Dead Letter Queue Actor
// ============================================================================
//
// Stores poison messages: payloads the ingestion pipeline could not decode.
// Such messages are acknowledged on the channel so consumption keeps moving;
// this table is where they remain available for manual inspection.
//
// ============================================================================

pub struct DlqActor {
    pool: PgPool,
}

impl DlqActor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Actor for DlqActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("DlqActor started - Dead Letter Queue ready");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message, Debug, Clone)]
#[rtype(result = "Result<(), sqlx::Error>")]
pub struct AddToDlq {
    pub id: Uuid,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
}

#[derive(Message)]
#[rtype(result = "Result<Vec<DlqMessage>, sqlx::Error>")]
pub struct GetDlqMessages {
    pub limit: i64,
}

#[derive(Message)]
#[rtype(result = "Result<DlqStats, sqlx::Error>")]
pub struct GetDlqStats;

#[derive(Debug, Clone, Serialize)]
pub struct DlqMessage {
    pub id: Uuid,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: String,
    pub error_message: String,
    pub failure_count: i32,
    pub first_failed_at: DateTime<Utc>,
    pub last_failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DlqStats {
    pub total_messages: i64,
    pub by_topic: HashMap<String, i64>,
}

// ============================================================================
// Handlers
// ============================================================================

impl Handler<AddToDlq> for DlqActor {
    type Result = ResponseFuture<Result<(), sqlx::Error>>;

    fn handle(&mut self, msg: AddToDlq, _: &mut Self::Context) -> Self::Result {
        let pool = self.pool.clone();
        let now = Utc::now();

        tracing::error!(
            dlq_id = %msg.id,
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            error = %msg.error_message,
            "💀 Adding message to Dead Letter Queue"
        );

        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO dead_letter_queue (
                    id, topic, kafka_partition, kafka_offset, payload,
                    error_message, failure_count, first_failed_at,
                    last_failed_at, created_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(msg.id)
            .bind(&msg.topic)
            .bind(msg.partition)
            .bind(msg.offset)
            .bind(&msg.payload)
            .bind(&msg.error_message)
            .bind(msg.failure_count)
            .bind(msg.first_failed_at)
            .bind(now)
            .bind(now)
            .execute(&pool)
            .await;

            match result {
                Ok(_) => {
                    tracing::info!(dlq_id = %msg.id, "Message stored in DLQ");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(
                        dlq_id = %msg.id,
                        error = %e,
                        "Failed to store message in DLQ"
                    );
                    Err(e)
                }
            }
        })
    }
}

impl Handler<GetDlqMessages> for DlqActor {
    type Result = ResponseFuture<Result<Vec<DlqMessage>, sqlx::Error>>;

    fn handle(&mut self, msg: GetDlqMessages, _: &mut Self::Context) -> Self::Result {
        let pool = self.pool.clone();

        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, topic, kafka_partition, kafka_offset, payload, error_message,
                        failure_count, first_failed_at, last_failed_at
                 FROM dead_letter_queue
                 ORDER BY created_at DESC
                 LIMIT $1",
            )
            .bind(msg.limit)
            .fetch_all(&pool)
            .await?;

            rows.iter()
                .map(|row| -> Result<DlqMessage, sqlx::Error> {
                    Ok(DlqMessage {
                        id: row.try_get("id")?,
                        topic: row.try_get("topic")?,
                        partition: row.try_get("kafka_partition")?,
                        offset: row.try_get("kafka_offset")?,
                        payload: row.try_get("payload")?,
                        error_message: row.try_get("error_message")?,
                        failure_count: row.try_get("failure_count")?,
                        first_failed_at: row.try_get("first_failed_at")?,
                        last_failed_at: row.try_get("last_failed_at")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
        })
    }
}

impl Handler<GetDlqStats> for DlqActor {
    type Result = ResponseFuture<Result<DlqStats, sqlx::Error>>;

    fn handle(&mut self, _msg: GetDlqStats, _: &mut Self::Context) -> Self::Result {
        let pool = self.pool.clone();

        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT topic, COUNT(*) AS messages FROM dead_letter_queue GROUP BY topic",
            )
            .fetch_all(&pool)
            .await?;

            let mut stats = DlqStats::default();
            for row in rows {
                let topic: String = row.try_get("topic")?;
                let messages: i64 = row.try_get("messages")?;
                stats.total_messages += messages;
                stats.by_topic.insert(topic, messages);
            }

            Ok::<_, sqlx::Error>(stats)
        })
    }
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
pub(crate) mod tests {
    use super::*;
    use crate::db::schema::ensure_schema;
    use std::time::Duration;

    pub(crate) async fn connect() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        pool
    }

    /// Poll until an entry for `topic` is visible; inserts run off the mailbox.
    pub(crate) async fn wait_for_topic(dlq: &Addr<DlqActor>, topic: &str) -> Vec<DlqMessage> {
        for _ in 0..50 {
            let found: Vec<DlqMessage> = dlq
                .send(GetDlqMessages { limit: 500 })
                .await
                .unwrap()
                .unwrap()
                .into_iter()
                .filter(|message| message.topic == topic)
                .collect();
            if !found.is_empty() {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no dead letter entry for topic {topic}");
    }

    fn entry(topic: &str, offset: i64) -> AddToDlq {
        AddToDlq {
            id: Uuid::new_v4(),
            topic: topic.to_string(),
            partition: 3,
            offset,
            payload: "{not json".to_string(),
            error_message: "Malformed order payload".to_string(),
            failure_count: 1,
            first_failed_at: Utc::now(),
        }
    }

    #[actix::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_add_then_read_back() {
        let dlq = DlqActor::new(connect().await).start();
        let topic = format!("dlq-test-{}", Uuid::new_v4());
        let added = entry(&topic, 42);

        dlq.send(added.clone()).await.unwrap().unwrap();

        let messages = wait_for_topic(&dlq, &topic).await;
        assert_eq!(messages.len(), 1);
        let stored = &messages[0];
        assert_eq!(stored.id, added.id);
        assert_eq!(stored.partition, 3);
        assert_eq!(stored.offset, 42);
        assert_eq!(stored.payload, "{not json");
        assert_eq!(stored.failure_count, 1);
        assert_eq!(
            stored.first_failed_at.timestamp_micros(),
            added.first_failed_at.timestamp_micros()
        );
        assert!(stored.last_failed_at >= stored.first_failed_at);
    }

    #[actix::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL)"]
    async fn test_stats_group_by_topic() {
        let dlq = DlqActor::new(connect().await).start();
        let topic = format!("dlq-stats-{}", Uuid::new_v4());

        dlq.send(entry(&topic, 1)).await.unwrap().unwrap();
        dlq.send(entry(&topic, 2)).await.unwrap().unwrap();
        wait_for_topic(&dlq, &topic).await;

        let stats = dlq.send(GetDlqStats).await.unwrap().unwrap();
        assert_eq!(stats.by_topic.get(&topic), Some(&2));
        assert!(stats.total_messages >= 2);
        assert_eq!(stats.total_messages, stats.by_topic.values().sum::<i64>());
    }

    #[actix::test]
    async fn test_unreachable_database_is_an_error() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap();
        let dlq = DlqActor::new(pool).start();

        assert!(dlq.send(GetDlqStats).await.unwrap().is_err());
        assert!(dlq.send(entry("orders", 1)).await.unwrap().is_err());
    }
}
