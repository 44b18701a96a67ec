use std::sync::Arc;
use std::time::Instant;

use actix::Addr;
use chrono::Utc;
use uuid::Uuid;

use crate::actors::{AddToDlq, DlqActor};
use crate::metrics::Metrics;
use crate::models::Order;
use crate::service::OrderService;

// ============================================================================
// Ingestion Pipeline - Transport-agnostic message handling
// ============================================================================
//
// decode -> persist (save, then cache put) -> disposition
//
// The pipeline never retries by itself. A failed save yields Retry and the
// consumer leaves the message unacknowledged, so the channel redelivers it.
// Poison messages are dead-lettered and acknowledged so consumption moves on.
//
// ============================================================================

/// What the consumer must do with a message once the pipeline is done with it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    DeadLettered,
    Retry,
}

impl Disposition {
    pub fn should_ack(self) -> bool {
        !matches!(self, Disposition::Retry)
    }

    pub fn label(self) -> &'static str {
        match self {
            Disposition::Applied => "applied",
            Disposition::DeadLettered => "dead_lettered",
            Disposition::Retry => "retry",
        }
    }
}

/// Where a message came from, for logging and dead-lettering.
#[derive(Debug, Clone)]
pub struct SourcePosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

pub struct IngestionPipeline {
    service: Arc<OrderService>,
    dlq_actor: Option<Addr<DlqActor>>,
    metrics: Arc<Metrics>,
}

impl IngestionPipeline {
    pub fn new(
        service: Arc<OrderService>,
        dlq_actor: Option<Addr<DlqActor>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            service,
            dlq_actor,
            metrics,
        }
    }

    pub async fn process(&self, payload: Option<&[u8]>, source: &SourcePosition) -> Disposition {
        let started = Instant::now();
        let disposition = self.handle(payload, source).await;
        self.metrics
            .record_ingest(disposition.label(), started.elapsed().as_secs_f64());
        disposition
    }

    async fn handle(&self, payload: Option<&[u8]>, source: &SourcePosition) -> Disposition {
        let Some(payload) = payload else {
            self.dead_letter(&[], "message has no payload".to_string(), source);
            return Disposition::DeadLettered;
        };

        let order = match Order::decode(payload) {
            Ok(order) => order,
            Err(e) => {
                self.dead_letter(payload, e.to_string(), source);
                return Disposition::DeadLettered;
            }
        };

        let order_uid = order.order_uid.clone();
        match self.service.persist(order).await {
            Ok(_) => {
                tracing::info!(
                    order_uid = %order_uid,
                    partition = source.partition,
                    offset = source.offset,
                    "Order event applied"
                );
                Disposition::Applied
            }
            Err(e) => {
                tracing::warn!(
                    order_uid = %order_uid,
                    partition = source.partition,
                    offset = source.offset,
                    error = %e,
                    "Failed to persist order event, leaving it for redelivery"
                );
                Disposition::Retry
            }
        }
    }

    fn dead_letter(&self, payload: &[u8], error_message: String, source: &SourcePosition) {
        tracing::error!(
            topic = %source.topic,
            partition = source.partition,
            offset = source.offset,
            error = %error_message,
            "Poison message, dead-lettering"
        );
        self.metrics.record_dlq_message();

        if let Some(ref dlq) = self.dlq_actor {
            dlq.do_send(AddToDlq {
                id: Uuid::new_v4(),
                topic: source.topic.clone(),
                partition: source.partition,
                offset: source.offset,
                payload: String::from_utf8_lossy(payload).into_owned(),
                error_message,
                failure_count: 1,
                first_failed_at: Utc::now(),
            });
        }
    }
}
