use std::collections::HashMap;
use std::time::Duration;

use actix::Addr;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaResult;
#[cfg(test)]
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::Offset;
use tokio::sync::watch;

use super::pipeline::{Disposition, IngestionPipeline, SourcePosition};
use crate::actors::{HealthMonitorActor, HealthStatus, UpdateHealth, COMPONENT_INGEST};

// ============================================================================
// Ingest Consumer - Durable consumer-group subscription
// ============================================================================
//
// At-least-once delivery on top of a Kafka consumer group:
// - group.id is a fixed durable name, so committed offsets survive restarts
//   and partitions are shared among all members of the group
// - auto commit is off; commit_message after the pipeline is done IS the ack
// - a Retry disposition seeks the partition back to the failed offset; until
//   that offset comes around again, prefetched later messages of the same
//   partition are skipped and never committed
// - a failed seek stays pending and is retried on a timer while the
//   component reports Degraded
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub auto_offset_reset: String,
    pub redelivery_delay: Duration,
}

pub struct IngestConsumer {
    consumer: StreamConsumer,
    pipeline: IngestionPipeline,
    health: Option<Addr<HealthMonitorActor>>,
    config: ConsumerConfig,
}

impl IngestConsumer {
    pub fn new(
        config: ConsumerConfig,
        pipeline: IngestionPipeline,
        health: Option<Addr<HealthMonitorActor>>,
    ) -> KafkaResult<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()?;

        consumer.subscribe(&[config.topic.as_str()])?;

        tracing::info!(
            topic = %config.topic,
            consumer_group = %config.group_id,
            auto_offset_reset = %config.auto_offset_reset,
            manual_commit = true,
            "Subscribed to order topic"
        );

        Ok(Self {
            consumer,
            pipeline,
            health,
            config,
        })
    }

    /// Consume until `shutdown` flips to true. The message in flight is always
    /// finished before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let IngestConsumer {
            consumer,
            pipeline,
            health,
            config,
        } = self;
        let reporter = HealthReporter { health };
        let mut rewinds = RewindTracker::default();
        let mut transport_error = false;
        let mut seek_error = false;
        let mut reseek = tokio::time::interval(config.redelivery_delay.max(MIN_RESEEK_INTERVAL));
        reseek.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        reporter.report(
            HealthStatus::Healthy,
            Some(format!("consuming {} as {}", config.topic, config.group_id)),
        );

        loop {
            let received = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
                _ = reseek.tick(), if rewinds.has_unseeked() => {
                    let failed = seek_pending(&mut rewinds, |topic, partition, offset| {
                        consumer.seek(topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
                    });
                    seek_error = report_seek_state(&reporter, seek_error, failed);
                    continue;
                }
                received = consumer.recv() => received,
            };

            let message = match received {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to receive from broker");
                    if !transport_error {
                        transport_error = true;
                        reporter.report(HealthStatus::Degraded(e.to_string()), None);
                    }
                    continue;
                }
            };

            if transport_error {
                transport_error = false;
                reporter.report(HealthStatus::Healthy, None);
            }

            if rewinds.should_skip(message.topic(), message.partition(), message.offset()) {
                tracing::trace!(
                    partition = message.partition(),
                    offset = message.offset(),
                    "Skipping prefetched message awaiting redelivery"
                );
                continue;
            }

            let source = SourcePosition {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: message.offset(),
            };
            let disposition = pipeline.process(message.payload(), &source).await;

            if disposition.should_ack() {
                commit(&consumer, &message, &source);
                continue;
            }

            debug_assert_eq!(disposition, Disposition::Retry);
            drop(message);
            rewinds.rewind(&source.topic, source.partition, source.offset);
            let failed = seek_pending(&mut rewinds, |topic, partition, offset| {
                consumer.seek(topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
            });
            seek_error = report_seek_state(&reporter, seek_error, failed);

            tokio::select! {
                _ = tokio::time::sleep(config.redelivery_delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(topic = %config.topic, "Ingest consumer stopped");
    }
}

const SEEK_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_RESEEK_INTERVAL: Duration = Duration::from_millis(100);

fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>, source: &SourcePosition) {
    if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
        tracing::warn!(
            partition = source.partition,
            offset = source.offset,
            error = %e,
            "Failed to commit offset (message may be redelivered)"
        );
    }
}

/// Seek every partition whose redelivery point has not been reached by a
/// successful seek yet. Returns how many seeks failed; those stay pending and
/// are attempted again on the next reseek tick.
fn seek_pending<F>(rewinds: &mut RewindTracker, mut seek: F) -> usize
where
    F: FnMut(&str, i32, i64) -> KafkaResult<()>,
{
    let mut failed = 0;
    for (topic, partition, offset) in rewinds.unseeked() {
        match seek(&topic, partition, offset) {
            Ok(()) => rewinds.mark_seeked(&topic, partition),
            Err(e) => {
                failed += 1;
                tracing::error!(
                    partition,
                    offset,
                    error = %e,
                    "Failed to seek back for redelivery, will retry"
                );
            }
        }
    }
    failed
}

/// Degraded while any seek is outstanding; back to Healthy once all succeed.
fn report_seek_state(reporter: &HealthReporter, was_failing: bool, failed: usize) -> bool {
    let failing = failed > 0;
    if failing && !was_failing {
        reporter.report(
            HealthStatus::Degraded(format!("{failed} partition(s) awaiting seek for redelivery")),
            None,
        );
    } else if !failing && was_failing {
        reporter.report(HealthStatus::Healthy, None);
    }
    failing
}

struct HealthReporter {
    health: Option<Addr<HealthMonitorActor>>,
}

impl HealthReporter {
    fn report(&self, status: HealthStatus, details: Option<String>) {
        if let Some(ref health) = self.health {
            health.do_send(UpdateHealth {
                component: COMPONENT_INGEST.to_string(),
                status,
                details,
            });
        }
    }
}

/// Per-partition redelivery points.
///
/// After a seek the consumer may still hold messages fetched before it. Those
/// sit beyond the redelivery point and must not be processed (or committed)
/// before the failed message itself.
#[derive(Debug, Default)]
pub(crate) struct RewindTracker {
    pending: HashMap<(String, i32), Rewind>,
}

#[derive(Debug, Clone, Copy)]
struct Rewind {
    offset: i64,
    seeked: bool,
}

impl RewindTracker {
    pub(crate) fn rewind(&mut self, topic: &str, partition: i32, offset: i64) {
        self.pending.insert(
            (topic.to_string(), partition),
            Rewind {
                offset,
                seeked: false,
            },
        );
    }

    pub(crate) fn mark_seeked(&mut self, topic: &str, partition: i32) {
        if let Some(rewind) = self.pending.get_mut(&(topic.to_string(), partition)) {
            rewind.seeked = true;
        }
    }

    pub(crate) fn has_unseeked(&self) -> bool {
        self.pending.values().any(|rewind| !rewind.seeked)
    }

    pub(crate) fn unseeked(&self) -> Vec<(String, i32, i64)> {
        self.pending
            .iter()
            .filter(|(_, rewind)| !rewind.seeked)
            .map(|((topic, partition), rewind)| (topic.clone(), *partition, rewind.offset))
            .collect()
    }

    pub(crate) fn should_skip(&mut self, topic: &str, partition: i32, offset: i64) -> bool {
        let key = (topic.to_string(), partition);
        match self.pending.get(&key) {
            Some(rewind) if offset > rewind.offset => true,
            Some(rewind) if offset == rewind.offset => {
                self.pending.remove(&key);
                false
            }
            _ => false,
        }
    }

    #[cfg(test)]
    fn is_pending(&self, topic: &str, partition: i32) -> bool {
        self.pending.contains_key(&(topic.to_string(), partition))
    }
}
