// ============================================================================
// Ingestion
// ============================================================================
//
// - consumer/ - Kafka consumer group, ack (commit) and redelivery (seek)
// - pipeline/ - decode, persist and classify one message
//
// ============================================================================

mod consumer;
mod pipeline;

pub use consumer::{ConsumerConfig, IngestConsumer};
pub use pipeline::IngestionPipeline;
