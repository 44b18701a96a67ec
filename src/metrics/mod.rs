// Private module declaration
mod server;

use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers the three moving parts of the consistency protocol:
// - Ingestion: message outcomes and handling latency
// - Dead Letter Queue: poison messages
// - Cache / store: hit ratio, cache size, failed store operations
//
// All metrics are registered with one Registry, scraped via /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Ingestion
    pub ingest_messages: IntCounterVec,
    pub ingest_duration: HistogramVec,

    // DLQ
    pub dlq_messages_total: IntCounter,

    // Cache & store
    pub cache_lookups: IntCounterVec,
    pub cache_entries: IntGauge,
    pub store_failures: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ingest_messages = IntCounterVec::new(
            Opts::new("ingest_messages_total", "Ingested messages by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(ingest_messages.clone()))?;

        let ingest_duration = HistogramVec::new(
            HistogramOpts::new(
                "ingest_processing_duration_seconds",
                "Time from receipt to outcome for one ingested message",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(ingest_duration.clone()))?;

        let dlq_messages_total = IntCounter::new(
            "dlq_messages_total",
            "Poison messages handed to the dead letter queue",
        )?;
        registry.register(Box::new(dlq_messages_total.clone()))?;

        let cache_lookups = IntCounterVec::new(
            Opts::new("cache_lookups_total", "Order lookups by cache result"),
            &["result"],
        )?;
        registry.register(Box::new(cache_lookups.clone()))?;

        let cache_entries = IntGauge::new("cache_entries", "Orders currently cached")?;
        registry.register(Box::new(cache_entries.clone()))?;

        let store_failures = IntCounterVec::new(
            Opts::new("store_failures_total", "Failed persistent store operations"),
            &["operation"],
        )?;
        registry.register(Box::new(store_failures.clone()))?;

        Ok(Self {
            registry,
            ingest_messages,
            ingest_duration,
            dlq_messages_total,
            cache_lookups,
            cache_entries,
            store_failures,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_ingest(&self, outcome: &str, duration_secs: f64) {
        self.ingest_messages.with_label_values(&[outcome]).inc();
        self.ingest_duration
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    pub fn record_dlq_message(&self) {
        self.dlq_messages_total.inc();
    }

    pub fn record_cache_lookup(&self, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups.with_label_values(&[result]).inc();
    }

    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.set(entries as i64);
    }

    pub fn record_store_failure(&self, operation: &str) {
        self.store_failures.with_label_values(&[operation]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str, label: &str) -> Option<f64> {
        metrics
            .registry
            .gather()
            .iter()
            .find(|m| m.name() == name)?
            .metric
            .iter()
            .find(|m| m.label.iter().any(|l| l.value() == label))
            .and_then(|m| m.counter.value)
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_dlq_message();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_ingest_outcomes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_ingest("applied", 0.01);
        metrics.record_ingest("applied", 0.02);
        metrics.record_ingest("retry", 0.5);

        assert_eq!(counter_value(&metrics, "ingest_messages_total", "applied"), Some(2.0));
        assert_eq!(counter_value(&metrics, "ingest_messages_total", "retry"), Some(1.0));
    }

    #[test]
    fn test_record_cache_lookups() {
        let metrics = Metrics::new().unwrap();
        metrics.record_cache_lookup(true);
        metrics.record_cache_lookup(false);
        metrics.record_cache_lookup(true);

        assert_eq!(counter_value(&metrics, "cache_lookups_total", "hit"), Some(2.0));
        assert_eq!(counter_value(&metrics, "cache_lookups_total", "miss"), Some(1.0));
    }

    #[test]
    fn test_cache_entries_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.set_cache_entries(42);
        assert_eq!(metrics.cache_entries.get(), 42);
    }

    #[test]
    fn test_store_failures_by_operation() {
        let metrics = Metrics::new().unwrap();
        metrics.record_store_failure("save");
        assert_eq!(counter_value(&metrics, "store_failures_total", "save"), Some(1.0));
    }
}
