use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueHint};

use crate::ingest::ConsumerConfig;

/// Command-line arguments for the order cache binary.
#[derive(Debug, Parser)]
#[command(name = "order_cache", version, about = "Order aggregate cache service")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Warm the cache, then serve the order API and consume the order topic.
    Serve(Box<ServeArgs>),
    /// Publish JSON order files to the order topic.
    Publish(PublishArgs),
}

#[derive(Debug, Args, Clone)]
pub struct ServeArgs {
    /// PostgreSQL connection URL.
    #[arg(long = "database-url", env = "DATABASE_URL", value_name = "URL")]
    pub database_url: String,

    /// Size of the PostgreSQL connection pool.
    #[arg(
        long = "database-max-connections",
        env = "DATABASE_MAX_CONNECTIONS",
        default_value_t = 10
    )]
    pub database_max_connections: u32,

    /// Host for the order API and the metrics listener.
    #[arg(long = "http-host", env = "HTTP_HOST", default_value = "0.0.0.0")]
    pub http_host: String,

    /// Port of the order API.
    #[arg(long = "http-port", env = "HTTP_PORT", default_value_t = 8000)]
    pub http_port: u16,

    /// Port of the /metrics, /health and /dlq listener.
    #[arg(long = "metrics-port", env = "METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Durable consumer group; committed offsets survive restarts under this name.
    #[arg(
        long = "consumer-group",
        env = "CONSUMER_GROUP",
        default_value = "order-cache-durable"
    )]
    pub consumer_group: String,

    /// Where a brand new consumer group starts (earliest|latest).
    #[arg(
        long = "auto-offset-reset",
        env = "AUTO_OFFSET_RESET",
        default_value = "earliest",
        value_parser = ["earliest", "latest"]
    )]
    pub auto_offset_reset: String,

    /// Deadline for a single persistent store call.
    #[arg(long = "store-timeout-secs", env = "STORE_TIMEOUT_SECS", default_value_t = 5)]
    pub store_timeout_secs: u64,

    /// Deadline for loading every order into the cache at startup.
    #[arg(long = "warm-up-timeout-secs", env = "WARM_UP_TIMEOUT_SECS", default_value_t = 60)]
    pub warm_up_timeout_secs: u64,

    /// Pause before a message whose save failed is delivered again.
    #[arg(
        long = "redelivery-delay-ms",
        env = "REDELIVERY_DELAY_MS",
        default_value_t = 1000
    )]
    pub redelivery_delay_ms: u64,
}

impl ServeArgs {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn warm_up_timeout(&self) -> Duration {
        Duration::from_secs(self.warm_up_timeout_secs)
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            brokers: self.broker.brokers.clone(),
            topic: self.broker.topic.clone(),
            group_id: self.consumer_group.clone(),
            auto_offset_reset: self.auto_offset_reset.clone(),
            redelivery_delay: Duration::from_millis(self.redelivery_delay_ms),
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct BrokerArgs {
    /// Kafka/Redpanda bootstrap servers.
    #[arg(long = "brokers", env = "KAFKA_BROKERS", default_value = "127.0.0.1:9092")]
    pub brokers: String,

    /// Topic carrying order events.
    #[arg(long = "topic", env = "ORDERS_TOPIC", default_value = "orders")]
    pub topic: String,
}

#[derive(Debug, Args, Clone)]
pub struct PublishArgs {
    #[command(flatten)]
    pub broker: BrokerArgs,

    /// Send each file as one message without parsing it.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub raw: bool,

    /// JSON files holding one order or an array of orders.
    #[arg(required = true, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub files: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serve(args: &[&str]) -> ServeArgs {
        let mut argv = vec!["order_cache", "serve"];
        argv.extend_from_slice(args);
        match CliArgs::try_parse_from(argv).unwrap().command {
            Command::Serve(args) => *args,
            other => panic!("expected serve, got {other:?}"),
        }
    }

    #[test]
    fn test_serve_defaults() {
        let args = serve(&["--database-url", "postgres://localhost/orders"]);

        assert_eq!(args.http_port, 8000);
        assert_eq!(args.metrics_port, 9090);
        assert_eq!(args.store_timeout(), Duration::from_secs(5));

        let consumer = args.consumer_config();
        assert_eq!(consumer.group_id, "order-cache-durable");
        assert_eq!(consumer.topic, "orders");
        assert_eq!(consumer.auto_offset_reset, "earliest");
        assert_eq!(consumer.redelivery_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_serve_overrides() {
        let args = serve(&[
            "--database-url",
            "postgres://db/orders",
            "--topic",
            "orders-v2",
            "--consumer-group",
            "cache-b",
            "--auto-offset-reset",
            "latest",
            "--redelivery-delay-ms",
            "250",
        ]);

        let consumer = args.consumer_config();
        assert_eq!(consumer.topic, "orders-v2");
        assert_eq!(consumer.group_id, "cache-b");
        assert_eq!(consumer.auto_offset_reset, "latest");
        assert_eq!(consumer.redelivery_delay, Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_offset_reset_is_rejected() {
        let result = CliArgs::try_parse_from([
            "order_cache",
            "serve",
            "--database-url",
            "postgres://db/orders",
            "--auto-offset-reset",
            "middle",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_publish_requires_files() {
        assert!(CliArgs::try_parse_from(["order_cache", "publish"]).is_err());

        let cli =
            CliArgs::try_parse_from(["order_cache", "publish", "--raw", "a.json", "b.json"])
                .unwrap();
        match cli.command {
            Command::Publish(args) => {
                assert!(args.raw);
                assert_eq!(args.files.len(), 2);
            }
            other => panic!("expected publish, got {other:?}"),
        }
    }
}
