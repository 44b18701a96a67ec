use std::path::Path;

use anyhow::Context;
use serde_json::Value;

use super::RedpandaClient;
use crate::config::PublishArgs;
use crate::utils::{retry_with_backoff, RetryConfig};

// ============================================================================
// Publish command - Feed order files into the topic
// ============================================================================
//
// A file holds one order object or an array of them. Each order becomes one
// message keyed by its order_uid. With --raw the file bytes are sent as a
// single message, unparsed (useful to exercise the dead letter queue).
//
// ============================================================================

/// One message ready to be produced.
#[derive(Debug, PartialEq)]
pub(crate) struct OutgoingMessage {
    pub key: String,
    pub payload: Vec<u8>,
}

pub(crate) fn split_orders(contents: &[u8]) -> Result<Vec<OutgoingMessage>, serde_json::Error> {
    let orders = match serde_json::from_slice::<Value>(contents)? {
        Value::Array(orders) => orders,
        order => vec![order],
    };

    orders
        .into_iter()
        .map(|order| {
            let key = order
                .get("order_uid")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            Ok(OutgoingMessage {
                key,
                payload: serde_json::to_vec(&order)?,
            })
        })
        .collect()
}

fn raw_message(path: &Path, contents: Vec<u8>) -> OutgoingMessage {
    let key = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    OutgoingMessage {
        key,
        payload: contents,
    }
}

pub async fn run_publish(args: PublishArgs) -> anyhow::Result<usize> {
    let client =
        RedpandaClient::new(&args.broker.brokers).context("failed to create Kafka producer")?;
    let mut published = 0;

    for path in &args.files {
        let contents = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;

        let messages = if args.raw {
            vec![raw_message(path, contents)]
        } else {
            split_orders(&contents)
                .with_context(|| format!("{} is not valid JSON", path.display()))?
        };

        for message in messages {
            let result = retry_with_backoff(RetryConfig::default(), "publish", |_| {
                client.publish(&args.broker.topic, &message.key, &message.payload)
            })
            .await
            .into_result();

            if let Err(e) = result {
                let circuit = client.circuit_state().await;
                tracing::error!(
                    circuit = ?circuit,
                    file = %path.display(),
                    "Giving up on publishing"
                );
                return Err(e).with_context(|| format!("failed to publish {}", path.display()));
            }
            published += 1;
        }
    }

    tracing::info!(published, topic = %args.broker.topic, "Publishing complete");
    Ok(published)
}
