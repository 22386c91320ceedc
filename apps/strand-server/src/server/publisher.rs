//! Outbound event queue. With brokers configured, events go to Kafka
//! keyed by channel so per-channel ordering survives partitioning.
//! Without brokers, events are recorded in memory.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use rdkafka::{
    config::ClientConfig,
    producer::{FutureProducer, FutureRecord, Producer},
    util::Timeout,
};
use serde::Serialize;
use tokio::sync::RwLock;

use strand_protocol::EventKind;

use super::core::AppConfig;

#[derive(Clone)]
pub struct EventPublisher {
    inner: Arc<PublisherInner>,
}

enum PublisherInner {
    Queue {
        producer: FutureProducer,
        topic: String,
        publish_timeout: Duration,
    },
    Memory {
        recorded: RwLock<Vec<String>>,
    },
}

impl EventPublisher {
    pub(crate) fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let inner = if let Some(brokers) = &config.queue_brokers {
            let producer: FutureProducer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("acks", "all")
                .set("enable.idempotence", "true")
                .set("linger.ms", "10")
                .set("request.timeout.ms", "30000")
                .create()
                .context("kafka producer init failed")?;
            PublisherInner::Queue {
                producer,
                topic: config.queue_topic.clone(),
                publish_timeout: config.publish_timeout,
            }
        } else {
            PublisherInner::Memory {
                recorded: RwLock::new(Vec::new()),
            }
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Delivery failures are logged and swallowed; a mutation that
    /// already committed must not fail its HTTP response over the
    /// queue.
    pub(crate) async fn publish<T: Serialize>(
        &self,
        key: &str,
        kind: EventKind,
        payload: &T,
        user_ids: &[String],
    ) {
        let encoded = match strand_protocol::encode_envelope(kind, payload, user_ids.to_vec()) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(
                    event = "publish.encode_failed",
                    kind = kind.as_str(),
                    error = %e,
                );
                return;
            }
        };

        match self.inner.as_ref() {
            PublisherInner::Queue {
                producer,
                topic,
                publish_timeout,
            } => {
                let record = FutureRecord::to(topic).key(key).payload(&encoded);
                match producer.send(record, Timeout::After(*publish_timeout)).await {
                    Ok((partition, offset)) => {
                        tracing::debug!(
                            event = "publish.delivered",
                            kind = kind.as_str(),
                            partition,
                            offset,
                        );
                    }
                    Err((e, _)) => {
                        tracing::error!(
                            event = "publish.failed",
                            kind = kind.as_str(),
                            error = %e,
                        );
                    }
                }
            }
            PublisherInner::Memory { recorded } => {
                recorded.write().await.push(encoded);
            }
        }
    }

    /// Drains buffered deliveries before shutdown.
    pub fn flush(&self, timeout: Duration) -> anyhow::Result<()> {
        if let PublisherInner::Queue { producer, .. } = self.inner.as_ref() {
            producer
                .flush(Timeout::After(timeout))
                .context("kafka flush failed")?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn recorded(&self) -> Vec<serde_json::Value> {
        match self.inner.as_ref() {
            PublisherInner::Queue { .. } => Vec::new(),
            PublisherInner::Memory { recorded } => recorded
                .read()
                .await
                .iter()
                .filter_map(|raw| serde_json::from_str(raw).ok())
                .collect(),
        }
    }
}
