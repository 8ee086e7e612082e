//! Kafka delivery emitter.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::info;

use super::{DeliveryReceipt, DeliverySink};
use crate::config::KafkaProducerConfig;
use crate::domain::ProcessedNotification;
use crate::{Error, Result};

pub struct KafkaEmitter {
    producer: FutureProducer,
    topic: String,
    queue_timeout: Duration,
}

impl KafkaEmitter {
    /// Create the producer and verify the brokers answer within `connect_timeout`.
    pub async fn connect(config: &KafkaProducerConfig, connect_timeout: Duration) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("acks", config.acks())
            .set("retries", config.retry_max.to_string())
            .set(
                "message.timeout.ms",
                config.message_timeout.as_millis().to_string(),
            )
            .create()?;

        let topic = config.topic.clone();
        let check_topic = topic.clone();
        let producer = tokio::task::spawn_blocking(move || -> Result<_> {
            producer
                .client()
                .fetch_metadata(Some(check_topic.as_str()), connect_timeout)?;
            Ok(producer)
        })
        .await
        .map_err(|e| Error::Other(format!("metadata task failed: {}", e)))??;

        info!(topic = %topic, acks = config.acks(), "Delivery producer ready");
        Ok(Self {
            producer,
            topic,
            queue_timeout: config.message_timeout,
        })
    }

    /// Wait for in-flight messages before shutdown.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        self.producer.flush(timeout)?;
        Ok(())
    }
}

#[async_trait]
impl DeliverySink for KafkaEmitter {
    async fn emit(&self, notification: &ProcessedNotification) -> Result<DeliveryReceipt> {
        let payload = notification.to_json()?;
        let record = FutureRecord::to(&self.topic)
            .key(notification.key())
            .payload(payload.as_str());

        let (partition, offset) = self
            .producer
            .send(record, self.queue_timeout)
            .await
            .map_err(|(e, _)| Error::Kafka(e))?;

        Ok(DeliveryReceipt { partition, offset })
    }
}
