//! Kafka band source.
//!
//! Each band has its own consumer group so the three topics are consumed and
//! rebalanced independently. Offsets are stored manually after a record has
//! been staged or discarded, and committed by librdkafka's auto-commit.

use std::sync::Arc;

use async_trait::async_trait;
use rdkafka::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::Message;
use rdkafka::topic_partition_list::TopicPartitionList;
use tracing::{debug, error, info, warn};

use super::source::{RecordSource, SourceMessage};
use crate::config::KafkaConsumerConfig;
use crate::domain::Priority;
use crate::{Error, Result};

/// Consumer context that tags client events with the band.
pub struct BandConsumerContext {
    band: Priority,
}

impl ClientContext for BandConsumerContext {
    fn error(&self, error: KafkaError, reason: &str) {
        error!(band = %self.band, error = %error, reason, "Kafka client error");
    }
}

impl ConsumerContext for BandConsumerContext {
    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!(band = %self.band, partitions = offsets.count(), "Offsets committed"),
            Err(KafkaError::ConsumerCommit(rdkafka::types::RDKafkaErrorCode::NoOffset)) => {}
            Err(e) => warn!(band = %self.band, error = %e, "Offset commit failed"),
        }
    }
}

pub struct KafkaBandSource {
    band: Priority,
    topic: String,
    consumer: Arc<StreamConsumer<BandConsumerContext>>,
}

impl KafkaBandSource {
    /// Create the band consumer, verify the topic is reachable and subscribe.
    ///
    /// Fails if the brokers cannot be reached within the connect timeout.
    pub async fn connect(config: &KafkaConsumerConfig, band: Priority) -> Result<Self> {
        let topic = config.topic_for(band).to_string();
        let group_id = config.group_for(band);

        let consumer: StreamConsumer<BandConsumerContext> = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", &group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "latest")
            .set("partition.assignment.strategy", "roundrobin")
            .set(
                "session.timeout.ms",
                config.session_timeout.as_millis().to_string(),
            )
            .set(
                "heartbeat.interval.ms",
                config.heartbeat_interval.as_millis().to_string(),
            )
            .create_with_context(BandConsumerContext { band })?;

        let connect_timeout = config.connect_timeout;
        let check_topic = topic.clone();
        let consumer = tokio::task::spawn_blocking(move || -> Result<_> {
            let metadata = consumer.fetch_metadata(Some(check_topic.as_str()), connect_timeout)?;
            if let Some(t) = metadata.topics().iter().find(|t| t.name() == check_topic)
                && let Some(err) = t.error()
            {
                return Err(Error::Other(format!(
                    "topic {} unavailable: {:?}",
                    check_topic, err
                )));
            }
            Ok(consumer)
        })
        .await
        .map_err(|e| Error::Other(format!("metadata task failed: {}", e)))??;

        consumer.subscribe(&[topic.as_str()])?;
        info!(band = %band, topic = %topic, group_id = %group_id, "Subscribed band consumer");

        Ok(Self {
            band,
            topic,
            consumer: Arc::new(consumer),
        })
    }
}

#[async_trait]
impl RecordSource for KafkaBandSource {
    fn band(&self) -> Priority {
        self.band
    }

    async fn next_message(&mut self) -> Result<Option<SourceMessage>> {
        let message = self.consumer.recv().await?;
        Ok(Some(SourceMessage {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            payload: message.payload().map(<[u8]>::to_vec),
        }))
    }

    fn mark_consumed(&mut self, message: &SourceMessage) -> Result<()> {
        self.consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)?;
        Ok(())
    }

    async fn close(&mut self) {
        let consumer = self.consumer.clone();
        let committed = tokio::task::spawn_blocking(move || {
            let committed = consumer.commit_consumer_state(CommitMode::Sync);
            consumer.unsubscribe();
            committed
        })
        .await;

        match committed {
            Ok(Ok(())) => {}
            Ok(Err(KafkaError::ConsumerCommit(rdkafka::types::RDKafkaErrorCode::NoOffset))) => {}
            Ok(Err(e)) => warn!(band = %self.band, error = %e, "Failed to commit final offsets"),
            Err(e) => warn!(band = %self.band, error = %e, "Offset commit task failed"),
        }
        info!(band = %self.band, topic = %self.topic, "Left consumer group");
    }
}
